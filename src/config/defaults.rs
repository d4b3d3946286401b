//! Default configuration values

/// Oldest `manifest_version` accepted in a manifest file
pub const MIN_MANIFEST_VERSION: &str = "2017-03-17";

/// Newest `manifest_version` accepted in a manifest file
pub const MAX_MANIFEST_VERSION: &str = "2020-08-02";

/// Version marker written into generated deps manifests
pub const DEPS_MANIFEST_VERSION: &str = "2021-03-26";

/// Manifest file name inside every app and library directory
pub const MANIFEST_FILE_NAME: &str = "mos.yml";

/// Build graph node that stands for the application itself
pub const DEPS_APP: &str = "app";

/// Path placeholder expanded to every resolved library directory
pub const ALL_LIBS_KEYWORD: &str = "@all_libs";

/// Library every other library initializes after
pub const CORE_LIB_NAME: &str = "core";

/// Default location of the core library
pub const CORE_LIB_LOCATION: &str = "https://github.com/mongoose-os-libs/core";

/// Name of the SDK module every app carries
pub const MOS_MODULE_NAME: &str = "mongoose-os";

/// Default location of the SDK module
pub const MOS_MODULE_LOCATION: &str = "https://github.com/cesanta/mongoose-os";

/// Version that always tracks the newest revision
pub const LATEST_VERSION: &str = "latest";

/// Platforms the build driver knows about
pub const SUPPORTED_PLATFORMS: &[&str] = &[
    "cc3200", "cc3220", "esp32", "esp8266", "rs14100", "stm32", "ubuntu",
];

/// Globs a source directory expands to
pub const DEFAULT_SOURCE_GLOBS: &[&str] = &["*.c", "*.cpp"];

/// Glob a filesystem or tests directory expands to
pub const FS_GLOB: &str = "*";

/// Glob a binary libs directory expands to
pub const BINARY_LIBS_GLOB: &str = "*.a";

/// Default build directory relative to the app
pub const DEFAULT_BUILD_DIR: &str = "build";

/// Directory for generated files under the build directory
pub const GEN_SUBDIR: &str = "gen";

/// Generated deps manifest file name
pub const DEPS_MANIFEST_FILE_NAME: &str = "deps_manifest.yml";

/// Generated deps init source file name
pub const DEPS_INIT_FILE_NAME: &str = "mgos_deps_init.c";

/// Maximum number of folds before conditional expansion is abandoned
pub const MAX_EXPANSION_FOLDS: usize = 100;

/// Minimum proptest iterations
pub const MIN_PROPTEST_ITERATIONS: u32 = 100;

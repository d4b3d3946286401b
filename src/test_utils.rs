//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    /// Generate a valid library name
    pub fn lib_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{1,15}"
    }

    /// Generate a local library location ending in the given name
    pub fn local_location(name: String) -> impl Strategy<Value = String> {
        prop_oneof![Just("..".to_string()), Just("libs".to_string()), "[a-z]{1,6}/[a-z]{1,6}"]
            .prop_map(move |dir| format!("{dir}/{name}"))
    }

    /// Generate a relative manifest path entry, optionally `+`/`-` prefixed
    pub fn path_entry() -> impl Strategy<Value = String> {
        "[+-]?[a-z]{1,6}(/[a-z]{1,6}){0,2}"
    }

    /// Generate a variable map without placeholders
    pub fn var_map() -> impl Strategy<Value = BTreeMap<String, String>> {
        prop::collection::btree_map("[A-Z][A-Z0-9_]{0,6}", "[a-z0-9 ]{0,8}", 0..5)
    }

    /// Generate a supported platform name
    pub fn platform() -> impl Strategy<Value = String> {
        prop::sample::select(crate::config::defaults::SUPPORTED_PLATFORMS).prop_map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::config::defaults::{MIN_PROPTEST_ITERATIONS, SUPPORTED_PLATFORMS};
    use crate::core::swmodule::is_valid_name;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(MIN_PROPTEST_ITERATIONS))]

        #[test]
        fn test_lib_name_is_valid(name in lib_name()) {
            prop_assert!(is_valid_name(&name), "invalid name: {}", name);
        }

        #[test]
        fn test_local_location_ends_in_name(loc in lib_name().prop_flat_map(local_location)) {
            prop_assert!(!loc.starts_with('/'));
            prop_assert!(loc.contains('/'));
        }

        #[test]
        fn test_path_entry_is_relative(entry in path_entry()) {
            let path = entry.trim_start_matches(['+', '-']);
            prop_assert!(!path.is_empty());
            prop_assert!(!path.starts_with('/'));
        }

        #[test]
        fn test_var_map_has_no_placeholders(vars in var_map()) {
            prop_assert!(vars.values().all(|v| !v.contains("${")), "unexpanded variable reference remains");
        }

        #[test]
        fn test_platform_is_supported(p in platform()) {
            prop_assert!(SUPPORTED_PLATFORMS.iter().any(|s| *s == p));
        }
    }
}

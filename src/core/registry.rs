//! Name registry
//!
//! Resolve-once-by-name store shared by every resolution task. Each name owns a
//! slot guarded by its own async mutex, so at most one task works on a given
//! library at a time while unrelated names proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as SlotMutex, OwnedMutexGuard};

/// Per-name slot, empty until the first resolution of the name succeeds
pub type Slot<T> = OwnedMutexGuard<Option<T>>;

/// Concurrent keyed store with per-key mutual exclusion
#[derive(Debug)]
pub struct NameRegistry<T> {
    slots: Mutex<HashMap<String, Arc<SlotMutex<Option<T>>>>>,
}

impl<T> Default for NameRegistry<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> NameRegistry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the slot for `name`, creating it if absent
    ///
    /// A newly created slot is locked before it becomes visible to other callers,
    /// so exactly one caller observes it empty. An existing slot is returned once
    /// its current holder releases it.
    pub async fn add_or_fetch_and_lock(&self, name: &str) -> Slot<T> {
        let existing = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            match slots.get(name) {
                Some(slot) => Arc::clone(slot),
                None => {
                    let slot = Arc::new(SlotMutex::new(None));
                    if let Ok(guard) = Arc::clone(&slot).try_lock_owned() {
                        slots.insert(name.to_string(), slot);
                        return guard;
                    }
                    slots.insert(name.to_string(), Arc::clone(&slot));
                    slot
                }
            }
        };
        existing.lock_owned().await
    }

    /// Whether a slot for `name` has been created
    pub fn contains(&self, name: &str) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Number of names seen so far
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no names have been seen
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_caller_gets_empty_slot() {
        let registry = NameRegistry::<u32>::new();
        let mut slot = registry.add_or_fetch_and_lock("mylib").await;
        assert!(slot.is_none());
        *slot = Some(7);
        drop(slot);

        let slot = registry.add_or_fetch_and_lock("mylib").await;
        assert_eq!(*slot, Some(7));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_second_caller_waits_for_holder() {
        let registry = Arc::new(NameRegistry::<&'static str>::new());
        let mut first = registry.add_or_fetch_and_lock("core").await;

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let slot = registry.add_or_fetch_and_lock("core").await;
                *slot
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        *first = Some("resolved");
        drop(first);

        assert_eq!(waiter.await.unwrap(), Some("resolved"));
    }

    #[tokio::test]
    async fn test_distinct_names_do_not_block() {
        let registry = NameRegistry::<()>::new();
        let _a = registry.add_or_fetch_and_lock("a").await;
        let b = tokio::time::timeout(
            Duration::from_millis(200),
            registry.add_or_fetch_and_lock("b"),
        )
        .await;
        assert!(b.is_ok());
        assert!(registry.contains("a"));
        assert!(!registry.contains("c"));
    }
}

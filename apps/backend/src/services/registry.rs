//! Per-user in-memory lesson state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Active lessons keyed by user id.
///
/// The outer lock only guards the map. Each entry has its own async lock
/// that callers hold for a whole mutate-then-advance step.
pub struct Registry<T> {
    entries: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<T>>>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` for the user, replacing any previous entry.
    pub fn insert(&self, user_id: i64, value: T) -> Arc<tokio::sync::Mutex<T>> {
        let entry = Arc::new(tokio::sync::Mutex::new(value));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, Arc::clone(&entry));
        entry
    }

    pub fn get(&self, user_id: i64) -> Option<Arc<tokio::sync::Mutex<T>>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned()
    }

    pub fn remove(&self, user_id: i64) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user_id);
    }

    /// Remove the user's entry only if it is still `entry`, so a lesson
    /// started meanwhile survives.
    pub fn remove_entry(&self, user_id: i64, entry: &Arc<tokio::sync::Mutex<T>>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.get(&user_id).is_some_and(|current| Arc::ptr_eq(current, entry)) {
            entries.remove(&user_id);
        }
    }

    pub fn contains(&self, user_id: i64) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_replaces_previous_entry() {
        let registry: Registry<u32> = Registry::new();
        registry.insert(1, 10);
        let old = registry.get(1).unwrap();
        registry.insert(1, 20);

        assert_eq!(*old.lock().await, 10);
        assert_eq!(*registry.get(1).unwrap().lock().await, 20);
    }

    #[tokio::test]
    async fn entries_are_per_user() {
        let registry: Registry<&str> = Registry::new();
        registry.insert(1, "a");
        assert!(registry.get(2).is_none());
        registry.remove(1);
        assert!(!registry.contains(1));
    }

    #[tokio::test]
    async fn remove_entry_keeps_a_newer_lesson() {
        let registry: Registry<u32> = Registry::new();
        let first = registry.insert(1, 1);
        registry.insert(1, 2);
        registry.remove_entry(1, &first);
        assert_eq!(*registry.get(1).unwrap().lock().await, 2);

        let second = registry.get(1).unwrap();
        registry.remove_entry(1, &second);
        assert!(!registry.contains(1));
    }
}

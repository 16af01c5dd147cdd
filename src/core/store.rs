use parking_lot::RwLock;
use std::collections::HashMap;

use crate::types::Toggle;

/// Storage backing the toggle cache.
///
/// Implementations must tolerate concurrent readers while a single writer
/// replaces the contents after each fetch.
pub trait StorageProvider: Send + Sync {
    /// Remove every toggle.
    fn clear(&self);

    /// Insert or replace one toggle. `None` removes the entry.
    fn set(&self, name: &str, toggle: Option<Toggle>);

    fn get(&self, name: &str) -> Option<Toggle>;

    /// Replace the full toggle set.
    ///
    /// The default goes through `clear` and `set`, so readers may briefly see
    /// an empty or partial store. `InMemoryStorage` swaps atomically.
    fn replace_all(&self, toggles: Vec<Toggle>) {
        self.clear();
        for toggle in toggles {
            let name = toggle.name.clone();
            self.set(&name, Some(toggle));
        }
    }
}

/// Thread-safe in-memory toggle store.
#[derive(Default)]
pub struct InMemoryStorage {
    entries: RwLock<HashMap<String, Toggle>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

impl StorageProvider for InMemoryStorage {
    fn clear(&self) {
        self.entries.write().clear();
    }

    fn set(&self, name: &str, toggle: Option<Toggle>) {
        let mut entries = self.entries.write();
        match toggle {
            Some(toggle) => {
                entries.insert(name.to_string(), toggle);
            }
            None => {
                entries.remove(name);
            }
        }
    }

    fn get(&self, name: &str) -> Option<Toggle> {
        self.entries.read().get(name).cloned()
    }

    fn replace_all(&self, toggles: Vec<Toggle>) {
        // Build outside the lock so writers hold it only for the swap.
        let next: HashMap<String, Toggle> = toggles
            .into_iter()
            .map(|toggle| (toggle.name.clone(), toggle))
            .collect();

        *self.entries.write() = next;
    }
}

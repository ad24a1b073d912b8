//! Display name cache keyed by remote number

use std::collections::HashMap;

use parking_lot::Mutex;

/// Remembers the last display name seen for each remote number.
///
/// One cache is shared by every aggregator of a conferencing subsystem so a
/// caller's name survives across calls even when a later call never reports
/// it. Writes are last-writer-wins.
#[derive(Debug, Default)]
pub struct NameCache {
    names: Mutex<HashMap<String, String>>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` for `number`. Empty keys or names are ignored.
    pub fn insert(&self, number: &str, name: &str) {
        let number = number.trim();
        let name = name.trim();
        if number.is_empty() || name.is_empty() {
            return;
        }
        self.names.lock().insert(number.to_string(), name.to_string());
    }

    pub fn get(&self, number: &str) -> Option<String> {
        self.names.lock().get(number.trim()).cloned()
    }

    pub fn remove(&self, number: &str) -> Option<String> {
        self.names.lock().remove(number.trim())
    }

    pub fn clear(&self) {
        self.names.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.names.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.lock().is_empty()
    }
}

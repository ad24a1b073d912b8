//! Status Dispatch Registry
//!
//! Routes inbound device status fragments to the parsers registered for
//! them. Cisco feedback is keyed by the element path below a namespace
//! (`Status/Call`, `Configuration/Conference/AutoAnswer/Mode`); Zoom messages
//! are keyed by their single top-level tag. Keys match exactly, and each
//! category is a separate key space.
//!
//! Callbacks run synchronously on the dispatching thread in registration
//! order. The registry never holds its own map entry while a callback runs,
//! so a callback may issue commands or register further callbacks.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Parser callback for one fragment type
pub type StatusCallback<F> = Arc<dyn Fn(&F) + Send + Sync>;

/// Message category a path belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCategory {
    Status,
    Configuration,
    Event,
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCategory::Status => f.write_str("status"),
            StatusCategory::Configuration => f.write_str("configuration"),
            StatusCategory::Event => f.write_str("event"),
        }
    }
}

/// Registry key: a category plus an ordered element path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusKey {
    pub category: StatusCategory,
    pub path: Vec<String>,
}

impl StatusKey {
    pub fn new<I, S>(category: StatusCategory, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            category,
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    /// Key for single-tag protocols
    pub fn tag(category: StatusCategory, tag: impl Into<String>) -> Self {
        Self {
            category,
            path: vec![tag.into()],
        }
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.path.join("/"))
    }
}

/// Path-keyed registry of fragment parsers
pub struct StatusDispatchRegistry<F> {
    callbacks: DashMap<StatusKey, Vec<StatusCallback<F>>>,
}

impl<F> StatusDispatchRegistry<F> {
    pub fn new() -> Self {
        Self {
            callbacks: DashMap::new(),
        }
    }

    /// Register a callback for a key. The same callback may be registered
    /// more than once and will then run once per registration.
    pub fn register(&self, key: StatusKey, callback: StatusCallback<F>) {
        tracing::trace!("Registering status callback for {}", key);
        self.callbacks.entry(key).or_default().push(callback);
    }

    /// Remove one registration of `callback` under `key`.
    ///
    /// Returns false (and changes nothing) if it was never registered.
    pub fn unregister(&self, key: &StatusKey, callback: &StatusCallback<F>) -> bool {
        let removed = {
            let Some(mut entry) = self.callbacks.get_mut(key) else {
                return false;
            };
            let target = Arc::as_ptr(callback) as *const ();
            match entry
                .iter()
                .position(|existing| Arc::as_ptr(existing) as *const () == target)
            {
                Some(pos) => {
                    entry.remove(pos);
                    true
                }
                None => false,
            }
        };

        if removed {
            self.callbacks.remove_if(key, |_, callbacks| callbacks.is_empty());
        }
        removed
    }

    /// Invoke every callback registered under `key`, in registration order.
    ///
    /// Returns the number of callbacks invoked.
    pub fn dispatch(&self, key: &StatusKey, fragment: &F) -> usize {
        // Snapshot so no map guard is held while callbacks run
        let callbacks: Vec<StatusCallback<F>> = match self.callbacks.get(key) {
            Some(entry) => entry.value().clone(),
            None => return 0,
        };

        for callback in &callbacks {
            callback(fragment);
        }
        callbacks.len()
    }

    pub fn has_callbacks(&self, key: &StatusKey) -> bool {
        self.callbacks
            .get(key)
            .map(|entry| !entry.is_empty())
            .unwrap_or(false)
    }

    pub fn callback_count(&self, key: &StatusKey) -> usize {
        self.callbacks.get(key).map(|entry| entry.len()).unwrap_or(0)
    }

    /// All keys with at least one callback
    pub fn keys(&self) -> Vec<StatusKey> {
        self.callbacks.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl<F> Default for StatusDispatchRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

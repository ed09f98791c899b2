//! Request-scoped execution context.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Request-scoped data shared by every resolver of one execution.
///
/// Cloning a `Context` yields another handle to the same underlying map, so
/// a write made by one resolver is visible to its siblings. Mutation
/// discipline is entirely the caller's responsibility; the lock is internal
/// and never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct Context {
    data: Arc<RwLock<HashMap<String, Value>>>,
}

impl Context {
    /// Creates a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value in the context.
    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            if let Ok(mut data) = self.data.write() {
                data.insert(key.into(), v);
            }
        }
    }

    /// Gets a value from the context.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data
            .read()
            .ok()
            .and_then(|data| data.get(key).cloned())
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Returns true if the key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.data.read().map(|data| data.contains_key(key)).unwrap_or(false)
    }

    /// Removes a value from the context.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.write().ok().and_then(|mut data| data.remove(key))
    }
}

//! Shared key-value state for one lesson session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

/// In-memory state shared between the host and every embedded frame in a
/// session.
///
/// Content writes through `update-state` and reads through `get-state`;
/// the host can do both directly. The map lives exactly as long as the
/// runtime that owns it, so nothing here survives a lesson reload.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    entries: Arc<Mutex<HashMap<String, Value>>>,
}

impl SessionState {
    /// Create an empty state map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite one entry.
    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.lock().insert(key.into(), value);
    }

    /// Look up one entry, cloning the stored value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Remove one entry, returning it if present.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.lock().remove(key)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn put_get_and_remove_round_trip() {
        let state = SessionState::new();
        assert!(state.is_empty());

        state.put("score", json!(42));
        state.put("score", json!(43));
        assert_eq!(state.get("score"), Some(json!(43)));
        assert_eq!(state.len(), 1);

        assert_eq!(state.remove("score"), Some(json!(43)));
        assert_eq!(state.get("score"), None);
    }

    #[test]
    fn clones_share_the_same_map() {
        let state = SessionState::new();
        let alias = state.clone();
        alias.put("phase", json!("intro"));
        assert_eq!(state.get("phase"), Some(json!("intro")));
    }
}

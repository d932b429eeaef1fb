use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;

/// Key under which the last successful route is remembered.
pub const ROUTE_KEY: &str = "sockline.route";

/// Small persistent key-value storage collaborator.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Bytes>;
    fn set(&self, key: &str, value: Bytes);
    fn remove(&self, key: &str);
}

/// Process-local store, mainly for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut HashMap<String, Bytes>) -> R) -> R {
        let mut guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Bytes> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Bytes) {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), value);
        });
    }

    fn remove(&self, key: &str) {
        self.with_entries(|entries| {
            entries.remove(key);
        });
    }
}

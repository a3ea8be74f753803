use std::collections::HashMap;

use parking_lot::RwLock;

/// Installation-scoped boolean settings.
pub trait PropertiesStore: Send + Sync {
    fn is_true_value(&self, key: &str) -> bool;

    fn set_value(&self, key: &str, value: bool);
}

/// A [`PropertiesStore`] that lives for the current process only.
#[derive(Debug, Default)]
pub struct InMemoryProperties {
    values: RwLock<HashMap<String, bool>>,
}

impl InMemoryProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: impl Into<String>, value: bool) -> Self {
        let store = Self::new();
        store.values.write().insert(key.into(), value);
        store
    }

    /// Raw lookup distinguishing "never set" (`None`) from `false`.
    pub fn get(&self, key: &str) -> Option<bool> {
        self.values.read().get(key).copied()
    }
}

impl PropertiesStore for InMemoryProperties {
    fn is_true_value(&self, key: &str) -> bool {
        self.get(key).unwrap_or(false)
    }

    fn set_value(&self, key: &str, value: bool) {
        self.values.write().insert(key.to_owned(), value);
    }
}

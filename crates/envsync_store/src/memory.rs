//! In-memory settings store for testing.

use crate::error::{StoreError, StoreResult};
use crate::store::{check_finite, check_key, SettingsStore, StoredValue};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// An in-memory settings store.
///
/// This store keeps all values in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Hosts that do not want settings to outlive the process
///
/// It also counts writes and flushes so tests can assert on persistence
/// behaviour.
///
/// # Example
///
/// ```rust
/// use envsync_store::{InMemoryStore, SettingsStore};
///
/// let store = InMemoryStore::new();
/// store.set_bool("env.customized", true).unwrap();
/// assert_eq!(store.get_bool("env.customized"), Some(true));
/// assert_eq!(store.write_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: RwLock<BTreeMap<String, StoredValue>>,
    writes: AtomicU64,
    flushes: AtomicU64,
    closed: AtomicBool,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing values.
    ///
    /// Useful for testing migration of old snapshots.
    #[must_use]
    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, StoredValue)>,
        K: Into<String>,
    {
        Self {
            values: RwLock::new(values.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            ..Self::default()
        }
    }

    /// Returns a copy of every stored entry.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, StoredValue> {
        self.values.read().clone()
    }

    /// Returns true if `key` holds a value of any type.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Number of successful `set_*` calls.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of successful `flush` calls.
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Makes every subsequent write fail with [`StoreError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Clears all entries and counters, and reopens the store.
    pub fn clear(&self) {
        self.values.write().clear();
        self.writes.store(0, Ordering::SeqCst);
        self.flushes.store(0, Ordering::SeqCst);
        self.closed.store(false, Ordering::SeqCst);
    }

    fn put(&self, key: &str, value: StoredValue) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        check_key(key)?;
        self.values.write().insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl SettingsStore for InMemoryStore {
    fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.read().get(key).and_then(StoredValue::as_bool)
    }

    fn get_float(&self, key: &str) -> Option<f32> {
        self.values.read().get(key).and_then(StoredValue::as_float)
    }

    fn get_string(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .get(key)
            .and_then(|v| v.as_text().map(str::to_string))
    }

    fn set_bool(&self, key: &str, value: bool) -> StoreResult<()> {
        self.put(key, StoredValue::Bool(value))
    }

    fn set_float(&self, key: &str, value: f32) -> StoreResult<()> {
        check_finite(key, value)?;
        self.put(key, StoredValue::Float(value))
    }

    fn set_string(&self, key: &str, value: &str) -> StoreResult<()> {
        self.put(key, StoredValue::Text(value.to_string()))
    }

    fn flush(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

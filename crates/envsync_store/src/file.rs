//! JSON file settings store.

use crate::error::{StoreError, StoreResult};
use crate::store::{check_finite, check_key, SettingsStore, StoredValue};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

/// A settings store backed by a single JSON file.
///
/// The whole map is loaded on open and held in memory. Writes only touch the
/// in-memory map; [`SettingsStore::flush`] rewrites the file when anything
/// changed since the last flush.
///
/// # Durability
///
/// `flush()` writes to a sibling temporary file, syncs it, and renames it over
/// the target so a crash never leaves a half-written settings file.
///
/// # Example
///
/// ```no_run
/// use envsync_store::{FileStore, SettingsStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("settings.json")).unwrap();
/// store.set_float("env.schema_version", 3.0).unwrap();
/// store.flush().unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, StoredValue>>,
    dirty: Mutex<bool>,
}

impl FileStore {
    /// Opens the settings file at `path`, or starts empty if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let values = if path.exists() {
            let file = File::open(path)?;
            if file.metadata()?.len() == 0 {
                BTreeMap::new()
            } else {
                serde_json::from_reader(BufReader::new(file))?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            values: RwLock::new(values),
            dirty: Mutex::new(false),
        })
    }

    /// Opens the settings file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot
    /// be read.
    pub fn open_with_create_dirs(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the settings file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a copy of every entry.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, StoredValue> {
        self.values.read().clone()
    }

    fn put(&self, key: &str, value: StoredValue) -> StoreResult<()> {
        check_key(key)?;
        let mut values = self.values.write();
        if values.get(key) != Some(&value) {
            values.insert(key.to_string(), value);
            *self.dirty.lock() = true;
        }
        Ok(())
    }
}

impl SettingsStore for FileStore {
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
        let mut dirty = self.dirty.lock();
        if !*dirty {
            return Ok(());
        }

        let bytes = serde_json::to_vec_pretty(&*self.values.read())?;
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path).map_err(StoreError::Io)?;

        *dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_missing_opens_empty() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(&dir.path().join("settings.json")).unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn file_persists_after_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set_float("env.schema_version", 3.0).unwrap();
            store.set_bool("env.customized", true).unwrap();
            store.set_string("env.skyimage.path", "sky/dusk.exr").unwrap();
            store.flush().unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get_float("env.schema_version"), Some(3.0));
        assert_eq!(store.get_bool("env.customized"), Some(true));
        assert_eq!(store.get_string("env.skyimage.path").as_deref(), Some("sky/dusk.exr"));
    }

    #[test]
    fn file_unflushed_writes_are_lost() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set_float("env.fog.density", 0.1).unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get_float("env.fog.density"), None);
    }

    #[test]
    fn file_create_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("settings.json");
        let store = FileStore::open_with_create_dirs(&path).unwrap();
        store.set_bool("env.customized", false).unwrap();
        store.flush().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn file_corrupted_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, b"{ not json").unwrap();

        let result = FileStore::open(&path);
        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }

    #[test]
    fn file_flush_without_changes_does_not_create_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = FileStore::open(&path).unwrap();
        store.flush().unwrap();
        assert!(!path.exists());
    }
}

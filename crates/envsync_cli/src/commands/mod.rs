//! CLI command implementations.

pub mod hash;
pub mod inspect;
pub mod migrate;
pub mod simulate;

use envsync_core::{EnvironmentCache, LoadReport, SettingsPersistence};
use envsync_store::{FileStore, InMemoryStore};
use std::path::Path;

/// A stored snapshot loaded into a cache without touching the file.
///
/// Migrations run against an in-memory copy of the file.
pub struct LoadedSnapshot {
    /// The file as read.
    pub file: FileStore,
    /// The cache after loading.
    pub cache: EnvironmentCache,
    /// What the load did.
    pub report: LoadReport,
}

/// Opens `path` and loads it into a fresh cache.
pub fn load_snapshot(
    path: &Path,
    namespace: &str,
) -> Result<LoadedSnapshot, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No settings file found at {:?}", path).into());
    }
    let file = FileStore::open(path)?;
    let copy = InMemoryStore::with_values(file.snapshot());
    let mut cache = EnvironmentCache::new();
    let report = SettingsPersistence::new(namespace).load(&copy, &mut cache)?;
    Ok(LoadedSnapshot {
        file,
        cache,
        report,
    })
}

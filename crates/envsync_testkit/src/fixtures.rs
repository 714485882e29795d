//! Test fixtures wiring a synchronizer to in-memory collaborators.

use envsync_core::{Domain, DomainState, EnvironmentCache, SettingsPersistence};
use envsync_engine::{
    FrameReport, MemoryAuthority, RecordingLoader, SyncConfig, SyncPolicy, Synchronizer,
};
use envsync_store::{FileStore, InMemoryStore, SettingsStore, StoredValue};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A synchronizer with an in-memory store, scene and loader.
///
/// The scene and loader are shared handles; the harness keeps clones so
/// tests can inspect and drive them while the synchronizer owns its own.
pub struct TestHarness {
    /// The synchronizer under test.
    pub sync: Synchronizer,
    /// The scene, attached or not.
    pub scene: MemoryAuthority,
    /// The settings store.
    pub store: Arc<InMemoryStore>,
    /// The image loader.
    pub loader: RecordingLoader,
}

impl TestHarness {
    /// Creates a detached harness that persists without debounce.
    pub fn new(policy: SyncPolicy) -> Self {
        Self::with_config(immediate_config(policy))
    }

    /// Creates a detached harness with a custom configuration.
    pub fn with_config(config: SyncConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryStore::new()))
    }

    /// Creates a detached harness over an existing store.
    pub fn with_store(config: SyncConfig, store: Arc<InMemoryStore>) -> Self {
        let loader = RecordingLoader::new();
        let sync = Synchronizer::new(config, store.clone()).with_loader(Box::new(loader.clone()));
        Self {
            sync,
            scene: MemoryAuthority::new(),
            store,
            loader,
        }
    }

    /// Creates a harness already attached to its scene.
    pub fn attached(policy: SyncPolicy) -> Self {
        let mut harness = Self::new(policy);
        harness.attach();
        harness
    }

    /// Adds an object holding engine defaults for every domain enabled by
    /// default.
    pub fn populate_scene(&self) {
        for domain in Domain::ALL.into_iter().filter(|d| d.enabled_by_default()) {
            self.scene.insert_state(&DomainState::default_for(domain));
        }
    }

    /// Attaches the harness scene.
    pub fn attach(&mut self) {
        self.sync.attach(Box::new(self.scene.clone()));
    }

    /// Runs `n` frames.
    pub fn run_frames(&mut self, n: usize) -> Vec<FrameReport> {
        (0..n).map(|_| self.sync.on_frame_start()).collect()
    }

    /// A fresh synchronizer over the same store, with settings loaded.
    pub fn reload(&self) -> Synchronizer {
        let mut sync = Synchronizer::new(self.sync.config().clone(), self.store.clone());
        sync.load_settings().expect("Failed to load settings");
        sync
    }
}

impl std::ops::Deref for TestHarness {
    type Target = Synchronizer;

    fn deref(&self) -> &Self::Target {
        &self.sync
    }
}

impl std::ops::DerefMut for TestHarness {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.sync
    }
}

/// A configuration that persists as soon as edits settle and retries
/// failed pushes on the next frame.
pub fn immediate_config(policy: SyncPolicy) -> SyncConfig {
    SyncConfig::new()
        .with_policy(policy)
        .with_persist_debounce_frames(0)
        .with_retry(envsync_engine::RetryConfig::immediate())
}

/// A settings file in a temporary directory.
pub struct TestSettingsFile {
    dir: TempDir,
}

impl TestSettingsFile {
    /// Creates an empty temporary directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Path of the settings file.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("settings").join("environment.json")
    }

    /// Opens the settings file.
    pub fn open(&self) -> Arc<FileStore> {
        Arc::new(FileStore::open_with_create_dirs(&self.path()).expect("Failed to open settings file"))
    }
}

impl Default for TestSettingsFile {
    fn default() -> Self {
        Self::new()
    }
}

/// A store holding a snapshot written by an older schema.
///
/// Version 1 stored the sky image scale as `1 + ev`; versions 1 and 2 kept
/// the fog falloff under `fog.falloff` and the sun elevation in radians
/// under `sun.elevation`.
pub fn legacy_snapshot(version: u32) -> InMemoryStore {
    let mut values = vec![
        ("env.schema_version", StoredValue::Float(version as f32)),
        ("env.customized", StoredValue::Bool(true)),
        ("env.fog.enabled", StoredValue::Bool(true)),
        ("env.fog.density", StoredValue::Float(0.05)),
        ("env.fog.falloff", StoredValue::Float(0.6)),
        ("env.sun.enabled", StoredValue::Bool(true)),
        ("env.sun.elevation", StoredValue::Float(std::f32::consts::FRAC_PI_6)),
    ];
    if version < 2 {
        values.push(("env.skyimage.exposure_ev", StoredValue::Float(1.0)));
        values.push(("env.skyimage.intensity_scale", StoredValue::Float(2.0)));
    }
    InMemoryStore::with_values(values)
}

/// Saves `cache` into a fresh in-memory store.
pub fn saved(cache: &EnvironmentCache) -> InMemoryStore {
    let store = InMemoryStore::new();
    SettingsPersistence::default()
        .save(&store, cache)
        .expect("Failed to save settings");
    store
}

/// Loads a fresh cache from `store`.
pub fn loaded(store: &dyn SettingsStore) -> EnvironmentCache {
    let mut cache = EnvironmentCache::new();
    SettingsPersistence::default()
        .load(store, &mut cache)
        .expect("Failed to load settings");
    cache
}

#[cfg(test)]
mod tests {
    use super::*;
    use envsync_engine::BindingState;

    #[test]
    fn attached_harness() {
        let mut harness = TestHarness::attached(SyncPolicy::ForceOverride);
        assert_eq!(harness.binding_state(), BindingState::BoundOverride);
        harness.run_frames(1);
        assert_eq!(harness.scene.object_count(), 4);
    }

    #[test]
    fn legacy_snapshots_migrate() {
        for version in [1, 2] {
            let store = legacy_snapshot(version);
            let cache = loaded(&store);
            assert_eq!(cache.fog.height_falloff, 0.6);
            assert!((cache.sun.elevation_deg - 30.0).abs() < 1e-4);
        }
    }

    #[test]
    fn settings_file_round_trip() {
        let file = TestSettingsFile::new();
        let mut harness = TestHarness::new(SyncPolicy::FollowExternal);
        harness.set_field(Domain::Sun, "intensity", 3.0).unwrap();
        let cache = harness.cache().clone();

        let store = file.open();
        SettingsPersistence::default().save(store.as_ref(), &cache).unwrap();
        assert!(file.path().exists());
        assert_eq!(loaded(file.open().as_ref()).sun.intensity, 3.0);
    }
}

//! Schema migration for persisted settings snapshots.
//!
//! A snapshot records the schema version it was written with under
//! `<namespace>.schema_version`. Loading an older snapshot runs every
//! registered migration above that version, in order, against the raw key
//! space of the store. Migrations are forward-only; each one is keyed by the
//! version it upgrades *to*.
//!
//! ## Usage
//!
//! ```ignore
//! use envsync_core::migration::{MigrationContext, MigrationManager, SchemaMigration};
//!
//! struct RenameTint;
//! impl SchemaMigration for RenameTint {
//!     fn version(&self) -> SchemaVersion { 4 }
//!     fn name(&self) -> &str { "rename_skylight_tint" }
//!     fn up(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()> {
//!         ctx.rename_float("skylight.color", "skylight.tint")?;
//!         Ok(())
//!     }
//! }
//! ```

use crate::error::{CoreError, CoreResult};
use envsync_store::SettingsStore;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Version number of the persisted snapshot layout.
pub type SchemaVersion = u32;

/// The schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: SchemaVersion = 3;

/// The version assumed for snapshots that predate versioning.
pub const BASELINE_SCHEMA_VERSION: SchemaVersion = 1;

/// Information about a registered migration.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationInfo {
    /// Version the migration upgrades to.
    pub version: SchemaVersion,
    /// Short identifier.
    pub name: String,
    /// What the migration changes.
    pub description: Option<String>,
}

/// Result of running one migration.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    /// Version the migration upgrades to.
    pub version: SchemaVersion,
    /// The migration name.
    pub name: String,
    /// Whether it succeeded.
    pub success: bool,
    /// Error message if it failed.
    pub error: Option<String>,
    /// Key-level operations it performed.
    pub operations: Vec<MigrationOperation>,
}

/// Result of upgrading a snapshot.
#[derive(Debug, Clone)]
pub struct MigrationRunResult {
    /// Migrations attempted, in order.
    pub migrations: Vec<MigrationResult>,
    /// The version the snapshot is at afterwards.
    pub final_version: SchemaVersion,
    /// Number of migrations applied.
    pub applied_count: usize,
    /// Number of migrations that failed (0 or 1; the run stops at a failure).
    pub failed_count: usize,
}

impl MigrationRunResult {
    /// True if every attempted migration succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed_count == 0
    }
}

/// A key-level change made by a migration.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOperation {
    /// A value was copied to a new key.
    RenameKey {
        /// Old key.
        from: String,
        /// New key.
        to: String,
    },
    /// A derived value was recomputed.
    Recompute {
        /// Key written.
        key: String,
        /// New value.
        value: f32,
    },
    /// A value was converted between units.
    ConvertUnit {
        /// Source key.
        from: String,
        /// Destination key.
        to: String,
        /// Unit of the source.
        from_unit: &'static str,
        /// Unit of the destination.
        to_unit: &'static str,
    },
    /// Anything else.
    Custom {
        /// Description of the operation.
        description: String,
    },
}

/// Access to the store during a migration.
///
/// Keys passed to the helpers are relative to the namespace, e.g.
/// `"fog.falloff"` for `env.fog.falloff`.
pub struct MigrationContext<'a> {
    /// Version the snapshot was at before this migration.
    pub from_version: SchemaVersion,
    /// Operations performed so far.
    pub operations: Vec<MigrationOperation>,
    store: &'a dyn SettingsStore,
    namespace: &'a str,
}

impl<'a> MigrationContext<'a> {
    /// Creates a context over a store.
    pub fn new(store: &'a dyn SettingsStore, namespace: &'a str, from_version: SchemaVersion) -> Self {
        Self {
            from_version,
            operations: Vec::new(),
            store,
            namespace,
        }
    }

    /// The absolute key for a namespace-relative one.
    #[must_use]
    pub fn key(&self, relative: &str) -> String {
        format!("{}.{}", self.namespace, relative)
    }

    /// Reads a float.
    #[must_use]
    pub fn get_float(&self, relative: &str) -> Option<f32> {
        self.store.get_float(&self.key(relative))
    }

    /// Writes a float.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub fn set_float(&mut self, relative: &str, value: f32) -> CoreResult<()> {
        self.store.set_float(&self.key(relative), value)?;
        Ok(())
    }

    /// Copies a float to a new key unless the new key already holds one.
    ///
    /// Returns true if a value was copied.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub fn rename_float(&mut self, from: &str, to: &str) -> CoreResult<bool> {
        let Some(value) = self.get_float(from) else {
            return Ok(false);
        };
        if self.get_float(to).is_some() {
            return Ok(false);
        }
        self.set_float(to, value)?;
        self.operations.push(MigrationOperation::RenameKey {
            from: self.key(from),
            to: self.key(to),
        });
        Ok(true)
    }

    /// Rewrites a derived float.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub fn recompute(&mut self, relative: &str, value: f32) -> CoreResult<()> {
        self.set_float(relative, value)?;
        self.operations.push(MigrationOperation::Recompute {
            key: self.key(relative),
            value,
        });
        Ok(())
    }

    /// Records a custom operation.
    pub fn custom(&mut self, description: &str) {
        self.operations.push(MigrationOperation::Custom {
            description: description.to_string(),
        });
    }
}

/// A forward-only upgrade of the persisted key layout.
pub trait SchemaMigration: Send + Sync {
    /// The version this migration upgrades to.
    ///
    /// Versions must be unique and sequential from
    /// `BASELINE_SCHEMA_VERSION + 1`.
    fn version(&self) -> SchemaVersion;

    /// Short identifier.
    fn name(&self) -> &str;

    /// Optional description.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Rewrites keys in the store.
    fn up(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()>;
}

/// v1 stored `skyimage.intensity_scale` as `1 + ev`; it is `2^ev` since v2.
struct ExposureScaleFormula;

impl SchemaMigration for ExposureScaleFormula {
    fn version(&self) -> SchemaVersion {
        2
    }

    fn name(&self) -> &str {
        "skyimage_exposure_scale"
    }

    fn description(&self) -> Option<&str> {
        Some("recompute sky image intensity scale as 2^exposure_ev")
    }

    fn up(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()> {
        let Some(ev) = ctx.get_float("skyimage.exposure_ev") else {
            return Ok(());
        };
        let ev = if ev.is_finite() { ev.clamp(-16.0, 16.0) } else { 0.0 };
        ctx.recompute("skyimage.intensity_scale", ev.exp2())
    }
}

/// v3 renamed `fog.falloff` and moved the sun elevation from radians to
/// degrees under a new key.
struct FogFalloffAndSunDegrees;

impl SchemaMigration for FogFalloffAndSunDegrees {
    fn version(&self) -> SchemaVersion {
        3
    }

    fn name(&self) -> &str {
        "fog_falloff_sun_degrees"
    }

    fn description(&self) -> Option<&str> {
        Some("rename fog.falloff to fog.height_falloff; sun.elevation radians to sun.elevation_deg")
    }

    fn up(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()> {
        ctx.rename_float("fog.falloff", "fog.height_falloff")?;

        if let Some(radians) = ctx.get_float("sun.elevation") {
            if ctx.get_float("sun.elevation_deg").is_none() {
                ctx.set_float("sun.elevation_deg", radians.to_degrees())?;
                ctx.operations.push(MigrationOperation::ConvertUnit {
                    from: ctx.key("sun.elevation"),
                    to: ctx.key("sun.elevation_deg"),
                    from_unit: "rad",
                    to_unit: "deg",
                });
            }
        }
        Ok(())
    }
}

/// Holds migrations keyed by target version.
pub struct MigrationManager {
    migrations: BTreeMap<SchemaVersion, Box<dyn SchemaMigration>>,
}

impl MigrationManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            migrations: BTreeMap::new(),
        }
    }

    /// Creates a manager with every migration needed to reach
    /// [`CURRENT_SCHEMA_VERSION`].
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut migrations: BTreeMap<SchemaVersion, Box<dyn SchemaMigration>> = BTreeMap::new();
        migrations.insert(2, Box::new(ExposureScaleFormula));
        migrations.insert(3, Box::new(FogFalloffAndSunDegrees));
        Self { migrations }
    }

    /// Registers a migration.
    ///
    /// # Errors
    ///
    /// Returns an error if the version is already registered.
    pub fn register(&mut self, migration: Box<dyn SchemaMigration>) -> CoreResult<()> {
        let version = migration.version();
        if self.migrations.contains_key(&version) {
            return Err(CoreError::migration_failed(format!(
                "migration version {version} already registered"
            )));
        }
        self.migrations.insert(version, migration);
        Ok(())
    }

    /// Registered migrations in version order.
    #[must_use]
    pub fn list(&self) -> Vec<MigrationInfo> {
        self.migrations.values().map(|m| info_of(m.as_ref())).collect()
    }

    /// Migrations that upgrade a snapshot at `from`.
    #[must_use]
    pub fn pending(&self, from: SchemaVersion) -> Vec<MigrationInfo> {
        self.migrations
            .range(from.saturating_add(1)..)
            .map(|(_, m)| info_of(m.as_ref()))
            .collect()
    }

    /// The highest version reachable.
    #[must_use]
    pub fn latest(&self) -> SchemaVersion {
        self.migrations
            .keys()
            .next_back()
            .copied()
            .unwrap_or(BASELINE_SCHEMA_VERSION)
    }

    /// Upgrades the snapshot in `store` from version `from`.
    ///
    /// Stops at the first failing migration; the result then reports the
    /// last version reached.
    pub fn run(
        &self,
        store: &dyn SettingsStore,
        namespace: &str,
        from: SchemaVersion,
    ) -> MigrationRunResult {
        let mut results = Vec::new();
        let mut current = from;
        let mut applied_count = 0;
        let mut failed_count = 0;

        for (version, migration) in self.migrations.range(from.saturating_add(1)..) {
            let mut ctx = MigrationContext::new(store, namespace, current);
            let outcome = migration.up(&mut ctx);
            let operations = ctx.operations;

            match outcome {
                Ok(()) => {
                    info!(
                        version = *version,
                        name = migration.name(),
                        operations = operations.len(),
                        "applied settings migration"
                    );
                    for op in &operations {
                        debug!(?op, "migration operation");
                    }
                    current = *version;
                    applied_count += 1;
                    results.push(MigrationResult {
                        version: *version,
                        name: migration.name().to_string(),
                        success: true,
                        error: None,
                        operations,
                    });
                }
                Err(e) => {
                    failed_count += 1;
                    results.push(MigrationResult {
                        version: *version,
                        name: migration.name().to_string(),
                        success: false,
                        error: Some(e.to_string()),
                        operations,
                    });
                    break;
                }
            }
        }

        MigrationRunResult {
            migrations: results,
            final_version: current,
            applied_count,
            failed_count,
        }
    }

    /// Checks that versions run without gaps from the baseline.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing version.
    pub fn validate(&self) -> CoreResult<()> {
        for (i, version) in self.migrations.keys().enumerate() {
            let expected = BASELINE_SCHEMA_VERSION + 1 + i as SchemaVersion;
            if *version != expected {
                return Err(CoreError::migration_failed(format!(
                    "migration version gap: expected {expected}, got {version}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for MigrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationManager")
            .field("versions", &self.migrations.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn info_of(migration: &dyn SchemaMigration) -> MigrationInfo {
    MigrationInfo {
        version: migration.version(),
        name: migration.name().to_string(),
        description: migration.description().map(String::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envsync_store::InMemoryStore;

    struct TestMigration {
        version: SchemaVersion,
        should_fail: bool,
    }

    impl SchemaMigration for TestMigration {
        fn version(&self) -> SchemaVersion {
            self.version
        }

        fn name(&self) -> &str {
            "test"
        }

        fn up(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()> {
            if self.should_fail {
                return Err(CoreError::migration_failed("intentional failure"));
            }
            ctx.custom("test operation");
            Ok(())
        }
    }

    fn make_migration(version: SchemaVersion, should_fail: bool) -> Box<dyn SchemaMigration> {
        Box::new(TestMigration {
            version,
            should_fail,
        })
    }

    #[test]
    fn builtin_reaches_current_version() {
        let manager = MigrationManager::with_builtin();
        assert_eq!(manager.latest(), CURRENT_SCHEMA_VERSION);
        assert!(manager.validate().is_ok());
        assert_eq!(manager.list().len(), 2);
    }

    #[test]
    fn duplicate_version_rejected() {
        let mut manager = MigrationManager::with_builtin();
        assert!(manager.register(make_migration(2, false)).is_err());
        assert!(manager.register(make_migration(4, false)).is_ok());
    }

    #[test]
    fn pending_starts_above_version() {
        let manager = MigrationManager::with_builtin();
        assert_eq!(manager.pending(1).len(), 2);
        assert_eq!(manager.pending(2)[0].version, 3);
        assert!(manager.pending(CURRENT_SCHEMA_VERSION).is_empty());
    }

    #[test]
    fn validate_detects_gaps() {
        let mut manager = MigrationManager::new();
        manager.register(make_migration(2, false)).unwrap();
        manager.register(make_migration(4, false)).unwrap();
        assert!(manager.validate().is_err());
    }

    #[test]
    fn failure_stops_execution() {
        let mut manager = MigrationManager::new();
        manager.register(make_migration(2, false)).unwrap();
        manager.register(make_migration(3, true)).unwrap();
        manager.register(make_migration(4, false)).unwrap();

        let store = InMemoryStore::new();
        let result = manager.run(&store, "env", 1);

        assert_eq!(result.applied_count, 1);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.migrations.len(), 2);
        assert_eq!(result.final_version, 2);
        assert!(!result.is_success());
    }

    #[test]
    fn v2_recomputes_intensity_scale() {
        let store = InMemoryStore::new();
        store.set_float("env.skyimage.exposure_ev", 2.0).unwrap();
        store.set_float("env.skyimage.intensity_scale", 3.0).unwrap();

        let result = MigrationManager::with_builtin().run(&store, "env", 1);

        assert!(result.is_success());
        assert_eq!(result.final_version, 3);
        assert_eq!(store.get_float("env.skyimage.intensity_scale"), Some(4.0));
    }

    #[test]
    fn v3_renames_fog_and_converts_sun() {
        let store = InMemoryStore::new();
        store.set_float("env.fog.falloff", 0.7).unwrap();
        store
            .set_float("env.sun.elevation", std::f32::consts::FRAC_PI_6)
            .unwrap();

        let result = MigrationManager::with_builtin().run(&store, "env", 2);

        assert_eq!(result.applied_count, 1);
        assert_eq!(store.get_float("env.fog.height_falloff"), Some(0.7));
        let elevation = store.get_float("env.sun.elevation_deg").unwrap();
        assert!((elevation - 30.0).abs() < 1e-4);
        assert_eq!(result.migrations[0].operations.len(), 2);
    }

    #[test]
    fn rename_keeps_existing_target() {
        let store = InMemoryStore::new();
        store.set_float("env.fog.falloff", 0.7).unwrap();
        store.set_float("env.fog.height_falloff", 0.4).unwrap();

        let mut ctx = MigrationContext::new(&store, "env", 2);
        assert!(!ctx.rename_float("fog.falloff", "fog.height_falloff").unwrap());
        assert!(ctx.operations.is_empty());
        assert_eq!(store.get_float("env.fog.height_falloff"), Some(0.4));
    }

    #[test]
    fn up_to_date_snapshot_runs_nothing() {
        let store = InMemoryStore::new();
        let result = MigrationManager::with_builtin().run(&store, "env", CURRENT_SCHEMA_VERSION);
        assert!(result.migrations.is_empty());
        assert_eq!(result.final_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(store.write_count(), 0);
    }
}

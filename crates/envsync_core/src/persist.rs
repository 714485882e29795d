//! The persisted snapshot layout.
//!
//! ```text
//! env.schema_version        float
//! env.customized            bool
//! env.<domain>.enabled      bool, every domain
//! env.<domain>.<field>      enabled domains only
//! env.<domain>.<color>.r    colours as three floats
//! ```
//!
//! Choices are stored as floats carrying the enumeration code.

use crate::domain::{Domain, DomainMask};
use crate::error::{CoreError, CoreResult};
use crate::field::{FieldValue, Rgb};
use crate::migration::{MigrationManager, SchemaVersion, BASELINE_SCHEMA_VERSION, CURRENT_SCHEMA_VERSION};
use crate::state::{DomainState, EnvironmentCache};
use crate::validate::validate;
use envsync_store::SettingsStore;
use tracing::{debug, info, warn};

/// Namespace under which the environment snapshot is stored.
pub const DEFAULT_NAMESPACE: &str = "env";

const CHANNELS: [&str; 3] = ["r", "g", "b"];

/// What `load` found and did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Schema version recorded in the store, if any.
    pub stored_version: Option<SchemaVersion>,
    /// True if a custom snapshot was applied to the cache.
    pub custom_snapshot: bool,
    /// Names of migrations that ran.
    pub applied_migrations: Vec<String>,
    /// True if the snapshot was migrated and should be saved again.
    pub needs_rewrite: bool,
    /// True if the snapshot was written by a newer schema.
    pub newer_schema: bool,
    /// Domains whose fields were read.
    pub loaded_domains: DomainMask,
    /// Number of values repaired by validation.
    pub corrections: usize,
}

/// Reads and writes [`EnvironmentCache`] snapshots in a [`SettingsStore`].
#[derive(Debug)]
pub struct SettingsPersistence {
    namespace: String,
    migrations: MigrationManager,
}

impl Default for SettingsPersistence {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl SettingsPersistence {
    /// Creates an adapter with the built-in migrations.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::with_migrations(namespace, MigrationManager::with_builtin())
    }

    /// Creates an adapter with a custom migration set.
    pub fn with_migrations(namespace: impl Into<String>, migrations: MigrationManager) -> Self {
        Self {
            namespace: namespace.into(),
            migrations,
        }
    }

    /// The key namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The registered migrations.
    #[must_use]
    pub fn migrations(&self) -> &MigrationManager {
        &self.migrations
    }

    /// Key of the schema version.
    #[must_use]
    pub fn version_key(&self) -> String {
        format!("{}.schema_version", self.namespace)
    }

    /// Key of the custom-snapshot flag.
    #[must_use]
    pub fn customized_key(&self) -> String {
        format!("{}.customized", self.namespace)
    }

    /// Key of a domain's enabled flag.
    #[must_use]
    pub fn enabled_key(&self, domain: Domain) -> String {
        format!("{}.{}.enabled", self.namespace, domain.key_segment())
    }

    /// Key of a field.
    #[must_use]
    pub fn field_key(&self, domain: Domain, field: &str) -> String {
        format!("{}.{}.{}", self.namespace, domain.key_segment(), field)
    }

    /// The schema version in the store, if any.
    ///
    /// Unreadable versions are treated as the unversioned baseline.
    #[must_use]
    pub fn stored_version(&self, store: &dyn SettingsStore) -> Option<SchemaVersion> {
        store.get_float(&self.version_key()).map(|v| {
            if v.is_finite() && v >= BASELINE_SCHEMA_VERSION as f32 {
                v.round() as SchemaVersion
            } else {
                BASELINE_SCHEMA_VERSION
            }
        })
    }

    /// True if the store holds a user-customized snapshot.
    #[must_use]
    pub fn has_custom_snapshot(&self, store: &dyn SettingsStore) -> bool {
        self.stored_version(store).is_some()
            && store.get_bool(&self.customized_key()) == Some(true)
    }

    /// Loads a custom snapshot into `cache`.
    ///
    /// Nothing is loaded unless the store holds a schema version and the
    /// customized flag. Older snapshots are migrated in the store first.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails. The cache is left untouched.
    pub fn load(&self, store: &dyn SettingsStore, cache: &mut EnvironmentCache) -> CoreResult<LoadReport> {
        let mut report = LoadReport {
            stored_version: self.stored_version(store),
            ..LoadReport::default()
        };
        let Some(version) = report.stored_version else {
            debug!(namespace = %self.namespace, "no stored settings");
            return Ok(report);
        };
        if store.get_bool(&self.customized_key()) != Some(true) {
            debug!(namespace = %self.namespace, "stored settings are not customized");
            return Ok(report);
        }

        if version < CURRENT_SCHEMA_VERSION {
            let run = self.migrations.run(store, &self.namespace, version);
            report
                .applied_migrations
                .extend(run.migrations.iter().filter(|m| m.success).map(|m| m.name.clone()));
            if let Some(failed) = run.migrations.iter().find(|m| !m.success) {
                return Err(CoreError::migration_failed(format!(
                    "{} (v{}): {}",
                    failed.name,
                    failed.version,
                    failed.error.as_deref().unwrap_or("unknown error")
                )));
            }
            report.needs_rewrite = true;
            info!(
                from = version,
                to = run.final_version,
                applied = run.applied_count,
                "migrated stored settings"
            );
        } else if version > CURRENT_SCHEMA_VERSION {
            report.newer_schema = true;
            warn!(
                stored = version,
                supported = CURRENT_SCHEMA_VERSION,
                "stored settings come from a newer schema, loading what is readable"
            );
        }

        let mut loaded = cache.clone();
        for domain in Domain::ALL {
            if let Some(enabled) = store.get_bool(&self.enabled_key(domain)) {
                loaded.set_enabled(domain, enabled);
            }
            if !loaded.is_enabled(domain) {
                continue;
            }

            let mut state = loaded.state(domain);
            for (name, current) in state.fields() {
                let Some(value) = self.read_field(store, domain, name, &current) else {
                    continue;
                };
                if let Err(err) = state.set_field(name, value) {
                    warn!(%domain, field = name, error = %err, "ignoring unreadable stored value");
                }
            }

            let validation = validate(&mut state, true);
            report.corrections += validation.corrections.len();
            if let Some(reason) = validation.rejection {
                warn!(%domain, %reason, "stored domain cannot be applied, disabling it");
                loaded.set_enabled(domain, false);
            }
            loaded.replace(state);
            report.loaded_domains.insert(domain);
        }

        loaded.set_customized(true);
        *cache = loaded;
        report.custom_snapshot = true;
        info!(
            version,
            domains = report.loaded_domains.len(),
            corrections = report.corrections,
            "loaded stored settings"
        );
        Ok(report)
    }

    fn read_field(
        &self,
        store: &dyn SettingsStore,
        domain: Domain,
        name: &str,
        current: &FieldValue,
    ) -> Option<FieldValue> {
        let key = self.field_key(domain, name);
        match current {
            FieldValue::Float(_) => store.get_float(&key).map(FieldValue::Float),
            FieldValue::Bool(_) => store.get_bool(&key).map(FieldValue::Bool),
            FieldValue::Text(_) => store.get_string(&key).map(FieldValue::Text),
            FieldValue::Choice(_) => store
                .get_float(&key)
                .filter(|code| code.is_finite() && *code >= 0.0)
                .map(|code| FieldValue::Choice(code.round() as u32)),
            FieldValue::Color(c) => {
                let mut channels = c.to_array();
                let mut found = false;
                for (channel, suffix) in channels.iter_mut().zip(CHANNELS) {
                    if let Some(v) = store.get_float(&format!("{key}.{suffix}")) {
                        *channel = v;
                        found = true;
                    }
                }
                found.then(|| FieldValue::Color(Rgb::from_array(channels)))
            }
        }
    }

    /// Writes the cache as the current schema version, then flushes.
    ///
    /// # Errors
    ///
    /// Returns the first store error; earlier keys may already be written.
    pub fn save(&self, store: &dyn SettingsStore, cache: &EnvironmentCache) -> CoreResult<()> {
        store.set_float(&self.version_key(), CURRENT_SCHEMA_VERSION as f32)?;
        store.set_bool(&self.customized_key(), cache.is_customized())?;
        for domain in Domain::ALL {
            let enabled = cache.is_enabled(domain);
            store.set_bool(&self.enabled_key(domain), enabled)?;
            if enabled {
                self.write_state(store, &cache.state(domain))?;
            }
        }
        store.flush()?;
        debug!(
            namespace = %self.namespace,
            enabled = ?cache.enabled_mask(),
            "saved settings"
        );
        Ok(())
    }

    fn write_state(&self, store: &dyn SettingsStore, state: &DomainState) -> CoreResult<()> {
        let domain = state.domain();
        for (name, value) in state.fields() {
            let key = self.field_key(domain, name);
            match value {
                FieldValue::Float(v) => store.set_float(&key, v)?,
                FieldValue::Bool(v) => store.set_bool(&key, v)?,
                FieldValue::Text(v) => store.set_string(&key, &v)?,
                FieldValue::Choice(code) => store.set_float(&key, code as f32)?,
                FieldValue::Color(c) => {
                    for (v, suffix) in c.to_array().into_iter().zip(CHANNELS) {
                        store.set_float(&format!("{key}.{suffix}"), v)?;
                    }
                }
            }
        }
        Ok(())
    }
}

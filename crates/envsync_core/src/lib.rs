//! # envsync Core
//!
//! Value types and single-threaded bookkeeping for the environment
//! synchronizer.
//!
//! This crate provides:
//! - The [`Domain`] enumeration and [`DomainMask`] bitset
//! - Canonical per-domain state ([`DomainState`], [`EnvironmentCache`])
//! - Validate-and-clamp ([`validate`])
//! - Diagnostic hashing and field diffs ([`state_hash`], [`diff`])
//! - Dirty tracking with nested transactions ([`DirtyTracker`])
//! - The persisted snapshot layout and schema migrations
//!   ([`SettingsPersistence`], [`MigrationManager`])
//!
//! It knows nothing about the external authority; `envsync_engine` drives
//! these pieces against one.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod domain;
mod error;
mod field;
mod hash;
pub mod migration;
mod persist;
mod state;
mod tracker;
mod units;
mod validate;

pub use domain::{Domain, DomainMask};
pub use error::{CoreError, CoreResult};
pub use field::{CullMode, FieldKind, FieldValue, LightSource, Rgb, SkyLightSource, ToneMapper};
pub use hash::{diff, diff_and_log, diff_within, state_hash, FieldChange};
pub use migration::{
    MigrationContext, MigrationManager, SchemaMigration, SchemaVersion, CURRENT_SCHEMA_VERSION,
};
pub use persist::{LoadReport, SettingsPersistence, DEFAULT_NAMESPACE};
pub use state::{
    AtmosphereState, CacheSlot, CanonicalState, DomainState, EnvironmentCache, FogState,
    RendererFlagsState, SkyDiscState, SkyImageState, SkyLightState, SunState,
};
pub use tracker::DirtyTracker;
pub use units::{authority_field, from_authority, to_authority, Conversion};
pub use validate::{rules_for, validate, Correction, FieldRule, Rule, ValidationReport};

//! # envsync Testkit
//!
//! Test utilities for envsync.
//!
//! This crate provides:
//! - Fixtures wiring a synchronizer to an in-memory store, scene and loader
//! - Temporary settings files
//! - Legacy snapshots for migration tests
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use envsync_core::Domain;
//! use envsync_engine::SyncPolicy;
//! use envsync_testkit::prelude::*;
//!
//! let mut harness = TestHarness::attached(SyncPolicy::ForceOverride);
//! harness.set_field(Domain::Sun, "intensity", 12.0).unwrap();
//! harness.run_frames(1);
//! assert!(harness.scene.has_object(Domain::Sun));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;

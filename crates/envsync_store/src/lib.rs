//! # envsync Store
//!
//! Key-value settings store abstraction for envsync.
//!
//! Stores are **flat maps of dotted string keys** to booleans, floats and
//! strings. They do not know what the keys mean: the persistence adapter in
//! `envsync_core` owns the key layout, schema version and migrations.
//!
//! ## Design Principles
//!
//! - Stores are simple typed maps (get, set, flush)
//! - Reads of a missing key, or of a key holding a different type, yield `None`
//! - Stores take `&self` and lock internally so one handle can be shared
//!   between the synchronizer and the composing application
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral settings
//! - [`FileStore`] - JSON file on disk, written on `flush`
//!
//! ## Example
//!
//! ```rust
//! use envsync_store::{InMemoryStore, SettingsStore};
//!
//! let store = InMemoryStore::new();
//! store.set_float("env.fog.density", 0.05).unwrap();
//! assert_eq!(store.get_float("env.fog.density"), Some(0.05));
//! assert_eq!(store.get_bool("env.fog.density"), None);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::{SettingsStore, StoredValue};

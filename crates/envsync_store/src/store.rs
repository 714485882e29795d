//! Settings store trait definition.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// A single value held by a settings store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    /// Boolean value.
    Bool(bool),
    /// Floating point value.
    Float(f32),
    /// String value.
    Text(String),
}

impl StoredValue {
    /// Returns the boolean if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float if this is a `Float`.
    #[must_use]
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string if this is a `Text`.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// A persistent, string-keyed settings map.
///
/// Keys are hierarchical dotted strings such as `env.atmo.planet_radius_km`.
/// The store never interprets them.
///
/// # Invariants
///
/// - A `get_*` for a key written with a different type returns `None`
/// - A value written with `set_*` is returned by the matching `get_*` until
///   overwritten, whether or not `flush` has been called
/// - `flush` makes all previous writes durable
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent settings
pub trait SettingsStore: Send + Sync {
    /// Reads a boolean.
    fn get_bool(&self, key: &str) -> Option<bool>;

    /// Reads a float.
    fn get_float(&self, key: &str) -> Option<f32>;

    /// Reads a string.
    fn get_string(&self, key: &str) -> Option<String>;

    /// Writes a boolean.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the store is closed.
    fn set_bool(&self, key: &str, value: bool) -> StoreResult<()>;

    /// Writes a float.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid, the value is not finite, or
    /// the store is closed.
    fn set_float(&self, key: &str, value: f32) -> StoreResult<()>;

    /// Writes a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the store is closed.
    fn set_string(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Makes all previous writes durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium cannot be written.
    fn flush(&self) -> StoreResult<()>;
}

/// Checks that a key is a non-empty dotted path of `[A-Za-z0-9_]` segments.
pub(crate) fn check_key(key: &str) -> StoreResult<()> {
    let valid = !key.is_empty()
        && key.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// Rejects NaN and infinities, which JSON cannot represent.
pub(crate) fn check_finite(key: &str, value: f32) -> StoreResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(StoreError::NonFinite {
            key: key.to_string(),
            value,
        })
    }
}

//! Error types for envsync core.

use crate::domain::Domain;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in envsync core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Settings store error.
    #[error("store error: {0}")]
    Store(#[from] envsync_store::StoreError),

    /// The domain has no field with this name.
    #[error("unknown field {field:?} in domain {domain}")]
    UnknownField {
        /// The domain searched.
        domain: Domain,
        /// The requested field name.
        field: String,
    },

    /// The value does not fit the field's type.
    #[error("invalid value for {domain}.{field}: expected {expected}, got {found}")]
    InvalidValue {
        /// The domain of the field.
        domain: Domain,
        /// The field name.
        field: String,
        /// Description of the accepted type.
        expected: &'static str,
        /// Description of the supplied value.
        found: &'static str,
    },

    /// `end_update` was called without a matching `begin_update`.
    #[error("end_update called with no open transaction")]
    UnbalancedTransaction,

    /// A schema migration failed.
    #[error("migration failed: {message}")]
    MigrationFailed {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates an unknown field error.
    pub fn unknown_field(domain: Domain, field: impl Into<String>) -> Self {
        Self::UnknownField {
            domain,
            field: field.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(
        domain: Domain,
        field: impl Into<String>,
        expected: &'static str,
        found: &'static str,
    ) -> Self {
        Self::InvalidValue {
            domain,
            field: field.into(),
            expected,
            found,
        }
    }

    /// Creates a migration failure.
    pub fn migration_failed(message: impl Into<String>) -> Self {
        Self::MigrationFailed {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::unknown_field(Domain::Fog, "thickness");
        assert_eq!(err.to_string(), "unknown field \"thickness\" in domain Fog");

        let err = CoreError::invalid_value(Domain::Sun, "intensity", "float", "bool");
        assert_eq!(
            err.to_string(),
            "invalid value for Sun.intensity: expected float, got bool"
        );
    }
}

//! Error types for the synchronizer.

use crate::authority::ObjectHandle;
use envsync_core::{CoreError, Domain};
use envsync_store::StoreError;
use thiserror::Error;

/// Result type for synchronizer operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while synchronizing.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Cache, validation or persistence error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Settings store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The authority refused an operation on a domain's object.
    #[error("authority error for {domain}: {message}")]
    Authority {
        /// Domain whose object was being changed.
        domain: Domain,
        /// Error message.
        message: String,
    },

    /// A handle no longer names a live object.
    #[error("stale object handle {0:?}")]
    StaleHandle(ObjectHandle),

    /// Validation rejected a domain's state.
    #[error("{domain} state rejected: {reason}")]
    Rejected {
        /// The rejected domain.
        domain: Domain,
        /// Why it was rejected.
        reason: String,
    },

    /// No authority is attached.
    #[error("no authority attached")]
    NoAuthority,
}

impl SyncError {
    /// Creates an authority error.
    pub fn authority(domain: Domain, message: impl Into<String>) -> Self {
        Self::Authority {
            domain,
            message: message.into(),
        }
    }

    /// Creates a rejection.
    pub fn rejected(domain: Domain, reason: impl Into<String>) -> Self {
        Self::Rejected {
            domain,
            reason: reason.into(),
        }
    }

    /// Returns true if retrying on a later frame may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Authority { .. } | SyncError::StaleHandle(_) | SyncError::Rejected { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::authority(Domain::Fog, "busy").is_retryable());
        assert!(SyncError::rejected(Domain::SkyImage, "no path").is_retryable());
        assert!(!SyncError::NoAuthority.is_retryable());
        assert!(!SyncError::Core(CoreError::UnbalancedTransaction).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::authority(Domain::Sun, "object locked");
        assert_eq!(err.to_string(), "authority error for Sun: object locked");

        let err: SyncError = CoreError::UnbalancedTransaction.into();
        assert!(err.to_string().contains("no open transaction"));
    }
}

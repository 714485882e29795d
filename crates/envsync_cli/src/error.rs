//! CLI errors.

use thiserror::Error;

/// Errors raised by the CLI itself, as opposed to the libraries it drives.
#[derive(Debug, Error)]
pub enum CliError {
    /// An edit was not of the form `domain.field=value`.
    #[error("invalid edit '{0}', expected domain.field=value")]
    MalformedEdit(String),

    /// The domain name is not known.
    #[error("unknown domain '{0}'")]
    UnknownDomain(String),

    /// The field does not exist in the domain.
    #[error("unknown field '{field}' in {domain}")]
    UnknownField {
        /// Domain name.
        domain: String,
        /// Field name.
        field: String,
    },

    /// The value does not parse as the field's kind.
    #[error("cannot parse '{value}' as {expected}")]
    BadValue {
        /// Raw input.
        value: String,
        /// Kind the field holds.
        expected: &'static str,
    },

    /// A migration stopped the upgrade.
    #[error("migration to v{version} failed: {message}")]
    MigrationFailed {
        /// Target version of the failing migration.
        version: u32,
        /// Failure message.
        message: String,
    },

    /// `--save` was given without a settings path.
    #[error("--save requires --path")]
    SaveWithoutPath,
}

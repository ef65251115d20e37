//! Error types for sqlshift.

use std::path::PathBuf;

use thiserror::Error;

use crate::migration::{Direction, Payload, Version};

/// The main error type for migration operations.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// A migration file name does not follow `<version>[_<label>].<ext>`.
    #[error("Invalid migration file name: {path:?} (expected <version>[_<label>].{extension})")]
    InvalidFileName { path: PathBuf, extension: String },

    /// A catalog version is out of range (versions start at 1).
    #[error("Invalid migration version {version} in {path:?}: versions start at 1")]
    InvalidVersion { path: PathBuf, version: Version },

    /// Two catalog entries claim the same version.
    #[error("Duplicate migration version {version}: {first:?} and {second:?}")]
    DuplicateVersion {
        version: Version,
        first: PathBuf,
        second: PathBuf,
    },

    /// The migration catalog could not be listed.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// A migration's payload text could not be resolved.
    #[error("Unable to load {payload} text of migration {version}: {source}")]
    Payload {
        version: Version,
        payload: Payload,
        #[source]
        source: Box<MigrateError>,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A bookkeeping table name that is not a plain SQL identifier.
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Plan execution stopped at a failing action.
    #[error(
        "Migration {version} ({direction}) failed after {} committed step(s): {source}",
        completed.len()
    )]
    Halted {
        version: Version,
        direction: Direction,
        completed: Vec<Version>,
        #[source]
        source: Box<MigrateError>,
    },

    /// An error wrapped with the operation that produced it.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrateError {
    /// Wrap this error with the name of the failing operation.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a payload-resolution error for a migration.
    pub fn payload(version: Version, payload: Payload, source: MigrateError) -> Self {
        Self::Payload {
            version,
            payload,
            source: Box::new(source),
        }
    }

    /// The innermost error, with every `Context` layer removed.
    pub fn root(&self) -> &MigrateError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<sqlx::Error> for MigrateError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        let err = MigrateError::Catalog("no such directory".into())
            .context("unable to find latest version");
        assert_eq!(
            err.to_string(),
            "unable to find latest version: Catalog error: no such directory"
        );
        assert!(matches!(err.root(), MigrateError::Catalog(_)));
    }

    #[test]
    fn test_halted_display() {
        let err = MigrateError::Halted {
            version: 3,
            direction: Direction::Up,
            completed: vec![1, 2],
            source: Box::new(MigrateError::Database("syntax error".into())),
        };
        assert_eq!(
            err.to_string(),
            "Migration 3 (up) failed after 2 committed step(s): Database error: syntax error"
        );
    }

    #[test]
    fn test_payload_display() {
        let err = MigrateError::payload(
            7,
            Payload::Snapshot,
            MigrateError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
        );
        assert_eq!(
            err.to_string(),
            "Unable to load snapshot text of migration 7: IO error: gone"
        );
    }
}

//! Error types for the migration engine.
//!
//! Every error carries an [`ErrorKind`] so callers can react to a class of
//! failure (for example "the state row could not be read") without matching
//! on message text.

use std::path::PathBuf;

use crate::catalog::Direction;

/// Classification of a [`MigrateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Directory or file access failed.
    Io,
    /// A file name carried a malformed version prefix.
    Parse,
    /// Probing the current schema failed.
    SchemaCheck,
    /// Probing the migrations table failed.
    TableCheck,
    /// Creating or seeding the migrations table failed.
    TableCreate,
    /// The persisted version/dirty row could not be read.
    StateRead,
    /// The persisted version/dirty row could not be written.
    StatePersist,
    /// A change-script failed on the backend.
    Execution,
    /// Two change-scripts share a version in the same direction.
    DuplicateVersion,
    /// The backend lock could not be taken or released.
    Lock,
    /// Connection configuration is invalid.
    Config,
}

/// Errors that can occur while resolving or running change-scripts.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// IO error while listing or reading change-scripts.
    #[error("IO error on '{}': {source}", path.display())]
    Io {
        /// Directory or file that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The version prefix of a file name is not an unsigned integer.
    #[error("incorrect file name '{file}', it is not possible to read the version: {source}")]
    Parse {
        /// Offending file name.
        file: String,
        /// Underlying parse error.
        #[source]
        source: std::num::ParseIntError,
    },

    /// Schema existence check failed.
    #[error("error checking the existence of the schema: {0}")]
    SchemaCheck(#[source] sqlx::Error),

    /// Migrations table existence check failed.
    #[error("error checking the existence of the migrations table: {0}")]
    TableCheck(#[source] sqlx::Error),

    /// Migrations table creation failed.
    #[error("error creating the migrations table: {0}")]
    TableCreate(#[source] sqlx::Error),

    /// Reading the current version failed.
    #[error("error reading the current version: {0}")]
    StateRead(#[source] sqlx::Error),

    /// Updating the current version failed.
    #[error("error updating the migrations table: {0}")]
    StatePersist(#[source] sqlx::Error),

    /// A change-script failed to execute.
    #[error("error executing migration '{file}' (version {version}): {source}")]
    Execution {
        /// File whose content failed.
        file: String,
        /// Version of that file.
        version: u64,
        /// Underlying driver error.
        #[source]
        source: sqlx::Error,
    },

    /// Two change-scripts share the same version in one direction.
    #[error("duplicate {direction} version {version}: '{first}' and '{second}'")]
    DuplicateVersion {
        /// Direction of the clashing files.
        direction: Direction,
        /// Shared version.
        version: u64,
        /// First file carrying the version.
        first: String,
        /// Second file carrying the version.
        second: String,
    },

    /// Acquiring or releasing the migration lock failed.
    #[error("migration lock error: {0}")]
    Lock(#[source] sqlx::Error),

    /// Invalid connection configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MigrateError {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Io,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::SchemaCheck(_) => ErrorKind::SchemaCheck,
            Self::TableCheck(_) => ErrorKind::TableCheck,
            Self::TableCreate(_) => ErrorKind::TableCreate,
            Self::StateRead(_) => ErrorKind::StateRead,
            Self::StatePersist(_) => ErrorKind::StatePersist,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::DuplicateVersion { .. } => ErrorKind::DuplicateVersion,
            Self::Lock(_) => ErrorKind::Lock,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Creates an IO error for the given path.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

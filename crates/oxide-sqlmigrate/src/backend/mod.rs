//! Persistence backends.
//!
//! A backend is everything the engine needs from a database: probing and
//! bootstrapping the migrations table, reading and writing the single
//! version/dirty row, and executing a change-script as one opaque batch.
//! The engine is generic over [`Backend`] and never inspects which
//! implementation it is talking to.

mod postgres;
mod sqlite;

pub use postgres::PostgresBackend;
pub use sqlite::SqliteBackend;

use async_trait::async_trait;

use crate::error::{MigrateError, Result};
use crate::state::MigrationState;

/// Default name of the table holding the version/dirty row.
pub const DEFAULT_TABLE: &str = "schema_migrations";

/// Schema name reported when the backend cannot tell.
pub const UNDEFINED_SCHEMA: &str = "undefined";

/// Operations the migration engine requires from a database.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Returns the name of the current schema, or [`UNDEFINED_SCHEMA`].
    async fn current_schema_name(&self) -> String;

    /// Checks whether the current schema exists.
    async fn check_schema_exists(&self) -> Result<bool>;

    /// Checks whether the migrations table exists.
    async fn check_migration_table_exists(&self) -> Result<bool>;

    /// Creates the migrations table and seeds it with `(0, false)`.
    async fn create_migration_table(&self) -> Result<()>;

    /// Overwrites the version/dirty row.
    async fn persist_state(&self, state: MigrationState) -> Result<()>;

    /// Reads the version/dirty row.
    async fn read_state(&self) -> Result<MigrationState>;

    /// Executes the content of one change-script.
    ///
    /// The raw driver error is returned; the engine tags it with the failing
    /// script.
    async fn execute(&self, batch: &str) -> std::result::Result<(), sqlx::Error>;

    /// Takes an exclusive lock for the duration of a run.
    async fn acquire_lock(&self) -> Result<()> {
        Ok(())
    }

    /// Releases the lock taken by [`Backend::acquire_lock`].
    async fn release_lock(&self) -> Result<()> {
        Ok(())
    }
}

/// Quotes an identifier (table name).
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Validates the rows of the state table: exactly one, non-negative version.
pub(crate) fn state_from_rows(rows: &[(i64, bool)]) -> Result<MigrationState> {
    let [(version, dirty)] = rows else {
        return Err(MigrateError::StateRead(sqlx::Error::Protocol(format!(
            "expected exactly one row in the migrations table, found {}",
            rows.len()
        ))));
    };
    let version = u64::try_from(*version)
        .map_err(|e| MigrateError::StateRead(sqlx::Error::Decode(Box::new(e))))?;
    Ok(MigrationState::new(version, *dirty))
}

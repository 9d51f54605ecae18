//! SQLite backend.
//!
//! SQLite has no schemas in the PostgreSQL sense; the "schema" reported here
//! is the name of the main attached database (normally `main`).

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::{Backend, DEFAULT_TABLE, UNDEFINED_SCHEMA, quote_identifier, state_from_rows};
use crate::error::{MigrateError, Result};
use crate::state::MigrationState;

/// Backend over a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    table: String,
}

impl SqliteBackend {
    /// Creates a backend recording state in [`DEFAULT_TABLE`].
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            table: DEFAULT_TABLE.to_string(),
        }
    }

    /// Uses a different table for the version/dirty row.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn quoted_table(&self) -> String {
        quote_identifier(&self.table)
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn current_schema_name(&self) -> String {
        let row: std::result::Result<Option<(String,)>, _> =
            sqlx::query_as("SELECT name FROM pragma_database_list WHERE seq = 0")
                .fetch_optional(&self.pool)
                .await;
        match row {
            Ok(Some((name,))) if !name.is_empty() => name,
            _ => UNDEFINED_SCHEMA.to_string(),
        }
    }

    async fn check_schema_exists(&self) -> Result<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM pragma_database_list WHERE seq = 0")
                .fetch_one(&self.pool)
                .await
                .map_err(MigrateError::SchemaCheck)?;
        Ok(count > 0)
    }

    async fn check_migration_table_exists(&self) -> Result<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(&self.table)
                .fetch_one(&self.pool)
                .await
                .map_err(MigrateError::TableCheck)?;
        Ok(count > 0)
    }

    async fn create_migration_table(&self) -> Result<()> {
        let table = self.quoted_table();
        let mut tx = self.pool.begin().await.map_err(MigrateError::TableCreate)?;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
                version INTEGER NOT NULL, \
                dirty BOOLEAN NOT NULL DEFAULT 0\
            )"
        ))
        .execute(&mut *tx)
        .await
        .map_err(MigrateError::TableCreate)?;
        sqlx::query(&format!(
            "INSERT INTO {table} (version, dirty) VALUES (0, 0)"
        ))
        .execute(&mut *tx)
        .await
        .map_err(MigrateError::TableCreate)?;
        tx.commit().await.map_err(MigrateError::TableCreate)
    }

    async fn persist_state(&self, state: MigrationState) -> Result<()> {
        let version = i64::try_from(state.version)
            .map_err(|e| MigrateError::StatePersist(sqlx::Error::Encode(Box::new(e))))?;
        sqlx::query(&format!(
            "UPDATE {} SET version = ?, dirty = ?",
            self.quoted_table()
        ))
        .bind(version)
        .bind(state.dirty)
        .execute(&self.pool)
        .await
        .map_err(MigrateError::StatePersist)?;
        Ok(())
    }

    async fn read_state(&self) -> Result<MigrationState> {
        let rows: Vec<(i64, bool)> = sqlx::query_as(&format!(
            "SELECT version, dirty FROM {} LIMIT 2",
            self.quoted_table()
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(MigrateError::StateRead)?;
        state_from_rows(&rows)
    }

    async fn execute(&self, batch: &str) -> std::result::Result<(), sqlx::Error> {
        sqlx::raw_sql(batch).execute(&self.pool).await?;
        Ok(())
    }
}

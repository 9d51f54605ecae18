//! PostgreSQL backend.
//!
//! State lives in a table of the connection's current schema (so
//! `search_path` decides where it goes). Runs are serialized per schema and
//! state table with a session-level advisory lock held on a dedicated pooled
//! connection, so the pool must allow at least two connections.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, Postgres};
use tokio::sync::Mutex;
use tracing::debug;

use super::{Backend, DEFAULT_TABLE, UNDEFINED_SCHEMA, quote_identifier, state_from_rows};
use crate::error::{MigrateError, Result};
use crate::state::MigrationState;

const CHECK_SCHEMA_EXISTS_SQL: &str = "SELECT EXISTS (
    SELECT schema_name FROM information_schema.schemata
    WHERE schema_name = (SELECT current_schema()))";

const CHECK_TABLE_EXISTS_SQL: &str = "SELECT EXISTS (
    SELECT FROM information_schema.tables
    WHERE table_schema = (SELECT current_schema())
    AND table_name = $1)";

/// Connections a run needs: one holds the advisory lock, one runs queries.
const MIN_POOL_CONNECTIONS: u32 = 2;

struct HeldLock {
    conn: PoolConnection<Postgres>,
    key: i64,
}

/// Backend over a PostgreSQL connection pool.
pub struct PostgresBackend {
    pool: PgPool,
    table: String,
    lock: Mutex<Option<HeldLock>>,
}

impl PostgresBackend {
    /// Creates a backend recording state in [`DEFAULT_TABLE`].
    ///
    /// The pool must allow at least two connections; a run holds one for the
    /// advisory lock while its queries go through the others. Smaller pools
    /// are rejected when the lock is taken.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table: DEFAULT_TABLE.to_string(),
            lock: Mutex::new(None),
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
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn quoted_table(&self) -> String {
        quote_identifier(&self.table)
    }

    fn check_pool_size(&self) -> Result<()> {
        let max = self.pool.options().get_max_connections();
        if max < MIN_POOL_CONNECTIONS {
            return Err(MigrateError::Config(format!(
                "PostgreSQL pool allows {max} connection(s), at least {MIN_POOL_CONNECTIONS} are required"
            )));
        }
        Ok(())
    }
}

/// Derives a stable advisory lock key from the schema and state table names.
fn advisory_lock_key(schema: &str, table: &str) -> i64 {
    // FNV-1a, 64 bit
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let input = "oxide-sqlmigrate:"
        .bytes()
        .chain(schema.bytes())
        .chain(std::iter::once(b'.'))
        .chain(table.bytes());
    for byte in input {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    i64::from_ne_bytes(hash.to_ne_bytes())
}

#[async_trait]
impl Backend for PostgresBackend {
    async fn current_schema_name(&self) -> String {
        let row: std::result::Result<(Option<String>,), _> =
            sqlx::query_as("SELECT current_schema()")
                .fetch_one(&self.pool)
                .await;
        match row {
            Ok((Some(name),)) if !name.is_empty() => name,
            _ => UNDEFINED_SCHEMA.to_string(),
        }
    }

    async fn check_schema_exists(&self) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(CHECK_SCHEMA_EXISTS_SQL)
            .fetch_one(&self.pool)
            .await
            .map_err(MigrateError::SchemaCheck)?;
        Ok(exists)
    }

    async fn check_migration_table_exists(&self) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(CHECK_TABLE_EXISTS_SQL)
            .bind(&self.table)
            .fetch_one(&self.pool)
            .await
            .map_err(MigrateError::TableCheck)?;
        Ok(exists)
    }

    async fn create_migration_table(&self) -> Result<()> {
        let table = self.quoted_table();
        let mut tx = self.pool.begin().await.map_err(MigrateError::TableCreate)?;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
                \"version\" bigint NOT NULL, \
                \"dirty\" boolean NOT NULL DEFAULT false\
            )"
        ))
        .execute(&mut *tx)
        .await
        .map_err(MigrateError::TableCreate)?;
        sqlx::query(&format!(
            "INSERT INTO {table} (\"version\", \"dirty\") VALUES (0, false)"
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
            "UPDATE {} SET \"version\" = $1, \"dirty\" = $2",
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
        // Casts keep tables with an `integer` version or nullable dirty column readable.
        let rows: Vec<(i64, bool)> = sqlx::query_as(&format!(
            "SELECT \"version\"::bigint, COALESCE(\"dirty\", false) FROM {} LIMIT 2",
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

    async fn acquire_lock(&self) -> Result<()> {
        let mut held = self.lock.lock().await;
        if held.is_some() {
            return Ok(());
        }
        self.check_pool_size()?;

        let mut conn = self.pool.acquire().await.map_err(MigrateError::Lock)?;
        let (schema,): (Option<String>,) = sqlx::query_as("SELECT current_schema()")
            .fetch_one(&mut *conn)
            .await
            .map_err(MigrateError::Lock)?;
        let schema = schema.unwrap_or_else(|| UNDEFINED_SCHEMA.to_string());
        let key = advisory_lock_key(&schema, &self.table);

        debug!(key, schema = %schema, "Waiting for advisory lock");
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(key)
            .execute(&mut *conn)
            .await
            .map_err(MigrateError::Lock)?;
        *held = Some(HeldLock { conn, key });
        Ok(())
    }

    async fn release_lock(&self) -> Result<()> {
        let Some(HeldLock { mut conn, key }) = self.lock.lock().await.take() else {
            return Ok(());
        };
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(key)
            .execute(&mut *conn)
            .await
            .map_err(MigrateError::Lock)?;
        Ok(())
    }
}

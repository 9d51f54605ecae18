//! In-memory backend used by unit tests.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::backend::Backend;
use crate::error::{MigrateError, Result};
use crate::state::MigrationState;

#[derive(Debug, Default)]
struct Inner {
    state: Option<MigrationState>,
    executed: Vec<String>,
    fail_on: Option<String>,
    fail_schema_check: bool,
    fail_state_read: bool,
    fail_persist: bool,
    tables_created: usize,
    persist_calls: usize,
    locks_acquired: usize,
    locks_released: usize,
}

/// Backend keeping the version/dirty row and executed batches in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

fn failure(message: &str) -> sqlx::Error {
    sqlx::Error::Protocol(message.to_string())
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend whose migrations table already holds `state`.
    pub fn with_state(state: MigrationState) -> Self {
        let backend = Self::default();
        backend.inner().state = Some(state);
        backend
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Makes `execute` fail for batches containing `needle`.
    pub fn fail_on(&self, needle: &str) {
        self.inner().fail_on = Some(needle.to_string());
    }

    pub fn fail_schema_check(&self) {
        self.inner().fail_schema_check = true;
    }

    pub fn fail_state_read(&self) {
        self.inner().fail_state_read = true;
    }

    pub fn fail_persist(&self) {
        self.inner().fail_persist = true;
    }

    pub fn state(&self) -> Option<MigrationState> {
        self.inner().state
    }

    pub fn table_exists(&self) -> bool {
        self.inner().state.is_some()
    }

    pub fn executed(&self) -> Vec<String> {
        self.inner().executed.clone()
    }

    pub fn tables_created(&self) -> usize {
        self.inner().tables_created
    }

    pub fn persist_calls(&self) -> usize {
        self.inner().persist_calls
    }

    pub fn locks(&self) -> (usize, usize) {
        let inner = self.inner();
        (inner.locks_acquired, inner.locks_released)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn current_schema_name(&self) -> String {
        "memory".to_string()
    }

    async fn check_schema_exists(&self) -> Result<bool> {
        if self.inner().fail_schema_check {
            return Err(MigrateError::SchemaCheck(failure("schema probe refused")));
        }
        Ok(true)
    }

    async fn check_migration_table_exists(&self) -> Result<bool> {
        Ok(self.table_exists())
    }

    async fn create_migration_table(&self) -> Result<()> {
        let mut inner = self.inner();
        inner.tables_created += 1;
        if inner.state.is_none() {
            inner.state = Some(MigrationState::default());
        }
        Ok(())
    }

    async fn persist_state(&self, state: MigrationState) -> Result<()> {
        let mut inner = self.inner();
        inner.persist_calls += 1;
        if inner.fail_persist {
            return Err(MigrateError::StatePersist(failure("persist refused")));
        }
        match inner.state.as_mut() {
            Some(row) => {
                *row = state;
                Ok(())
            }
            None => Err(MigrateError::StatePersist(failure("no migrations table"))),
        }
    }

    async fn read_state(&self) -> Result<MigrationState> {
        let inner = self.inner();
        if inner.fail_state_read {
            return Err(MigrateError::StateRead(sqlx::Error::RowNotFound));
        }
        inner
            .state
            .ok_or(MigrateError::StateRead(sqlx::Error::RowNotFound))
    }

    async fn execute(&self, batch: &str) -> std::result::Result<(), sqlx::Error> {
        let mut inner = self.inner();
        if inner
            .fail_on
            .as_deref()
            .is_some_and(|needle| batch.contains(needle))
        {
            return Err(failure("statement rejected"));
        }
        inner.executed.push(batch.to_string());
        Ok(())
    }

    async fn acquire_lock(&self) -> Result<()> {
        self.inner().locks_acquired += 1;
        Ok(())
    }

    async fn release_lock(&self) -> Result<()> {
        self.inner().locks_released += 1;
        Ok(())
    }
}

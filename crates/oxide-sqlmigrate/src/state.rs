//! Persisted migration state.
//!
//! A schema carries exactly one version/dirty row. It is read at the start of
//! every run and overwritten at the end, whether the run succeeded or stopped
//! on a failing script.

use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::error::Result;

/// The recorded progress of a schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationState {
    /// Last successfully applied version (0 = none).
    pub version: u64,
    /// Whether the last run stopped on a failing script.
    pub dirty: bool,
}

impl MigrationState {
    /// Creates a state value.
    #[must_use]
    pub fn new(version: u64, dirty: bool) -> Self {
        Self { version, dirty }
    }
}

/// State of a single run, threaded from `prepare` to `complete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    /// Progress reached so far.
    pub state: MigrationState,
    /// Whether the migrations table existed when the run started.
    pub table_exists: bool,
}

/// Reads and writes the version/dirty row through a backend.
pub struct StateRecorder<'a, B: Backend + ?Sized> {
    backend: &'a B,
}

impl<'a, B: Backend + ?Sized> StateRecorder<'a, B> {
    /// Creates a recorder over the given backend.
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Checks whether the current schema exists.
    pub async fn schema_exists(&self) -> Result<bool> {
        self.backend.check_schema_exists().await
    }

    /// Checks whether the migrations table exists.
    pub async fn migration_table_exists(&self) -> Result<bool> {
        self.backend.check_migration_table_exists().await
    }

    /// Reads the recorded version and dirty flag.
    pub async fn current_version(&self) -> Result<MigrationState> {
        self.backend.read_state().await
    }

    /// Creates the migrations table seeded at `(0, false)`.
    ///
    /// Only call this when [`Self::migration_table_exists`] returned `false`.
    pub async fn create_migration_table(&self) -> Result<()> {
        self.backend.create_migration_table().await
    }

    /// Overwrites the recorded state.
    pub async fn persist(&self, state: MigrationState) -> Result<()> {
        self.backend.persist_state(state).await
    }

    /// Loads the state a run starts from.
    ///
    /// A missing table leaves the version at 0; the table itself is created
    /// by [`Self::complete`].
    pub async fn prepare(&self) -> Result<RunState> {
        let table_exists = self.migration_table_exists().await?;
        if !table_exists {
            debug!("Migrations table not found, starting from version 0");
            return Ok(RunState::default());
        }

        let state = self.current_version().await?;
        if state.dirty {
            warn!(
                version = state.version,
                "Previous run left the schema dirty at version {}", state.version
            );
        }
        Ok(RunState {
            state,
            table_exists,
        })
    }

    /// Records the state a run finished with.
    ///
    /// Always logs the final version and dirty flag, even when recording fails.
    pub async fn complete(&self, run: &RunState) -> Result<()> {
        let result = self.record(run).await;
        info!(
            version = run.state.version,
            dirty = run.state.dirty,
            "Now version: {}, dirty: {}",
            run.state.version,
            run.state.dirty
        );
        result
    }

    /// Once the migrations table exists, a failing schema probe is reported
    /// only after the state has been persisted.
    async fn record(&self, run: &RunState) -> Result<()> {
        let probe_error = match self.schema_exists().await {
            Ok(true) => None,
            Ok(false) => {
                warn!("Current schema does not exist");
                None
            }
            Err(e) if run.table_exists => {
                warn!(error = %e, "Schema check failed, recording state anyway");
                Some(e)
            }
            Err(e) => return Err(e),
        };
        if !run.table_exists {
            self.create_migration_table().await?;
        }
        self.persist(run.state).await?;
        probe_error.map_or(Ok(()), Err)
    }
}

//! The migration entry point.
//!
//! A [`Migrator`] only holds configuration: where scripts come from, which
//! backend to talk to, the step limit and the skip set. Every call re-reads
//! the recorded state, runs, and records the state it reached, so calls are
//! independent of each other.

use std::collections::HashSet;
use std::path::Path;

use tracing::{error, info, warn};

use crate::backend::Backend;
use crate::catalog::{self, Direction};
use crate::error::{ErrorKind, Result};
use crate::executor::Executor;
use crate::plan::{self, PlanRequest};
use crate::source::{DirectorySource, ScriptSource};
use crate::state::{MigrationState, StateRecorder};

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Direction of the run; `None` when `goto` was already at its target.
    pub direction: Option<Direction>,
    /// State recorded at the end of the run.
    pub state: MigrationState,
    /// Versions executed, in order.
    pub applied: Vec<u64>,
    /// Versions skipped, in order.
    pub skipped: Vec<u64>,
    /// Whether there was nothing to run.
    pub no_changes: bool,
}

impl RunReport {
    fn unchanged(direction: Option<Direction>, state: MigrationState) -> Self {
        Self {
            direction,
            state,
            applied: Vec::new(),
            skipped: Vec::new(),
            no_changes: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    All(Direction),
    Goto(u64),
}

/// Applies change-scripts from a source against a backend.
pub struct Migrator<B: Backend> {
    backend: B,
    source: Box<dyn ScriptSource>,
    step_limit: Option<usize>,
    skip: HashSet<u64>,
}

impl<B: Backend> Migrator<B> {
    /// Creates a migrator reading `<version>_<name>.<up|down>.sql` files from
    /// `migrations_dir`.
    pub fn new(migrations_dir: impl AsRef<Path>, backend: B) -> Self {
        Self::with_source(DirectorySource::new(migrations_dir), backend)
    }

    /// Creates a migrator over any script source.
    pub fn with_source(source: impl ScriptSource + 'static, backend: B) -> Self {
        Self {
            backend,
            source: Box::new(source),
            step_limit: None,
            skip: HashSet::new(),
        }
    }

    /// Caps the number of scripts one run may execute (0 = unlimited).
    #[must_use]
    pub fn with_step_limit(mut self, steps: usize) -> Self {
        self.step_limit = (steps > 0).then_some(steps);
        self
    }

    /// Bypasses the given versions during runs.
    #[must_use]
    pub fn with_skip(mut self, versions: impl IntoIterator<Item = u64>) -> Self {
        self.skip = versions.into_iter().collect();
        self
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Applies pending up-scripts in ascending order.
    pub async fn up(&self) -> Result<RunReport> {
        self.run(Mode::All(Direction::Up)).await
    }

    /// Applies down-scripts at or below the current version in descending order.
    pub async fn down(&self) -> Result<RunReport> {
        self.run(Mode::All(Direction::Down)).await
    }

    /// Moves the schema to `version`, upwards or downwards.
    pub async fn goto(&self, version: u64) -> Result<RunReport> {
        self.run(Mode::Goto(version)).await
    }

    /// Returns the recorded version (0 when nothing was recorded yet).
    pub async fn version(&self) -> Result<u64> {
        Ok(self.state().await?.version)
    }

    /// Returns the recorded version and dirty flag.
    pub async fn state(&self) -> Result<MigrationState> {
        let run = StateRecorder::new(&self.backend).prepare().await?;
        Ok(run.state)
    }

    async fn run(&self, mode: Mode) -> Result<RunReport> {
        info!("Migration started");
        let schema = self.backend.current_schema_name().await;
        info!(schema = %schema, "Select current schema: {}", schema);

        self.backend.acquire_lock().await?;
        let result = self.run_locked(mode).await;
        if let Err(e) = self.backend.release_lock().await {
            error!(error = %e, "Failed to release migration lock");
            if result.is_ok() {
                return Err(e);
            }
        }

        info!("Migration completed");
        result
    }

    async fn run_locked(&self, mode: Mode) -> Result<RunReport> {
        let recorder = StateRecorder::new(&self.backend);
        let mut run = recorder.prepare().await?;

        let (direction, target) = match mode {
            Mode::All(direction) => (direction, None),
            Mode::Goto(version) if version == run.state.version => {
                info!(version, "Already at version {}", version);
                return Ok(RunReport::unchanged(None, run.state));
            }
            Mode::Goto(version) if version > run.state.version => (Direction::Up, Some(version)),
            Mode::Goto(version) => (Direction::Down, Some(version)),
        };

        let scripts = catalog::list(self.source.as_ref(), direction)?;
        let plan = plan::build(
            scripts,
            &PlanRequest {
                direction,
                current_version: run.state.version,
                target,
                step_limit: self.step_limit,
            },
        )?;

        if plan.is_empty() {
            warn!(direction = %direction, "No change files");
            return Ok(RunReport::unchanged(Some(direction), run.state));
        }
        info!(
            direction = %direction,
            versions = ?plan.versions(),
            "Running {} {} migration(s)",
            plan.len(),
            direction
        );

        let outcome = Executor::new(&self.backend, self.source.as_ref())
            .run(&plan, &self.skip, run.state.version)
            .await;
        run.state = outcome.state;

        if let Err(e) = recorder.complete(&run).await {
            return Err(match outcome.failure {
                // A schema probe error never hides the failing script.
                Some(failure) if e.kind() == ErrorKind::SchemaCheck => {
                    error!(error = %e, "Schema check failed after execution failure");
                    failure
                }
                Some(failure) => {
                    error!(error = %failure, "Execution failure could not be recorded");
                    e
                }
                None => e,
            });
        }

        match outcome.failure {
            Some(failure) => Err(failure),
            None => Ok(RunReport {
                direction: Some(direction),
                state: run.state,
                applied: outcome.applied,
                skipped: outcome.skipped,
                no_changes: false,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBackend;
    use std::fs;

    fn migrations_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for v in 1..=3 {
            fs::write(dir.path().join(format!("{v}_x.up.sql")), format!("UP {v};")).unwrap();
            fs::write(dir.path().join(format!("{v}_x.down.sql")), format!("DOWN {v};")).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_up_from_scratch() {
        let dir = migrations_dir();
        let migrator = Migrator::new(dir.path(), MemoryBackend::new());

        let report = migrator.up().await.unwrap();
        assert_eq!(report.applied, vec![1, 2, 3]);
        assert_eq!(report.state, MigrationState::new(3, false));
        assert!(!report.no_changes);

        let backend = migrator.backend();
        assert_eq!(backend.state(), Some(MigrationState::new(3, false)));
        assert_eq!(backend.tables_created(), 1);
        assert_eq!(backend.locks(), (1, 1));
        assert_eq!(migrator.version().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_down_to_zero() {
        let dir = migrations_dir();
        let migrator = Migrator::new(dir.path(), MemoryBackend::with_state(MigrationState::new(3, false)));

        let report = migrator.down().await.unwrap();
        assert_eq!(report.applied, vec![3, 2, 1]);
        assert_eq!(migrator.backend().state(), Some(MigrationState::new(0, false)));
        assert_eq!(migrator.backend().executed(), vec!["DOWN 3;", "DOWN 2;", "DOWN 1;"]);
    }

    #[tokio::test]
    async fn test_step_limit() {
        let dir = migrations_dir();
        let migrator = Migrator::new(dir.path(), MemoryBackend::new()).with_step_limit(1);

        let report = migrator.up().await.unwrap();
        assert_eq!(report.applied, vec![1]);
        assert_eq!(migrator.version().await.unwrap(), 1);

        let report = migrator.up().await.unwrap();
        assert_eq!(report.applied, vec![2]);
    }

    #[tokio::test]
    async fn test_skip() {
        let dir = migrations_dir();
        let migrator = Migrator::new(dir.path(), MemoryBackend::new()).with_skip([2]);

        let report = migrator.up().await.unwrap();
        assert_eq!(report.applied, vec![1, 3]);
        assert_eq!(report.skipped, vec![2]);
        assert_eq!(migrator.version().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failure_records_dirty_state() {
        let dir = migrations_dir();
        let backend = MemoryBackend::new();
        backend.fail_on("UP 2");
        let migrator = Migrator::new(dir.path(), backend);

        let err = migrator.up().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);

        let backend = migrator.backend();
        assert_eq!(backend.state(), Some(MigrationState::new(1, true)));
        assert_eq!(backend.executed(), vec!["UP 1;"]);
        assert_eq!(backend.locks(), (1, 1));
    }

    #[tokio::test]
    async fn test_successful_run_clears_dirty() {
        let dir = migrations_dir();
        let migrator = Migrator::new(dir.path(), MemoryBackend::with_state(MigrationState::new(1, true)));

        let report = migrator.up().await.unwrap();
        assert_eq!(report.applied, vec![2, 3]);
        assert_eq!(migrator.backend().state(), Some(MigrationState::new(3, false)));
    }

    #[tokio::test]
    async fn test_goto() {
        let dir = migrations_dir();
        let migrator = Migrator::new(dir.path(), MemoryBackend::new());

        let report = migrator.goto(2).await.unwrap();
        assert_eq!(report.direction, Some(Direction::Up));
        assert_eq!(report.applied, vec![1, 2]);

        let report = migrator.goto(3).await.unwrap();
        assert_eq!(report.applied, vec![3]);

        let report = migrator.goto(1).await.unwrap();
        assert_eq!(report.direction, Some(Direction::Down));
        assert_eq!(report.applied, vec![3, 2]);
        assert_eq!(migrator.version().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_goto_current_version_is_noop() {
        let dir = migrations_dir();
        let migrator = Migrator::new(dir.path(), MemoryBackend::with_state(MigrationState::new(2, false)));

        let report = migrator.goto(2).await.unwrap();
        assert!(report.no_changes);
        assert_eq!(report.direction, None);
        assert_eq!(migrator.backend().persist_calls(), 0);
    }

    #[tokio::test]
    async fn test_nothing_pending() {
        let dir = migrations_dir();
        let migrator = Migrator::new(dir.path(), MemoryBackend::with_state(MigrationState::new(3, false)));

        let report = migrator.up().await.unwrap();
        assert!(report.no_changes);
        assert!(report.applied.is_empty());
        assert_eq!(migrator.backend().persist_calls(), 0);
        assert_eq!(migrator.backend().state(), Some(MigrationState::new(3, false)));
    }

    #[tokio::test]
    async fn test_malformed_name_never_fails() {
        let dir = migrations_dir();
        fs::write(dir.path().join("abc_x.up.sql"), "BROKEN;").unwrap();
        let backend = MemoryBackend::new();
        backend.fail_on("BROKEN");
        let migrator = Migrator::new(dir.path(), backend);

        let report = migrator.up().await.unwrap();
        assert_eq!(report.applied, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_state_read_error_aborts() {
        let dir = migrations_dir();
        let backend = MemoryBackend::with_state(MigrationState::new(1, false));
        backend.fail_state_read();
        let migrator = Migrator::new(dir.path(), backend);

        let err = migrator.up().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateRead);
        assert!(migrator.backend().executed().is_empty());
        assert_eq!(migrator.backend().locks(), (1, 1));
    }

    #[tokio::test]
    async fn test_persist_error_takes_precedence() {
        let dir = migrations_dir();
        let backend = MemoryBackend::with_state(MigrationState::default());
        backend.fail_on("UP 2");
        backend.fail_persist();
        let migrator = Migrator::new(dir.path(), backend);

        let err = migrator.up().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StatePersist);
    }

    #[tokio::test]
    async fn test_schema_check_failure_records_applied_scripts() {
        let dir = migrations_dir();
        let backend = MemoryBackend::with_state(MigrationState::default());
        backend.fail_schema_check();
        let migrator = Migrator::new(dir.path(), backend);

        let err = migrator.up().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaCheck);

        let backend = migrator.backend();
        assert_eq!(backend.executed(), vec!["UP 1;", "UP 2;", "UP 3;"]);
        assert_eq!(backend.state(), Some(MigrationState::new(3, false)));
        assert_eq!(backend.persist_calls(), 1);
    }

    #[tokio::test]
    async fn test_execution_failure_wins_over_schema_check() {
        let dir = migrations_dir();
        let backend = MemoryBackend::with_state(MigrationState::default());
        backend.fail_schema_check();
        backend.fail_on("UP 2");
        let migrator = Migrator::new(dir.path(), backend);

        let err = migrator.up().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert_eq!(migrator.backend().state(), Some(MigrationState::new(1, true)));
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let migrator = Migrator::new(dir.path().join("missing"), MemoryBackend::new());

        let err = migrator.up().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}

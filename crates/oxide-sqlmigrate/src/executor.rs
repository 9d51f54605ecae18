//! Change-script execution.
//!
//! Scripts of a plan run one at a time, in plan order. The in-memory version
//! advances after every successful script; the first failing script marks the
//! run dirty and stops it.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::catalog::{ChangeScript, Direction};
use crate::error::MigrateError;
use crate::plan::ExecutionPlan;
use crate::source::ScriptSource;
use crate::state::MigrationState;

/// Result of executing a plan.
#[derive(Debug)]
pub struct RunOutcome {
    /// Version and dirty flag reached.
    pub state: MigrationState,
    /// Versions executed successfully, in order.
    pub applied: Vec<u64>,
    /// Versions skipped through the skip set, empty content or a read error.
    pub skipped: Vec<u64>,
    /// The execution failure that stopped the run, if any.
    pub failure: Option<MigrateError>,
}

enum Step {
    Applied,
    Skipped,
}

/// Runs execution plans against a backend.
pub struct Executor<'a, B: Backend + ?Sized> {
    backend: &'a B,
    source: &'a dyn ScriptSource,
}

impl<'a, B: Backend + ?Sized> Executor<'a, B> {
    /// Creates an executor reading scripts from `source`.
    pub fn new(backend: &'a B, source: &'a dyn ScriptSource) -> Self {
        Self { backend, source }
    }

    /// Executes `plan`, starting from `start_version`.
    ///
    /// Never returns early with an error: a failing script is reported in
    /// [`RunOutcome::failure`] so the caller can still record the progress.
    pub async fn run(
        &self,
        plan: &ExecutionPlan,
        skip: &HashSet<u64>,
        start_version: u64,
    ) -> RunOutcome {
        let mut outcome = RunOutcome {
            state: MigrationState::new(start_version, false),
            applied: Vec::new(),
            skipped: Vec::new(),
            failure: None,
        };

        for script in plan.scripts() {
            if skip.contains(&script.version) {
                info!(file = %script.name, version = script.version, "Notice: {} marked as skipped", script.name);
                outcome.skipped.push(script.version);
                continue;
            }

            match self.apply(script).await {
                Ok(Step::Applied) => {
                    outcome.state.version = progress_after(script);
                    outcome.applied.push(script.version);
                }
                Ok(Step::Skipped) => outcome.skipped.push(script.version),
                Err(e) => {
                    error!(file = %script.name, version = script.version, error = %e, "Migration failed");
                    outcome.state.dirty = true;
                    outcome.failure = Some(e);
                    break;
                }
            }
        }

        outcome
    }

    async fn apply(&self, script: &ChangeScript) -> Result<Step, MigrateError> {
        let content = match self.source.read(&script.name) {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %script.name, error = %e, "File read error (skipped)");
                return Ok(Step::Skipped);
            }
        };
        if content.trim().is_empty() {
            warn!(file = %script.name, "File is empty (skipped)");
            return Ok(Step::Skipped);
        }

        debug!(file = %script.name, bytes = content.len(), "Executing migration");
        let start = Instant::now();
        self.backend
            .execute(&content)
            .await
            .map_err(|source| MigrateError::Execution {
                file: script.name.clone(),
                version: script.version,
                source,
            })?;

        info!(
            file = %script.name,
            version = script.version,
            elapsed_ms = elapsed_millis(start.elapsed()),
            "Done: {}",
            script.name
        );
        Ok(Step::Applied)
    }
}

fn elapsed_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Version recorded once `script` has run.
///
/// A down-script takes the schema back to the version before it.
fn progress_after(script: &ChangeScript) -> u64 {
    match script.direction {
        Direction::Up => script.version,
        Direction::Down => script.version.saturating_sub(1),
    }
}

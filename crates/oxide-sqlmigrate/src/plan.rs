//! Plan building: which change-scripts run, and in which order.

use std::collections::HashMap;

use crate::catalog::{ChangeScript, Direction};
use crate::error::{MigrateError, Result};

/// Ordered change-scripts for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    direction: Direction,
    scripts: Vec<ChangeScript>,
}

impl ExecutionPlan {
    /// Returns the direction of the plan.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the planned scripts in execution order.
    #[must_use]
    pub fn scripts(&self) -> &[ChangeScript] {
        &self.scripts
    }

    /// Returns the planned versions in execution order.
    #[must_use]
    pub fn versions(&self) -> Vec<u64> {
        self.scripts.iter().map(|s| s.version).collect()
    }

    /// Returns the number of planned scripts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Returns whether nothing is planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

/// Parameters that select the scripts of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanRequest {
    /// Direction of the run.
    pub direction: Direction,
    /// Version currently recorded.
    pub current_version: u64,
    /// Version to stop at, if any.
    pub target: Option<u64>,
    /// Maximum number of scripts to plan; `None` or `Some(0)` is unlimited.
    pub step_limit: Option<usize>,
}

impl PlanRequest {
    fn is_candidate(&self, version: u64) -> bool {
        match self.direction {
            Direction::Up => {
                version > self.current_version && self.target.is_none_or(|t| version <= t)
            }
            Direction::Down => {
                version <= self.current_version && self.target.is_none_or(|t| version > t)
            }
        }
    }
}

/// Builds the execution plan for a run.
///
/// Scripts of the other direction are ignored. Two scripts with the same
/// version in the planned direction are rejected.
pub fn build(scripts: Vec<ChangeScript>, request: &PlanRequest) -> Result<ExecutionPlan> {
    let mut seen: HashMap<u64, String> = HashMap::new();
    let mut planned = Vec::new();

    for script in scripts {
        if script.direction != request.direction {
            continue;
        }
        if let Some(first) = seen.insert(script.version, script.name.clone()) {
            return Err(MigrateError::DuplicateVersion {
                direction: request.direction,
                version: script.version,
                first,
                second: script.name,
            });
        }
        if request.is_candidate(script.version) {
            planned.push(script);
        }
    }

    match request.direction {
        Direction::Up => planned.sort_by_key(|s| s.version),
        Direction::Down => planned.sort_by_key(|s| std::cmp::Reverse(s.version)),
    }

    if let Some(limit) = request.step_limit.filter(|&n| n > 0) {
        planned.truncate(limit);
    }

    Ok(ExecutionPlan {
        direction: request.direction,
        scripts: planned,
    })
}

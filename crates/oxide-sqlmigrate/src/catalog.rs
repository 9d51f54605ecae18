//! Change-script discovery.
//!
//! File names follow `<version>_<description>.<up|down>.sql`. The version is
//! the unsigned integer before the first `_`; the direction is decided by the
//! `.up.sql` / `.down.sql` marker anywhere in the name.

use std::fmt;

use tracing::warn;

use crate::error::{MigrateError, Result};
use crate::source::ScriptSource;

/// Which way a change-script moves the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Forward change.
    Up,
    /// Reverse change.
    Down,
}

impl Direction {
    /// Returns the file name marker for this direction.
    #[must_use]
    pub fn marker(self) -> &'static str {
        match self {
            Self::Up => ".up.sql",
            Self::Down => ".down.sql",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
        }
    }
}

/// One discoverable change-script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeScript {
    /// Version parsed from the file name prefix.
    pub version: u64,
    /// Direction parsed from the file name marker.
    pub direction: Direction,
    /// Full file name.
    pub name: String,
}

impl ChangeScript {
    /// Creates a change-script entry.
    pub fn new(version: u64, direction: Direction, name: impl Into<String>) -> Self {
        Self {
            version,
            direction,
            name: name.into(),
        }
    }
}

/// Parses the version prefix of a file name.
///
/// An empty prefix (the name starts with `_`) yields version 0.
pub fn parse_version(file_name: &str) -> Result<u64> {
    let prefix = file_name.split('_').next().unwrap_or_default();
    if prefix.is_empty() {
        return Ok(0);
    }
    prefix.parse::<u64>().map_err(|source| MigrateError::Parse {
        file: file_name.to_string(),
        source,
    })
}

/// Lists the change-scripts of one direction.
///
/// Entries with an unreadable version are skipped with a warning. The order
/// of the result is unspecified.
pub fn list(source: &dyn ScriptSource, direction: Direction) -> Result<Vec<ChangeScript>> {
    let mut scripts = Vec::new();
    for name in source.list_names()? {
        if !name.contains(direction.marker()) {
            continue;
        }
        match parse_version(&name) {
            Ok(version) => scripts.push(ChangeScript::new(version, direction, name)),
            Err(e) => warn!(file = %name, error = %e, "Notice: file skipped"),
        }
    }
    Ok(scripts)
}

//! Versioned SQL file migrations for Rust.
//!
//! `oxide-sqlmigrate` applies plain SQL change-scripts named
//! `<version>_<description>.<up|down>.sql` and records a single
//! version/dirty row, so that repeated runs are idempotent and a failed run
//! can be resumed.
//!
//! # Architecture
//!
//! - **Catalog** - Lists change-scripts and parses their versions
//! - **Plan** - Selects and orders the scripts of a run (direction, target
//!   version, step limit)
//! - **Executor** - Runs the plan one script at a time, stopping on failure
//! - **State** - Reads and records the version/dirty row
//! - **Backend** - What the engine needs from a database (SQLite and
//!   PostgreSQL adapters are provided)
//! - **Migrator** - The entry point: `up`, `down`, `goto`, `version`
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_sqlmigrate::prelude::*;
//! use sqlx::sqlite::SqlitePoolOptions;
//!
//! let pool = SqlitePoolOptions::new().connect("sqlite:app.db").await?;
//! let migrator = Migrator::new("./migrations", SqliteBackend::new(pool))
//!     .with_step_limit(2)
//!     .with_skip([3]);
//!
//! let report = migrator.up().await?;
//! println!("now at version {}", report.state.version);
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Apply all pending up-scripts
//! oxide-sqlmigrate -d sqlite:app.db up
//!
//! # Roll back the last two versions
//! oxide-sqlmigrate -d sqlite:app.db down --steps 2
//!
//! # Move to an exact version
//! oxide-sqlmigrate -d postgres://root@localhost/test goto 4
//!
//! # Show the recorded version
//! oxide-sqlmigrate -d sqlite:app.db version
//! ```

pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod migrator;
pub mod plan;
pub mod source;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::backend::{Backend, DEFAULT_TABLE, PostgresBackend, SqliteBackend};
    pub use crate::catalog::{ChangeScript, Direction};
    pub use crate::config::ConnectionConfig;
    pub use crate::error::{ErrorKind, MigrateError, Result};
    pub use crate::migrator::{Migrator, RunReport};
    pub use crate::plan::{ExecutionPlan, PlanRequest};
    pub use crate::source::{DirectorySource, ScriptSource};
    pub use crate::state::MigrationState;
}

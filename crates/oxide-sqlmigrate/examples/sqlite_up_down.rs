//! Example: Up, Goto and Down against SQLite
//!
//! Writes a small set of change-scripts for a blog schema into a temporary
//! directory and moves an in-memory database through them.
//!
//! Run with: cargo run --example sqlite_up_down -p oxide-sqlmigrate

use std::fs;
use std::path::Path;

use oxide_sqlmigrate::prelude::*;
use sqlx::sqlite::SqlitePoolOptions;

// =============================================================================
// Change-scripts
// =============================================================================

const SCRIPTS: &[(&str, &str)] = &[
    (
        "1_create_users.up.sql",
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL
        );",
    ),
    ("1_create_users.down.sql", "DROP TABLE users;"),
    (
        "2_create_posts.up.sql",
        "CREATE TABLE posts (
            id INTEGER PRIMARY KEY,
            author_id INTEGER NOT NULL REFERENCES users(id),
            title TEXT NOT NULL,
            body TEXT NOT NULL
        );
        CREATE INDEX idx_posts_author ON posts (author_id);",
    ),
    ("2_create_posts.down.sql", "DROP TABLE posts;"),
    (
        "3_create_comments.up.sql",
        "CREATE TABLE comments (
            id INTEGER PRIMARY KEY,
            post_id INTEGER NOT NULL REFERENCES posts(id),
            body TEXT NOT NULL
        );",
    ),
    ("3_create_comments.down.sql", "DROP TABLE comments;"),
];

fn write_scripts(dir: &Path) -> std::io::Result<()> {
    for (name, sql) in SCRIPTS {
        fs::write(dir.join(name), sql)?;
    }
    Ok(())
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .without_time()
        .init();

    let dir = tempfile::tempdir()?;
    write_scripts(dir.path())?;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let backend = SqliteBackend::new(pool);
    let migrator = Migrator::new(dir.path(), backend.clone());

    println!("=== goto 2 ===");
    let report = migrator.goto(2).await?;
    println!("applied {:?}, now at {}", report.applied, report.state.version);

    println!("\n=== up ===");
    let report = migrator.up().await?;
    println!("applied {:?}, now at {}", report.applied, report.state.version);

    println!("\n=== up again ===");
    let report = migrator.up().await?;
    println!("no changes: {}", report.no_changes);

    println!("\n=== down, one step ===");
    let report = Migrator::new(dir.path(), backend)
        .with_step_limit(1)
        .down()
        .await?;
    println!("reverted {:?}, now at {}", report.applied, report.state.version);

    Ok(())
}

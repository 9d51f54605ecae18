#![allow(dead_code)]

use std::fs;
use std::path::Path;

use oxide_sqlmigrate::prelude::*;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub async fn create_test_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

pub fn write(dir: &Path, name: &str, sql: &str) {
    fs::write(dir.join(name), sql).unwrap_or_else(|e| panic!("Failed to write {name}: {e}"));
}

/// Writes `{1,2,3}_tN` up/down pairs creating and dropping tables `t1`..`t3`.
pub fn write_table_scripts(dir: &Path) {
    for v in 1..=3 {
        write(dir, &format!("{v}_t{v}.up.sql"), &format!("CREATE TABLE t{v} (id INTEGER PRIMARY KEY);"));
        write(dir, &format!("{v}_t{v}.down.sql"), &format!("DROP TABLE t{v};"));
    }
}

pub async fn table_exists(pool: &SqlitePool, name: &str) -> bool {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_one(pool)
            .await
            .unwrap();
    count > 0
}

pub async fn recorded(pool: &SqlitePool) -> MigrationState {
    SqliteBackend::new(pool.clone()).read_state().await.unwrap()
}

//! oxide-sqlmigrate CLI
//!
//! Command-line tool for applying versioned SQL change-scripts.

use std::path::PathBuf;

use anyhow::bail;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use oxide_sqlmigrate::prelude::*;

/// Versioned SQL file migrations.
#[derive(Parser)]
#[command(name = "oxide-sqlmigrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (`sqlite:` or `postgres://`).
    #[arg(short, long, env = "DATABASE_URL")]
    database: Option<String>,

    /// JSON file with PostgreSQL connection parameters, used when no URL is given.
    #[arg(long, env = "MIGRATIONS_DB_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the `.up.sql` / `.down.sql` files.
    #[arg(short, long, env = "MIGRATIONS_DIR", default_value = "migrations")]
    migrations_dir: PathBuf,

    /// Table holding the version/dirty row.
    #[arg(long, default_value = DEFAULT_TABLE)]
    table: String,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct RunOptions {
    /// Maximum number of scripts to run (0 = all).
    #[arg(short, long, default_value_t = 0)]
    steps: usize,

    /// Versions to bypass, comma separated.
    #[arg(long, value_delimiter = ',')]
    skip: Vec<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending up-scripts.
    Up(RunOptions),

    /// Apply down-scripts from the current version downwards.
    Down(RunOptions),

    /// Move to the given version.
    Goto {
        /// Target version.
        version: u64,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Show the recorded version and dirty flag.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match (&cli.database, &cli.config) {
        (Some(url), _) if url.starts_with("sqlite:") => {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect(url)
                .await?;
            let backend = SqliteBackend::new(pool).with_table(&cli.table);
            execute(&cli, backend).await
        }
        (Some(url), _) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {
            let pool = PgPoolOptions::new().max_connections(2).connect(url).await?;
            let backend = PostgresBackend::new(pool).with_table(&cli.table);
            execute(&cli, backend).await
        }
        (Some(url), _) => bail!("unsupported database URL: {url}"),
        (None, Some(path)) => {
            let options = ConnectionConfig::from_json_file(path)?.connect_options()?;
            let pool = PgPoolOptions::new()
                .max_connections(2)
                .connect_with(options)
                .await?;
            let backend = PostgresBackend::new(pool).with_table(&cli.table);
            execute(&cli, backend).await
        }
        (None, None) => bail!("either --database or --config is required"),
    }
}

async fn execute<B: Backend>(cli: &Cli, backend: B) -> anyhow::Result<()> {
    let options = match &cli.command {
        Commands::Up(options) | Commands::Down(options) | Commands::Goto { options, .. } => {
            options.clone()
        }
        Commands::Version => RunOptions::default(),
    };
    let migrator = Migrator::new(&cli.migrations_dir, backend)
        .with_step_limit(options.steps)
        .with_skip(options.skip);

    let report = match &cli.command {
        Commands::Up(_) => migrator.up().await?,
        Commands::Down(_) => migrator.down().await?,
        Commands::Goto { version, .. } => migrator.goto(*version).await?,
        Commands::Version => {
            let state = migrator.state().await?;
            println!("version: {}, dirty: {}", state.version, state.dirty);
            return Ok(());
        }
    };

    if report.no_changes {
        info!("Nothing to do");
    } else {
        info!(
            applied = ?report.applied,
            skipped = ?report.skipped,
            "Applied {} migration(s)",
            report.applied.len()
        );
    }
    Ok(())
}

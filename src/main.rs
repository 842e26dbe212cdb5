use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use newhire::config::WorkplaceConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "newhire")]
#[command(version, about = "Simulated first-week workplace back-end")]
pub struct Cli {
    /// Configuration file (defaults to ./newhire.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the API server
    Serve {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (CORS permissive for a local frontend dev server)
        #[arg(long)]
        dev: bool,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
}

#[derive(Subcommand)]
pub enum DbCommand {
    /// Apply pending migrations
    Migrate {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Revert the most recent migrations
    Rollback {
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Number of migrations to revert
        #[arg(long, default_value = "1")]
        steps: usize,
    },
    /// Show applied and pending migrations
    Status {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Print the columns of a table
    Inspect {
        #[arg(long)]
        db_path: Option<PathBuf>,

        #[arg(long, default_value = "users")]
        table: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config =
        WorkplaceConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = newhire::telemetry::init_tracing(&config.logging)?;

    match cli.command {
        Commands::Serve { port, db_path, dev } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(path) = db_path {
                config.database.path = path;
            }
            config.server.dev_mode |= dev;
            cmd::cmd_serve(config).await?;
        }
        Commands::Db { command } => {
            let resolve = |path: Option<PathBuf>| path.unwrap_or_else(|| config.database.path.clone());
            match command {
                DbCommand::Migrate { db_path } => cmd::cmd_migrate(&resolve(db_path))?,
                DbCommand::Rollback { db_path, steps } => {
                    cmd::cmd_rollback(&resolve(db_path), steps)?
                }
                DbCommand::Status { db_path } => cmd::cmd_status(&resolve(db_path))?,
                DbCommand::Inspect { db_path, table } => {
                    cmd::cmd_inspect(&resolve(db_path), &table)?
                }
            }
        }
    }

    Ok(())
}

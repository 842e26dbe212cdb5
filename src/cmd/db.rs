//! Database maintenance commands: `newhire db ...`.

use anyhow::{Context, Result};
use std::path::Path;

use newhire::workplace::db::WorkplaceDb;

fn open(db_path: &Path) -> Result<WorkplaceDb> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    WorkplaceDb::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))
}

pub fn cmd_migrate(db_path: &Path) -> Result<()> {
    let db = open(db_path)?;
    let applied = db.migrate()?;
    if applied.is_empty() {
        println!("Database is up to date ({})", db_path.display());
    } else {
        for name in &applied {
            println!("Applied {}", name);
        }
        println!("Applied {} migration(s) to {}", applied.len(), db_path.display());
    }
    Ok(())
}

pub fn cmd_rollback(db_path: &Path, steps: usize) -> Result<()> {
    let db = open(db_path)?;
    let reverted = db.rollback(steps)?;
    if reverted.is_empty() {
        println!("Nothing to roll back");
    } else {
        for name in &reverted {
            println!("Reverted {}", name);
        }
    }
    Ok(())
}

pub fn cmd_status(db_path: &Path) -> Result<()> {
    let db = open(db_path)?;
    println!("Migrations for {}:", db_path.display());
    for status in db.migration_status()? {
        match status.applied_at {
            Some(at) => println!("  [x] {:03} {} (applied {})", status.version, status.name, at),
            None => println!("  [ ] {:03} {} (pending)", status.version, status.name),
        }
    }
    Ok(())
}

pub fn cmd_inspect(db_path: &Path, table: &str) -> Result<()> {
    let db = open(db_path)?;
    let columns = db.table_columns(table)?;
    println!("Columns in {}:", table);
    for column in columns {
        println!("  {} ({})", column.name, column.column_type);
    }
    Ok(())
}

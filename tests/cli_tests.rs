//! CLI tests for the `newhire` binary.
//!
//! The server itself is covered by router tests inside the crate; these
//! exercise argument parsing and the database maintenance commands.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn newhire(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("newhire");
    cmd.current_dir(dir.path())
        .env_remove("NEWHIRE_DB_PATH")
        .env_remove("NEWHIRE_LOG_DIR")
        .env("RUST_LOG", "error");
    cmd
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("data").join("newhire.db")
}

fn migrate(dir: &TempDir) {
    newhire(dir)
        .args(["db", "migrate", "--db-path"])
        .arg(db_path(dir))
        .assert()
        .success();
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        let dir = TempDir::new().unwrap();
        newhire(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("db"));
    }

    #[test]
    fn test_version() {
        let dir = TempDir::new().unwrap();
        newhire(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_subcommand_fails() {
        let dir = TempDir::new().unwrap();
        newhire(&dir).arg("hire-everyone").assert().failure();
    }

    #[test]
    fn test_broken_config_file_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("newhire.toml"), "[server\nport = ").unwrap();
        newhire(&dir)
            .args(["db", "status"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("configuration"));
    }
}

mod db_commands {
    use super::*;

    #[test]
    fn test_migrate_creates_database() {
        let dir = TempDir::new().unwrap();
        newhire(&dir)
            .args(["db", "migrate", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .success()
            .stdout(predicate::str::contains("Applied initial"))
            .stdout(predicate::str::contains("Applied 4 migration(s)"));
        assert!(db_path(&dir).exists());
    }

    #[test]
    fn test_migrate_twice_is_up_to_date() {
        let dir = TempDir::new().unwrap();
        migrate(&dir);
        newhire(&dir)
            .args(["db", "migrate", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .success()
            .stdout(predicate::str::contains("Database is up to date"));
    }

    #[test]
    fn test_status_before_and_after_migrate() {
        let dir = TempDir::new().unwrap();
        newhire(&dir)
            .args(["db", "status", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .success()
            .stdout(predicate::str::contains("[ ] 001 initial (pending)"));

        migrate(&dir);
        newhire(&dir)
            .args(["db", "status", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .success()
            .stdout(predicate::str::contains("[x] 001 initial"))
            .stdout(predicate::str::contains("[x] 004 standup_transcripts"));
    }

    #[test]
    fn test_rollback_reverts_latest() {
        let dir = TempDir::new().unwrap();
        migrate(&dir);
        newhire(&dir)
            .args(["db", "rollback", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .success()
            .stdout(predicate::str::contains("Reverted standup_transcripts"));

        newhire(&dir)
            .args(["db", "status", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .success()
            .stdout(predicate::str::contains("[ ] 004 standup_transcripts (pending)"))
            .stdout(predicate::str::contains("[x] 003 activity_tracking"));
    }

    #[test]
    fn test_rollback_on_empty_database() {
        let dir = TempDir::new().unwrap();
        newhire(&dir)
            .args(["db", "rollback", "--steps", "3", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to roll back"));
    }

    #[test]
    fn test_inspect_users_table() {
        let dir = TempDir::new().unwrap();
        migrate(&dir);
        newhire(&dir)
            .args(["db", "inspect", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .success()
            .stdout(predicate::str::contains("Columns in users:"))
            .stdout(predicate::str::contains("github_id (TEXT)"))
            .stdout(predicate::str::contains("truthfulness"));
    }

    #[test]
    fn test_inspect_missing_table_fails() {
        let dir = TempDir::new().unwrap();
        migrate(&dir);
        newhire(&dir)
            .args(["db", "inspect", "--table", "payroll", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .failure()
            .stderr(predicate::str::contains("payroll"));
    }

    #[test]
    fn test_db_path_from_environment() {
        let dir = TempDir::new().unwrap();
        newhire(&dir)
            .env("NEWHIRE_DB_PATH", dir.path().join("from-env.db"))
            .args(["db", "migrate"])
            .assert()
            .success();
        assert!(dir.path().join("from-env.db").exists());
    }
}

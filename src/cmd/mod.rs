//! CLI command implementations.
//!
//! | Module  | Commands handled                                  |
//! |---------|---------------------------------------------------|
//! | `serve` | `Serve`                                           |
//! | `db`    | `Db Migrate`, `Db Rollback`, `Db Status`, `Db Inspect` |

pub mod db;
pub mod serve;

pub use db::{cmd_inspect, cmd_migrate, cmd_rollback, cmd_status};
pub use serve::cmd_serve;

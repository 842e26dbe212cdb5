//! Typed error hierarchy for the workplace back-end.
//!
//! `WorkplaceError` covers domain and upstream failures; the HTTP layer maps
//! each variant onto a status code in `workplace::api::ApiError`.

use thiserror::Error;

/// Errors from the workplace API and its upstream services.
#[derive(Debug, Error)]
pub enum WorkplaceError {
    #[error("User {id} not found")]
    UserNotFound { id: i64 },

    #[error("Ticket {id} not found")]
    TicketNotFound { id: i64 },

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("User not authenticated with GitHub")]
    GitHubNotLinked,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("GitHub API error ({status}): {message}")]
    GitHub { status: u16, message: String },

    #[error("OpenAI API error: {0}")]
    OpenAi(String),

    #[error("Upload storage error: {0}")]
    Storage(#[source] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    ParseFailed {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

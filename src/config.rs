//! Layered configuration for the workplace server.
//!
//! Values are resolved in order: built-in defaults, then `newhire.toml`
//! (or the file passed with `--config`), then environment variables
//! (a `.env` file is loaded first by `main`), then CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! port = 8000
//! public_url = "http://localhost:8000"
//! frontend_url = "http://localhost:5173"
//! upload_dir = "static"
//!
//! [database]
//! path = "newhire.db"
//!
//! [github]
//! client_id = "Iv1.abc"
//!
//! [openai]
//! chat_model = "gpt-3.5-turbo"
//!
//! [auth]
//! token_ttl_hours = 168
//! trust_query_user_id = true
//!
//! [logging]
//! json = false
//! log_dir = "logs"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "newhire.toml";
pub const DEFAULT_JWT_SECRET: &str = "newhire-dev-secret";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkplaceConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub github: GitHubSection,
    pub openai: OpenAiSection,
    pub auth: AuthSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
    pub bind: String,
    /// Base URL that public upload links are built from.
    pub public_url: String,
    /// Frontend origin; used for CORS and the OAuth redirect.
    pub frontend_url: String,
    pub upload_dir: PathBuf,
    /// Permissive CORS for local frontend development.
    pub dev_mode: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: 8000,
            bind: "127.0.0.1".to_string(),
            public_url: "http://localhost:8000".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            upload_dir: PathBuf::from("static"),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("newhire.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubSection {
    pub client_id: Option<String>,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    pub oauth_url: String,
    pub api_url: String,
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            oauth_url: "https://github.com".to_string(),
            api_url: "https://api.github.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSection {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub speech_model: String,
    pub transcription_model: String,
}

impl Default for OpenAiSection {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-3.5-turbo".to_string(),
            speech_model: "tts-1".to_string(),
            transcription_model: "whisper-1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub token_ttl_hours: u64,
    /// Accept `?user_id=` as the caller identity when no bearer token is sent.
    pub trust_query_user_id: bool,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_ttl_hours: 24 * 7,
            trust_query_user_id: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub json: bool,
    pub log_dir: Option<PathBuf>,
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            json: false,
            log_dir: None,
            filter: "newhire=info,tower_http=info".to_string(),
        }
    }
}

impl WorkplaceConfig {
    /// Load configuration from an explicit file, or `newhire.toml` in the
    /// working directory when present, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            toml::from_str(&content).map_err(|source| ConfigError::ParseFailed {
                path: path.to_path_buf(),
                source,
            })?;
        config.server.public_url = config.server.public_url.trim_end_matches('/').to_string();
        config.server.frontend_url = config.server.frontend_url.trim_end_matches('/').to_string();
        Ok(config)
    }

    /// Overlay environment variables. `lookup` abstracts `std::env::var` for tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(id) = non_empty("GITHUB_CLIENT_ID") {
            self.github.client_id = Some(id);
        }
        if let Some(secret) = non_empty("GITHUB_CLIENT_SECRET") {
            self.github.client_secret = Some(secret);
        }
        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }
        if let Some(secret) = non_empty("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(path) = non_empty("NEWHIRE_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(port) = non_empty("NEWHIRE_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "NEWHIRE_PORT".to_string(),
                message: format!("'{}' is not a valid port", port),
            })?;
        }
        if let Some(url) = non_empty("NEWHIRE_PUBLIC_URL") {
            self.server.public_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = non_empty("NEWHIRE_FRONTEND_URL") {
            self.server.frontend_url = url.trim_end_matches('/').to_string();
        }
        if let Some(dir) = non_empty("NEWHIRE_UPLOAD_DIR") {
            self.server.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("NEWHIRE_LOG_DIR") {
            self.logging.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(json) = non_empty("NEWHIRE_LOG_JSON") {
            self.logging.json = matches!(json.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    /// Reject unusable settings and return warnings for degraded ones.
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "JWT_SECRET".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.auth.token_ttl_hours == 0 {
            return Err(ConfigError::InvalidValue {
                key: "auth.token_ttl_hours".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let mut warnings = Vec::new();
        if self.auth.jwt_secret == DEFAULT_JWT_SECRET {
            warnings.push("JWT_SECRET is the built-in development value".to_string());
        }
        if self.github.client_id.is_none() || self.github.client_secret.is_none() {
            warnings.push(
                "GITHUB_CLIENT_ID/GITHUB_CLIENT_SECRET not set; GitHub login will fail".to_string(),
            );
        }
        if self.openai.api_key.is_none() {
            warnings.push("OPENAI_API_KEY not set; AI features return canned responses".to_string());
        }
        Ok(warnings)
    }

    /// Where GitHub sends the user back after authorizing.
    pub fn oauth_redirect_uri(&self) -> String {
        format!("{}/login", self.server.frontend_url.trim_end_matches('/'))
    }
}

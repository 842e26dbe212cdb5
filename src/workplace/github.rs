use anyhow::Context;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::config::GitHubSection;

const USER_AGENT: &str = "newhire";
const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";
const OAUTH_SCOPE: &str = "repo,user:email";

/// Response from GitHub's OAuth token exchange endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// The authenticated GitHub user (subset of fields we care about).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubUser {
    pub id: i64,
    pub login: String,
    pub avatar_url: Option<String>,
}

/// A GitHub repository (subset of fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRepo {
    pub full_name: String,
    pub name: String,
    pub html_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRepoRequest {
    pub name: String,
    pub private: bool,
    pub description: String,
    pub auto_init: bool,
}

#[derive(Debug)]
pub enum CreateRepoOutcome {
    Created(GitHubRepo),
    /// GitHub answered 422: a repository with this name already exists.
    AlreadyExists,
    Failed { status: u16, body: String },
}

#[derive(Debug, Serialize)]
struct PutContentRequest<'a> {
    message: &'a str,
    content: String,
}

/// The GitHub operations the workplace needs.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Exchange an OAuth authorization code for an access token.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> anyhow::Result<TokenResponse>;

    async fn get_user(&self, token: &str) -> anyhow::Result<GitHubUser>;

    async fn create_repo(
        &self,
        token: &str,
        request: &CreateRepoRequest,
    ) -> anyhow::Result<CreateRepoOutcome>;

    /// Create or replace a file through the contents API, committing it with `message`.
    async fn put_file(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> anyhow::Result<()>;
}

/// Build the URL the browser is sent to for the OAuth consent screen.
pub fn authorize_url(oauth_url: &str, client_id: &str, redirect_uri: &str) -> String {
    format!(
        "{}/login/oauth/authorize?client_id={}&scope={}&redirect_uri={}",
        oauth_url.trim_end_matches('/'),
        client_id,
        OAUTH_SCOPE,
        redirect_uri
    )
}

/// Base64-encode file content the way the contents API expects it.
pub fn encode_content(content: &str) -> String {
    BASE64.encode(content.as_bytes())
}

/// reqwest-backed client for github.com.
pub struct GitHubClient {
    http: reqwest::Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    oauth_url: String,
    api_url: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubSection) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            oauth_url: config.oauth_url.trim_end_matches('/').to_string(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
        }
    }

    fn api(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> anyhow::Result<TokenResponse> {
        let client_id = self
            .client_id
            .as_deref()
            .context("GITHUB_CLIENT_ID not configured")?;
        let client_secret = self
            .client_secret
            .as_deref()
            .context("GITHUB_CLIENT_SECRET not configured")?;

        let resp = self
            .http
            .post(format!("{}/login/oauth/access_token", self.oauth_url))
            .header("Accept", "application/json")
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .context("Failed to send token exchange request to GitHub")?;
        tracing::debug!(status = %resp.status(), "GitHub token exchange responded");
        resp.json::<TokenResponse>()
            .await
            .context("Failed to parse token exchange response from GitHub")
    }

    async fn get_user(&self, token: &str) -> anyhow::Result<GitHubUser> {
        self.http
            .get(self.api("/user"))
            .header("Authorization", format!("token {}", token))
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .context("Failed to send user request to GitHub")?
            .error_for_status()
            .context("GitHub user API returned error status")?
            .json::<GitHubUser>()
            .await
            .context("Failed to parse user response from GitHub")
    }

    async fn create_repo(
        &self,
        token: &str,
        request: &CreateRepoRequest,
    ) -> anyhow::Result<CreateRepoOutcome> {
        let resp = self
            .http
            .post(self.api("/user/repos"))
            .header("Authorization", format!("token {}", token))
            .header("Accept", GITHUB_ACCEPT)
            .header("User-Agent", USER_AGENT)
            .json(request)
            .send()
            .await
            .context("Failed to send create repository request to GitHub")?;

        let status = resp.status();
        if status.is_success() {
            let repo = resp
                .json::<GitHubRepo>()
                .await
                .context("Failed to parse repository response from GitHub")?;
            return Ok(CreateRepoOutcome::Created(repo));
        }
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            return Ok(CreateRepoOutcome::AlreadyExists);
        }
        let body = resp.text().await.unwrap_or_default();
        Ok(CreateRepoOutcome::Failed {
            status: status.as_u16(),
            body,
        })
    }

    async fn put_file(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> anyhow::Result<()> {
        let body = PutContentRequest {
            message,
            content: encode_content(content),
        };
        self.http
            .put(self.api(&format!("/repos/{}/{}/contents/{}", owner, repo, path)))
            .header("Authorization", format!("token {}", token))
            .header("Accept", GITHUB_ACCEPT)
            .header("User-Agent", USER_AGENT)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to push {} to GitHub", path))?
            .error_for_status()
            .with_context(|| format!("GitHub contents API rejected {}", path))?;
        Ok(())
    }
}

/// In-memory stand-in for GitHub used by router and onboarding tests.
#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    pub struct FakeGitHub {
        pub create_status: u16,
        pub issue_token: bool,
        pushed: Mutex<Vec<String>>,
    }

    impl Default for FakeGitHub {
        fn default() -> Self {
            Self {
                create_status: 201,
                issue_token: true,
                pushed: Mutex::new(Vec::new()),
            }
        }
    }

    impl FakeGitHub {
        pub fn with_create_status(status: u16) -> Self {
            Self {
                create_status: status,
                ..Self::default()
            }
        }

        /// A GitHub that answers the code exchange without an access token.
        pub fn without_token() -> Self {
            Self {
                issue_token: false,
                ..Self::default()
            }
        }

        pub fn pushed_paths(&self) -> Vec<String> {
            self.pushed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GitHubApi for FakeGitHub {
        async fn exchange_code(
            &self,
            code: &str,
            _redirect_uri: &str,
        ) -> anyhow::Result<TokenResponse> {
            Ok(TokenResponse {
                access_token: self.issue_token.then(|| format!("gho_{}", code)),
                token_type: Some("bearer".to_string()),
                scope: Some(OAUTH_SCOPE.to_string()),
                error: (!self.issue_token).then(|| "bad_verification_code".to_string()),
                error_description: None,
            })
        }

        async fn get_user(&self, _token: &str) -> anyhow::Result<GitHubUser> {
            Ok(GitHubUser {
                id: 583231,
                login: "octocat".to_string(),
                avatar_url: Some("https://avatars.githubusercontent.com/u/583231".to_string()),
            })
        }

        async fn create_repo(
            &self,
            _token: &str,
            request: &CreateRepoRequest,
        ) -> anyhow::Result<CreateRepoOutcome> {
            Ok(match self.create_status {
                200..=299 => CreateRepoOutcome::Created(GitHubRepo {
                    full_name: format!("octocat/{}", request.name),
                    name: request.name.clone(),
                    html_url: format!("https://github.com/octocat/{}", request.name),
                }),
                422 => CreateRepoOutcome::AlreadyExists,
                status => CreateRepoOutcome::Failed {
                    status,
                    body: "{\"message\":\"Forbidden\"}".to_string(),
                },
            })
        }

        async fn put_file(
            &self,
            _token: &str,
            _owner: &str,
            _repo: &str,
            path: &str,
            _content: &str,
            _message: &str,
        ) -> anyhow::Result<()> {
            self.pushed.lock().unwrap().push(path.to_string());
            Ok(())
        }
    }
}

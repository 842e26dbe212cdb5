use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        FromRequest, FromRequestParts, Multipart, Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
        multipart::MultipartRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::ai::AiProvider;
use super::auth::{self, CurrentUser, MaybeUser};
use super::db::DbHandle;
use super::gamification::{self, CODE_REVIEW_XP, TicketMove};
use super::github::{self, GitHubApi};
use super::models::*;
use super::onboarding::{self, DEFAULT_REPO_NAME, RepoGeneration};
use super::storage::{UploadStore, sanitize_filename};
use super::ws::{WsMessage, broadcast_award, broadcast_message};
use crate::config::WorkplaceConfig;
use crate::errors::WorkplaceError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub ws_tx: broadcast::Sender<String>,
    pub github: Arc<dyn GitHubApi>,
    pub ai: Arc<dyn AiProvider>,
    pub uploads: UploadStore,
    pub config: Arc<WorkplaceConfig>,
}

pub type SharedState = Arc<AppState>;

// ── Extractors ────────────────────────────────────────────────────────

// axum's extractors with rejections rendered as `{"error": ...}`.

#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct AppQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct AppPath<T>(pub T);

pub struct AppMultipart(pub Multipart);

impl<S> FromRequest<S> for AppMultipart
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: axum::extract::Request, state: &S) -> Result<Self, Self::Rejection> {
        let value = Multipart::from_request(req, state).await?;
        Ok(AppMultipart(value))
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: String,
}

#[derive(Deserialize)]
pub struct CreateMessageRequest {
    pub channel: String,
    pub content: String,
    #[serde(default)]
    pub is_bot: bool,
}

#[derive(Deserialize)]
pub struct CodeReviewRequest {
    pub diff: String,
    pub pr_title: String,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct GenerateRepoRequest {
    pub repo_name: String,
}

impl Default for GenerateRepoRequest {
    fn default() -> Self {
        Self {
            repo_name: DEFAULT_REPO_NAME.to_string(),
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateTicketStatusRequest {
    pub status: String,
}

#[derive(Deserialize)]
pub struct ActivitiesQuery {
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct LoginUrl {
    pub url: String,
}

#[derive(Serialize)]
pub struct SessionToken {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: UserSummary,
}

#[derive(Serialize)]
pub struct StandupUploaded {
    pub url: String,
    pub transcript: String,
}

#[derive(Serialize)]
pub struct Uploaded {
    pub url: String,
}

#[derive(Serialize)]
pub struct RepoGenerated {
    pub message: &'static str,
    pub repo_url: String,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// Well-formed request whose content does not fit the endpoint.
    Unprocessable(String),
    Unauthorized(String),
    /// An upstream service failed; carries the status to report.
    Upstream(StatusCode, String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Upstream(status, msg) => (status, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<WorkplaceError> for ApiError {
    fn from(err: WorkplaceError) -> Self {
        match err {
            WorkplaceError::UserNotFound { .. } | WorkplaceError::TicketNotFound { .. } => {
                ApiError::NotFound(err.to_string())
            }
            WorkplaceError::Unauthenticated | WorkplaceError::GitHubNotLinked => {
                ApiError::Unauthorized(err.to_string())
            }
            WorkplaceError::BadRequest(msg) => ApiError::BadRequest(msg),
            WorkplaceError::GitHub { status, message } => ApiError::Upstream(
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                message,
            ),
            WorkplaceError::OpenAi(_) => ApiError::Upstream(StatusCode::BAD_GATEWAY, err.to_string()),
            WorkplaceError::Storage(_) | WorkplaceError::Database(_) | WorkplaceError::Other(_) => {
                tracing::error!(error = %err, "request failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => ApiError::Unprocessable(e.body_text()),
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

fn db_error(e: anyhow::Error) -> ApiError {
    ApiError::from(WorkplaceError::Database(e))
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/auth/github/login", get(github_login))
        .route("/api/auth/github/callback", get(github_callback))
        .route("/api/auth/me", get(current_profile))
        .route("/api/messages", post(create_message))
        .route("/api/messages/{channel}", get(list_messages))
        .route("/api/features/standups/upload", post(upload_standup))
        .route("/api/features/standups/daily-update", get(coworker_update))
        .route("/api/features/retrospectives/upload", post(upload_retrospective))
        .route("/api/features/code-review", post(review_code))
        .route("/api/onboarding/generate-repo", post(generate_repo))
        .route("/api/onboarding/checklist", get(onboarding_checklist))
        .route("/api/tickets", get(list_tickets))
        .route("/api/tickets/{id}/status", patch(update_ticket_status))
        .route("/api/gamification/me/stats", get(my_stats))
        .route("/api/activities", get(list_activities))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

async fn require_user(state: &SharedState, user_id: i64) -> Result<User, ApiError> {
    state
        .db
        .call(move |db| db.get_user(user_id))
        .await
        .map_err(db_error)?
        .ok_or_else(|| WorkplaceError::UserNotFound { id: user_id }.into())
}

/// Pull the `file` field out of a multipart upload.
async fn read_upload(mut multipart: Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            return Ok((filename, bytes.to_vec()));
        }
    }
    Err(ApiError::BadRequest("Missing file".to_string()))
}

fn announce_activity(state: &SharedState, activity: &Activity) {
    broadcast_message(
        &state.ws_tx,
        &WsMessage::ActivityRecorded {
            activity: activity.clone(),
        },
    );
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn github_login(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let client_id = state
        .config
        .github
        .client_id
        .as_deref()
        .ok_or_else(|| ApiError::Internal("GITHUB_CLIENT_ID not configured".to_string()))?;
    let url = github::authorize_url(
        &state.config.github.oauth_url,
        client_id,
        &state.config.oauth_redirect_uri(),
    );
    Ok(Json(LoginUrl { url }))
}

async fn github_callback(
    State(state): State<SharedState>,
    AppQuery(query): AppQuery<CallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let token_response = state
        .github
        .exchange_code(&query.code, &state.config.oauth_redirect_uri())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "GitHub token exchange failed");
            ApiError::Upstream(StatusCode::BAD_GATEWAY, e.to_string())
        })?;

    let Some(github_token) = token_response.access_token else {
        tracing::warn!(
            error = token_response.error.as_deref().unwrap_or("none"),
            description = token_response.error_description.as_deref().unwrap_or(""),
            "GitHub returned no access token"
        );
        return Err(ApiError::BadRequest("Failed to retrieve access token".to_string()));
    };

    let profile = state.github.get_user(&github_token).await.map_err(|e| {
        tracing::error!(error = %e, "GitHub user lookup failed");
        ApiError::Upstream(StatusCode::BAD_GATEWAY, e.to_string())
    })?;

    let user = state
        .db
        .call(move |db| {
            db.upsert_github_user(
                &profile.id.to_string(),
                &profile.login,
                profile.avatar_url.as_deref(),
                &github_token,
            )
        })
        .await
        .map_err(db_error)?;

    let auth = &state.config.auth;
    let username = user.username.clone().unwrap_or_default();
    let access_token = auth::generate(user.id, &username, &auth.jwt_secret, auth.token_ttl_hours)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    tracing::info!(user_id = user.id, username = %username, "user signed in");

    Ok(Json(SessionToken {
        access_token,
        token_type: "bearer",
        user: UserSummary::from(&user),
    }))
}

async fn current_profile(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(require_user(&state, user_id).await?))
}

async fn list_messages(
    State(state): State<SharedState>,
    AppPath(channel): AppPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = Channel::from_str(&channel).map_err(ApiError::BadRequest)?;
    let messages = state
        .db
        .call(move |db| db.list_messages(channel))
        .await
        .map_err(db_error)?;
    Ok(Json(messages))
}

async fn create_message(
    State(state): State<SharedState>,
    MaybeUser(sender_id): MaybeUser,
    AppJson(req): AppJson<CreateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = Channel::from_str(&req.channel).map_err(ApiError::BadRequest)?;
    if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Message content must not be empty".to_string(),
        ));
    }
    let sender_id = if req.is_bot { None } else { sender_id };
    if let Some(id) = sender_id {
        require_user(&state, id).await?;
    }

    let content = req.content;
    let is_bot = req.is_bot;
    let (message, activity) = state
        .db
        .call(move |db| {
            let message = db.create_message(channel, &content, sender_id, is_bot)?;
            let activity = match message.sender_id {
                Some(user_id) => Some(db.record_activity(
                    user_id,
                    ActivityType::MessageSent,
                    &format!("Posted in #{}", channel.as_str()),
                    Some(&serde_json::json!({ "message_id": message.id })),
                )?),
                None => None,
            };
            Ok((message, activity))
        })
        .await
        .map_err(db_error)?;

    broadcast_message(
        &state.ws_tx,
        &WsMessage::NewMessage {
            message: message.clone(),
        },
    );
    if let Some(activity) = &activity {
        announce_activity(&state, activity);
    }
    Ok(Json(message))
}

async fn upload_standup(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    AppMultipart(multipart): AppMultipart,
) -> Result<impl IntoResponse, ApiError> {
    require_user(&state, user_id).await?;
    let (filename, bytes) = read_upload(multipart).await?;
    let name = format!("standup_{}_{}", user_id, sanitize_filename(&filename));
    let url = state.uploads.save(&name, &bytes).await?;
    let transcript = state.ai.transcribe(bytes, &name).await?;

    let audio_url = url.clone();
    let text = transcript.clone();
    let record = state
        .db
        .call(move |db| gamification::complete_standup(db, user_id, &audio_url, &text))
        .await
        .map_err(db_error)?;
    broadcast_award(&state.ws_tx, &record.award);
    announce_activity(&state, &record.activity);

    Ok(Json(StandupUploaded { url, transcript }))
}

struct Coworker {
    name: &'static str,
    role: &'static str,
    context: &'static str,
}

const COWORKERS: &[Coworker] = &[
    Coworker {
        name: "Sarah",
        role: "Frontend Lead",
        context: "debugging the CSS grid layout",
    },
    Coworker {
        name: "Mike",
        role: "Backend dev",
        context: "optimizing database queries",
    },
    Coworker {
        name: "Alex",
        role: "DevOps",
        context: "fixing the CI/CD pipeline",
    },
    Coworker {
        name: "Emily",
        role: "Product Manager",
        context: "planning the next sprint",
    },
];

async fn coworker_update(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let (coworker, suffix) = {
        let mut rng = rand::thread_rng();
        let coworker = COWORKERS
            .choose(&mut rng)
            .ok_or_else(|| ApiError::Internal("No coworkers configured".to_string()))?;
        (coworker, rng.gen_range(1000..10000))
    };

    let text = state
        .ai
        .coworker_update(coworker.name, coworker.role, coworker.context)
        .await?;
    let audio = state.ai.synthesize_voice(&text, coworker.name).await?;

    let audio_url = if audio.is_empty() {
        String::new()
    } else {
        let name = format!("coworker_{}_{}.mp3", coworker.name, suffix);
        state.uploads.save(&name, &audio).await?
    };

    Ok(Json(CoworkerUpdate {
        name: coworker.name.to_string(),
        role: coworker.role.to_string(),
        text,
        audio_url,
    }))
}

async fn upload_retrospective(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    AppMultipart(multipart): AppMultipart,
) -> Result<impl IntoResponse, ApiError> {
    require_user(&state, user_id).await?;
    let (filename, bytes) = read_upload(multipart).await?;
    let name = format!("retro_{}_{}", user_id, sanitize_filename(&filename));
    let url = state.uploads.save(&name, &bytes).await?;

    let video_url = url.clone();
    state
        .db
        .call(move |db| db.create_retrospective(user_id, &video_url, true))
        .await
        .map_err(db_error)?;
    Ok(Json(Uploaded { url }))
}

async fn review_code(
    State(state): State<SharedState>,
    MaybeUser(user_id): MaybeUser,
    AppJson(req): AppJson<CodeReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let feedback = match state.ai.review_diff(&req.diff, &req.pr_title).await {
        Ok(feedback) => feedback,
        Err(e) => {
            tracing::warn!(error = %e, "code review generation failed");
            ReviewFeedback::default()
        }
    };

    if let Some(user_id) = user_id {
        require_user(&state, user_id).await?;
        let title = req.pr_title;
        let comment_count = feedback.comments.len();
        let (activity, award) = state
            .db
            .call(move |db| {
                let activity = db.record_activity(
                    user_id,
                    ActivityType::CodeReviewSubmitted,
                    &format!("Submitted \"{}\" for review", title),
                    Some(&serde_json::json!({ "comments": comment_count })),
                )?;
                let award = gamification::award_xp(db, user_id, CODE_REVIEW_XP)?;
                Ok((activity, award))
            })
            .await
            .map_err(db_error)?;
        announce_activity(&state, &activity);
        broadcast_award(&state.ws_tx, &award);
    }

    Ok(Json(feedback))
}

async fn generate_repo(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    AppJson(req): AppJson<GenerateRepoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&state, user_id).await?;
    let repo_name = req.repo_name.trim();
    if repo_name.is_empty() {
        return Err(ApiError::BadRequest("Repository name must not be empty".to_string()));
    }

    match onboarding::generate_repository(state.github.as_ref(), &state.db, &user, repo_name).await? {
        RepoGeneration::Created {
            repo_url,
            tickets,
            activities,
        } => {
            for activity in &activities {
                announce_activity(&state, activity);
            }
            tracing::info!(user_id, tickets = tickets.len(), "sprint seeded");
            Ok(Json(RepoGenerated {
                message: "Repository and 12 tickets created successfully!",
                repo_url,
            }))
        }
        RepoGeneration::AlreadyExists { repo_url } => Ok(Json(RepoGenerated {
            message: "Repository already exists",
            repo_url,
        })),
    }
}

async fn onboarding_checklist() -> Json<Vec<ChecklistItem>> {
    Json(onboarding::checklist())
}

async fn list_tickets(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let tickets = state
        .db
        .call(move |db| db.list_tickets_for_user(user_id))
        .await
        .map_err(db_error)?;
    Ok(Json(tickets))
}

async fn update_ticket_status(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<UpdateTicketStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let status = TicketStatus::from_str(&req.status).map_err(ApiError::BadRequest)?;

    let TicketMove { ticket, completion } = state
        .db
        .call(move |db| gamification::move_ticket(db, user_id, id, status))
        .await
        .map_err(db_error)?
        .ok_or(WorkplaceError::TicketNotFound { id })?;

    if let Some((activity, award)) = &completion {
        announce_activity(&state, activity);
        broadcast_award(&state.ws_tx, award);
    }
    Ok(Json(ticket))
}

async fn my_stats(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&state, user_id).await?;
    Ok(Json(StatsView::from(&user)))
}

async fn list_activities(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    AppQuery(query): AppQuery<ActivitiesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let activities = state
        .db
        .call(move |db| db.list_activities(user_id, limit))
        .await
        .map_err(db_error)?;
    Ok(Json(activities))
}

// ── Tests ─────────────────────────────────────────────────────────────

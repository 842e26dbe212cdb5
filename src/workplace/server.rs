use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Json, Router, http::HeaderValue, routing::get};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::ai;
use super::api::{self, AppState, SharedState};
use super::db::{DbHandle, WorkplaceDb};
use super::github::GitHubClient;
use super::storage::UploadStore;
use super::ws;
use crate::config::WorkplaceConfig;

/// Build the full application router: API, WebSocket, uploads and middleware.
pub fn build_router(state: SharedState) -> Router {
    let upload_dir = state.uploads.dir().to_path_buf();
    let cors = cors_layer(&state.config);

    api::api_router()
        .route("/", get(root))
        .route("/ws", get(ws::ws_handler))
        .nest_service("/static", ServeDir::new(upload_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({"message": "Welcome to The New Hire API"}))
}

fn cors_layer(config: &WorkplaceConfig) -> CorsLayer {
    if config.server.dev_mode {
        return CorsLayer::permissive();
    }
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match config.server.frontend_url.parse::<HeaderValue>() {
        Ok(origin) => base.allow_origin(origin),
        Err(_) => {
            tracing::warn!(
                frontend_url = %config.server.frontend_url,
                "frontend URL is not a valid origin; cross-origin requests will be refused"
            );
            base
        }
    }
}

/// Assemble shared state from configuration, opening and migrating the database.
pub fn build_state(config: WorkplaceConfig) -> Result<SharedState> {
    let db_path = &config.database.path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = WorkplaceDb::new(db_path).context("Failed to initialize workplace database")?;

    std::fs::create_dir_all(&config.server.upload_dir).with_context(|| {
        format!(
            "Failed to create upload directory {}",
            config.server.upload_dir.display()
        )
    })?;

    let (ws_tx, _rx) = broadcast::channel::<String>(256);
    Ok(Arc::new(AppState {
        db: DbHandle::new(db),
        ws_tx,
        github: Arc::new(GitHubClient::new(&config.github)),
        ai: ai::build_provider(&config.openai),
        uploads: UploadStore::new(&config.server.upload_dir, &config.server.public_url),
        config: Arc::new(config),
    }))
}

/// Start the API server and run until Ctrl-C.
pub async fn start_server(config: WorkplaceConfig) -> Result<()> {
    for warning in config.validate()? {
        tracing::warn!("{}", warning);
    }

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let state = build_state(config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "The New Hire API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workplace::ai::OfflineAi;
    use crate::workplace::github::testing::FakeGitHub;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_router(upload_dir: &std::path::Path, dev_mode: bool) -> Router {
        let mut config = WorkplaceConfig::default();
        config.server.dev_mode = dev_mode;
        let (ws_tx, _) = broadcast::channel(16);
        let state = Arc::new(AppState {
            db: DbHandle::new(WorkplaceDb::new_in_memory().unwrap()),
            ws_tx,
            github: Arc::new(FakeGitHub::default()),
            ai: Arc::new(OfflineAi),
            uploads: UploadStore::new(upload_dir, &config.server.public_url),
            config: Arc::new(config),
        });
        build_router(state)
    }

    #[tokio::test]
    async fn test_root_welcome_message() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(dir.path(), false);
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Welcome to The New Hire API");
    }

    #[tokio::test]
    async fn test_static_serves_uploads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("retro_1_clip.webm"), b"video").unwrap();
        let app = test_router(dir.path(), false);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/static/retro_1_clip.webm")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"video");
    }

    #[tokio::test]
    async fn test_missing_static_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(dir.path(), false);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/static/nothing.mp3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_allows_frontend_origin() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(dir.path(), false);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:5173"
        );
    }

    #[tokio::test]
    async fn test_cors_advertises_only_frontend_origin() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(dir.path(), false);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "http://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let allowed = response.headers().get("access-control-allow-origin").unwrap();
        assert_eq!(allowed, "http://localhost:5173");
        assert_ne!(allowed, "http://evil.example");
    }

    #[tokio::test]
    async fn test_ws_route_requires_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(dir.path(), true);
        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_build_state_creates_database_and_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = WorkplaceConfig::default();
        config.database.path = dir.path().join("data").join("newhire.db");
        config.server.upload_dir = dir.path().join("static");
        let state = build_state(config).unwrap();
        assert!(dir.path().join("data").join("newhire.db").exists());
        assert!(state.uploads.dir().is_dir());
    }
}

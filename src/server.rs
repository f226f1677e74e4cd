//! REST surface for the dashboard.
//!
//! Thin layer over the run coordinator: trigger a run, poll its status,
//! cancel it, read the persisted watermark record. CORS is wide open;
//! the server binds on localhost-grade deployments and the dashboard is
//! served from a different origin during development.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::RunError;
use crate::run::RunCoordinator;

/// Shared state for API routes.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RunCoordinator>,
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

/// POST /api/run
///
/// Runs one pass synchronously and returns its summary. A concurrent
/// trigger gets 409 instead of a queued run.
async fn trigger_run(State(state): State<AppState>) -> impl IntoResponse {
    match state.coordinator.run_once().await {
        Ok(summary) => Json(serde_json::to_value(&summary).unwrap_or_default()).into_response(),
        Err(RunError::AlreadyRunning) => (
            StatusCode::CONFLICT,
            Json(json!({"error": "A run is already in progress"})),
        )
            .into_response(),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": error.to_string()})),
        )
            .into_response(),
    }
}

/// GET /api/run/status
///
/// Snapshot of the shared status store; safe to poll while a run is in
/// flight.
async fn run_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.coordinator.status().snapshot().await)
}

/// POST /api/run/cancel
///
/// Flags the active run to stop before its next message. Always 202;
/// cancelling an idle coordinator is a no-op.
async fn cancel_run(State(state): State<AppState>) -> impl IntoResponse {
    state.coordinator.request_cancel();
    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "cancel_requested"})),
    )
}

/// GET /api/state
///
/// The persisted run record as currently on disk.
async fn persisted_state(State(state): State<AppState>) -> impl IntoResponse {
    match state.coordinator.persisted_state().await {
        Ok(record) => Json(serde_json::to_value(&record).unwrap_or_default()).into_response(),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": error.to_string()})),
        )
            .into_response(),
    }
}

/// Build the API router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/run", post(trigger_run))
        .route("/api/run/status", get(run_status))
        .route("/api/run/cancel", post(cancel_run))
        .route("/api/state", get(persisted_state))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(port: u16, coordinator: Arc<RunCoordinator>) -> std::io::Result<()> {
    let app = api_routes(AppState { coordinator });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!(port, "Dashboard API listening");
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::enrich::HeuristicEnrichment;
    use crate::error::ProviderError;
    use crate::mail::RawMessage;
    use crate::pipeline::Analyzer;
    use crate::provider::{DraftRequest, MailProvider, QueryWindow};
    use crate::rules::RuleSet;
    use crate::run::RunStatusStore;

    struct EmptyProvider;

    #[async_trait]
    impl MailProvider for EmptyProvider {
        async fn profile(&self) -> Result<String, ProviderError> {
            Ok("me@example.com".to_string())
        }

        async fn list_candidate_ids(
            &self,
            _window: QueryWindow,
            _max_results: u32,
        ) -> Result<Vec<String>, ProviderError> {
            Ok(Vec::new())
        }

        async fn fetch_full(&self, id: &str) -> Result<RawMessage, ProviderError> {
            Err(ProviderError::NotFound { id: id.to_string() })
        }

        async fn apply_label(&self, _id: &str, _label: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn remove_label(&self, _id: &str, _label: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn archive(&self, _id: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn create_draft(&self, _request: &DraftRequest) -> Result<String, ProviderError> {
            Ok("draft-1".to_string())
        }
    }

    fn make_app(dir: &std::path::Path) -> Router {
        let config = AppConfig {
            state_path: dir.join("state.json"),
            markers_dir: dir.join("markers"),
            ..AppConfig::default()
        };
        let analyzer = Analyzer::new(
            RuleSet::default_rules(),
            Arc::new(HeuristicEnrichment::new()),
        );
        let coordinator = Arc::new(RunCoordinator::new(
            config,
            Arc::new(EmptyProvider),
            analyzer,
            Arc::new(RunStatusStore::new()),
        ));
        api_routes(AppState { coordinator })
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let dir = tempdir().unwrap();
        let app = make_app(dir.path());

        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
    }

    #[tokio::test]
    async fn status_starts_idle() {
        let dir = tempdir().unwrap();
        let app = make_app(dir.path());

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/run/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["state"], "idle");
        assert_eq!(parsed["metrics"]["processed"], 0);
    }

    #[tokio::test]
    async fn run_trigger_returns_summary() {
        let dir = tempdir().unwrap();
        let app = make_app(dir.path());

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/run")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["processed"], 0);
        assert_eq!(parsed["message_ids_seen"], 0);
    }

    #[tokio::test]
    async fn corrupt_state_maps_to_500() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("state.json"), "{ not json").unwrap();
        let app = make_app(dir.path());

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/run")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let parsed = body_json(resp).await;
        assert!(parsed["error"].as_str().unwrap().contains("State"));
    }

    #[tokio::test]
    async fn cancel_is_accepted() {
        let dir = tempdir().unwrap();
        let app = make_app(dir.path());

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/run/cancel")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn state_endpoint_returns_persisted_record() {
        let dir = tempdir().unwrap();
        let app = make_app(dir.path());

        // First run persists nothing (empty window), so state is default.
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/state")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["run_counter"], 0);
        assert!(parsed["last_internal_date_ms"].is_null());
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let dir = tempdir().unwrap();
        let app = make_app(dir.path());

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

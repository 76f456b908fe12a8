//! Documentation HTTP server.
//!
//! Serves package documentation requests through the [`Checker`] and the
//! generated artifacts straight from the docs directory. The lifecycle
//! passes and the stats refresher run on background tasks for as long as
//! the server is up.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/docs/{*path}` | Serve or build documentation for an import path |
//! | `POST` | `/api/refresh/{*path}` | Refetch an import path, honoring the refresh interval |
//! | `GET`  | `/api/stats` | Latest catalog statistics snapshot |
//! | `GET`  | `/docs/...` | Generated artifact files |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "timeout", "message": "fetch package timeout, try again" } }
//! ```
//!
//! Error codes: `bad_request` (400), `search_instead` (400), `not_found` (404),
//! `timeout` (408), `upstream` (502), `internal` (500).

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info};

use docwalker_core::models::{ArtifactStatus, PackageRecord};

use crate::app::App;
use crate::check::{CheckOutcome, Checker, RequestKind};
use crate::error::CrawlError;
use crate::stats::{Stats, StatsSnapshot};

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    checker: Arc<Checker>,
    stats: Arc<Stats>,
}

impl AppState {
    pub fn new(app: &App) -> Self {
        Self {
            checker: Arc::clone(&app.checker),
            stats: Arc::clone(&app.stats),
        }
    }
}

/// Build the router. Exposed separately from [`run_server`] for tests.
pub fn router(state: AppState) -> Router {
    let docs_root = state.checker.store().docs_root().to_path_buf();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/docs/{*path}", get(handle_docs))
        .route("/api/refresh/{*path}", post(handle_refresh))
        .route("/api/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .nest_service("/docs", ServeDir::new(docs_root))
        .layer(cors)
        .with_state(state)
}

/// Start the server and the background maintenance tasks.
///
/// Binds to `config.server.bind` and serves until the process exits.
pub async fn run_server(app: App) -> Result<()> {
    let bind_addr = app.config.server.bind.clone();
    let m = &app.config.maintenance;

    let _lifecycle_tasks = Arc::clone(&app.lifecycle).spawn_periodic(
        Duration::from_secs(m.distribute_every_secs),
        Duration::from_secs(m.recycle_every_secs),
    );
    let _stats_task = Arc::clone(&app.stats).spawn_periodic(Duration::from_secs(m.stats_every_secs));

    let state = AppState::new(&app);
    let router = router(state);

    println!("docwalker listening on http://{}", bind_addr);
    info!(bind = %bind_addr, "server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<CrawlError> for AppError {
    fn from(e: CrawlError) -> Self {
        match &e {
            CrawlError::InvalidRemotePath => AppError::new(
                StatusCode::BAD_REQUEST,
                "search_instead",
                format!("{}, try searching instead", e),
            ),
            CrawlError::Vendor => AppError::new(StatusCode::BAD_REQUEST, "bad_request", e.to_string()),
            CrawlError::FetchTimeout => {
                AppError::new(StatusCode::REQUEST_TIMEOUT, "timeout", format!("{}, try again", e))
            }
            _ if e.is_gone() => AppError::new(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{}, try searching instead", e),
            ),
            CrawlError::Http { .. } => AppError::new(StatusCode::BAD_GATEWAY, "upstream", e.to_string()),
            _ => {
                error!(error = %e, "request failed");
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Documentation ============

/// JSON response body for the docs and refresh endpoints.
#[derive(Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
enum DocsResponse {
    Ready {
        package: PackageRecord,
        status: ArtifactStatus,
        /// Where the rendered chunks can be loaded from, in order.
        doc_urls: Vec<String>,
        generated: bool,
    },
    RefreshTooSoon {
        package: PackageRecord,
        remaining_secs: u64,
    },
}

impl DocsResponse {
    fn from_outcome(checker: &Checker, outcome: CheckOutcome) -> Self {
        match outcome {
            CheckOutcome::Ready {
                record,
                artifact,
                generated,
            } => {
                let doc_urls = checker.store().doc_urls(&record.import_path, &artifact);
                DocsResponse::Ready {
                    status: artifact.status,
                    package: record,
                    doc_urls,
                    generated,
                }
            }
            CheckOutcome::RefreshTooSoon { record, remaining_secs } => DocsResponse::RefreshTooSoon {
                package: record,
                remaining_secs,
            },
        }
    }
}

/// Handler for `GET /api/docs/{*path}`.
async fn handle_docs(State(state): State<AppState>, Path(path): Path<String>) -> Result<Json<DocsResponse>, AppError> {
    let outcome = state.checker.check(&path, RequestKind::View).await?;
    Ok(Json(DocsResponse::from_outcome(&state.checker, outcome)))
}

/// Handler for `POST /api/refresh/{*path}`.
///
/// A refresh inside the refresh interval is not an error: the response
/// carries `state: "refresh_too_soon"` and the remaining wait.
async fn handle_refresh(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<DocsResponse>, AppError> {
    let outcome = state.checker.check(&path, RequestKind::Refresh).await?;
    Ok(Json(DocsResponse::from_outcome(&state.checker, outcome)))
}

// ============ GET /api/stats ============

async fn handle_stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json((*state.stats.get()).clone())
}

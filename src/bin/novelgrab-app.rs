use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use novelgrab::batch::BatchOutcome;
use novelgrab::config::Config;
use novelgrab::error::Error;
use novelgrab::export::{ArtifactSink, ExportArtifact, MemorySink};
use novelgrab::model::{BatchProgress, ChapterRecord, Manifest};
use novelgrab::session::Session;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Pause between chapter fetches (overrides NOVELGRAB_BATCH_DELAY_MS).
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Model name for the OpenAI Responses API (overrides NOVELGRAB_OPENAI_MODEL).
    #[arg(long)]
    model: Option<String>,
}

#[derive(Clone)]
struct AppState {
    session: Arc<Session>,
    exports: Arc<MemorySink>,
}

/// Maps session errors onto HTTP statuses with a JSON body.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) | Error::UnknownChapter(_) => StatusCode::NOT_FOUND,
            Error::NoManifest | Error::BatchInProgress | Error::ExportEmpty { .. } => {
                StatusCode::CONFLICT
            }
            Error::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Interpretation(_) | Error::ContentUnavailable(_) | Error::Transport { .. } => {
                StatusCode::BAD_GATEWAY
            }
        };
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RangeRequest {
    start: u32,
    end: u32,
}

#[derive(Debug, Serialize)]
struct BatchStatus {
    active: bool,
    progress: Option<BatchProgress>,
    last_outcome: Option<BatchOutcome>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    novelgrab::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting novelgrab-app");

    let mut config = Config::from_env()?;
    if let Some(model) = args.model {
        config.oracle.model = model;
    }
    if let Some(delay_ms) = args.delay_ms {
        config.batch_delay = Duration::from_millis(delay_ms);
    }

    let exports = Arc::new(MemorySink::new());
    let sink: Arc<dyn ArtifactSink> = exports.clone();
    let session = Arc::new(novelgrab::commands::open_session(&config, sink)?);
    let state = AppState {
        session: Arc::clone(&session),
        exports,
    };

    let app = Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/search", post(search))
        .route("/manifest", get(manifest))
        .route("/chapters/:id/open", post(open_chapter))
        .route("/chapters/:id/retry", post(retry_chapter))
        .route("/batch", get(batch_status).post(start_batch))
        .route("/batch/progress", get(batch_progress))
        .route("/batch/cancel", post(cancel_batch))
        .route("/export", get(export_range))
        .route("/exports/:filename", get(download_export))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
            session.cancel_batch();
        })
        .await?;
    Ok(())
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Manifest>, ApiError> {
    Ok(Json(state.session.search(&req.name).await?))
}

async fn manifest(State(state): State<AppState>) -> Result<Json<Manifest>, ApiError> {
    state.session.manifest().map(Json).ok_or(ApiError(Error::NoManifest))
}

async fn open_chapter(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChapterRecord>, ApiError> {
    Ok(Json(state.session.open_chapter(&id).await?))
}

async fn retry_chapter(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChapterRecord>, ApiError> {
    Ok(Json(state.session.retry_chapter(&id).await?))
}

async fn start_batch(
    State(state): State<AppState>,
    Json(req): Json<RangeRequest>,
) -> Result<(StatusCode, Json<BatchStatus>), ApiError> {
    // The job outlives the request; its outcome is read back from `GET /batch`.
    let _job = state.session.spawn_download(req.start, req.end)?;
    Ok((StatusCode::ACCEPTED, Json(status_of(&state.session))))
}

async fn batch_status(State(state): State<AppState>) -> Json<BatchStatus> {
    Json(status_of(&state.session))
}

fn status_of(session: &Session) -> BatchStatus {
    BatchStatus {
        active: session.is_batch_active(),
        progress: session.progress(),
        last_outcome: session.last_outcome(),
    }
}

async fn batch_progress(State(state): State<AppState>) -> Json<Option<BatchProgress>> {
    Json(state.session.progress())
}

async fn cancel_batch(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cancelled = state.session.cancel_batch();
    Json(serde_json::json!({ "cancelled": cancelled }))
}

async fn export_range(
    State(state): State<AppState>,
    Query(range): Query<RangeRequest>,
) -> Result<Response, ApiError> {
    let artifact = state.session.export_range(range.start, range.end)?;
    Ok(markdown_attachment(artifact))
}

async fn download_export(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, StatusCode> {
    let artifact = state.exports.get(&filename).ok_or(StatusCode::NOT_FOUND)?;
    Ok(markdown_attachment(artifact))
}

fn markdown_attachment(artifact: ExportArtifact) -> Response {
    let mut resp = Response::new(axum::body::Body::from(artifact.body));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/markdown; charset=utf-8"),
    );
    // Export filenames are ASCII alphanumerics, `_`, `-` and `.` only.
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", artifact.filename))
    {
        resp.headers_mut().insert(header::CONTENT_DISPOSITION, value);
    }
    resp
}

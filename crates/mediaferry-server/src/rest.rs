//! HTTP front door.
//!
//! `POST /download` authenticates the shared secret, runs one job and
//! answers synchronously with its outcome. The job runs on its own task, so
//! a client that hangs up does not abort it and the webhook still fires.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use mediaferry::{event_matches_job, JobRequest, MediaKind, QualityHints};

use crate::state::AppState;

/// Storage namespace used when the caller names no owner.
const DEFAULT_OWNER: &str = "unassigned";

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/download", post(download))
        .route("/api/v1/events", get(events_sse))
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl-C, then cancel running jobs and drain connections.
pub async fn serve(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP front door listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown requested");
            state.begin_shutdown();
        })
        .await?;
    Ok(())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "proxy_configured": state.proxy_configured,
        "version": env!("CARGO_PKG_VERSION"),
        "active_jobs": state.orchestrator.active_jobs(),
        "uptime_s": state.started_at.elapsed().as_secs(),
    }))
}

/// Body of `POST /download`. Every field is optional on the wire so that
/// missing fields produce the documented error bodies.
#[derive(Debug, Default, Deserialize)]
pub struct DownloadBody {
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub asset_id: Option<String>,
    pub artist_id: Option<String>,
    pub secret: Option<String>,
    pub callback_url: Option<String>,
}

fn error_response(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

async fn download(
    State(state): State<Arc<AppState>>,
    body: Option<Json<DownloadBody>>,
) -> Response {
    let body = body.map(|Json(b)| b).unwrap_or_default();

    if !state.authorized(body.secret.as_deref()) {
        return error_response(StatusCode::UNAUTHORIZED, json!({ "error": "Unauthorized" }));
    }

    let (Some(url), Some(asset_id)) = (non_empty(body.url), non_empty(body.asset_id)) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            json!({ "error": "Missing url or asset_id" }),
        );
    };

    let media_kind = match body.media_type.as_deref() {
        None => MediaKind::Audio,
        Some(raw) => match raw.parse::<MediaKind>() {
            Ok(kind) => kind,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    json!({ "error": e, "asset_id": asset_id }),
                )
            }
        },
    };

    let request = JobRequest {
        job_id: asset_id.clone(),
        owner_id: non_empty(body.artist_id).unwrap_or_else(|| DEFAULT_OWNER.to_string()),
        url,
        media_kind,
        quality: QualityHints::default(),
        callback_url: non_empty(body.callback_url),
        shared_secret: body.secret,
    };
    tracing::info!(job_id = %asset_id, kind = %media_kind, "download requested");

    let handle = state
        .orchestrator
        .submit(request, CancellationToken::new());
    let report = match handle.await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(job_id = %asset_id, error = %e, "job task failed");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "internal error", "asset_id": asset_id }),
            );
        }
    };

    match (&report.job.output, &report.error) {
        (Some(output), None) => Json(json!({
            "success": true,
            "asset_id": asset_id,
            "url": output.public_url,
            "title": output.title.as_deref().unwrap_or("Unknown"),
            "duration": output.duration_seconds.unwrap_or(0),
        }))
        .into_response(),
        (_, error) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({
                "error": error.as_deref().unwrap_or("job failed"),
                "asset_id": asset_id,
            }),
        ),
    }
}

#[derive(Debug, Default, Deserialize)]
struct EventsParams {
    job_id: Option<String>,
}

/// Server-Sent Events stream of pipeline events, optionally for one job.
async fn events_sse(
    Query(params): Query<EventsParams>,
    State(state): State<Arc<AppState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let events = state.orchestrator.events();
    let mut rx = events.subscribe();
    let shutdown = state.shutdown.clone();
    let job_filter = params.job_id;
    tracing::debug!(
        job_id = job_filter.as_deref().unwrap_or("*"),
        subscribers = events.subscriber_count(),
        "event stream opened"
    );

    let stream = async_stream::stream! {
        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => received,
            };
            match received {
                Ok(event) => {
                    if !event_matches_job(&event, job_filter.as_deref()) {
                        continue;
                    }
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(Event::default().data(json));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event stream lagging");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

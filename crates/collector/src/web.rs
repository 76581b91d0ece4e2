use anyhow::Context;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use std::net::SocketAddr;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::db::Db;
use crate::error::ApiError;
use crate::reading::{decode_payload, HistoryPoint, Reading};
use crate::state::SharedState;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub status: SharedState,
    pub default_history_hours: u32,
    pub max_history_hours: u32,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/data", post(ingest))
        .route("/api/latest", get(latest))
        .route("/api/history", get(history))
        .route("/api/status", get(api_status))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// POST /api/data
///
/// The body is taken as raw bytes so that malformed JSON is reported in the
/// same `{error, details}` shape as a missing field.
async fn ingest(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let reading = match decode_payload(&body) {
        Ok(r) => r,
        Err(errors) => {
            warn!(errors = errors.len(), "rejected reading: {}", errors.join("; "));
            state.status.write().await.record_rejected(&errors);
            return Err(ApiError::Validation(errors));
        }
    };

    let id = state.db.insert_reading(&reading).await?;
    info!(
        id,
        methane = reading.methane,
        temperature = reading.temperature,
        ph = reading.ph,
        heat = %reading.heat_status,
        "reading stored"
    );
    state.status.write().await.record_ingest(id, &reading);

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Data stored successfully".to_string(),
        }),
    ))
}

/// GET /api/latest
async fn latest(State(state): State<AppState>) -> Result<Json<Reading>, ApiError> {
    state
        .db
        .latest_reading()
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no readings stored".to_string()))
}

/// GET /api/history?hours=N
///
/// The query is taken as raw pairs so that every malformed query string is
/// answered with the `{error, details}` shape.
async fn history(
    State(state): State<AppState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<Vec<HistoryPoint>>, ApiError> {
    let Query(pairs) = query.map_err(|e| ApiError::Validation(vec![e.body_text()]))?;
    let hours = parse_hours(
        hours_param(&pairs)?,
        state.default_history_hours,
        state.max_history_hours,
    )?;
    let since = window_start(OffsetDateTime::now_utc(), hours);

    let points = state
        .db
        .readings_since(since)
        .await?
        .into_iter()
        .map(HistoryPoint::from)
        .collect();
    Ok(Json(points))
}

/// GET /api/status
async fn api_status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stored = state.db.count_readings().await?;
    let st = state.status.read().await;
    Ok(Json(st.to_status(stored)))
}

/// Window length in hours: absent means `default`, otherwise a
/// non-negative integer no greater than `max`.
pub fn parse_hours(raw: Option<&str>, default: u32, max: u32) -> Result<u32, ApiError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let hours: u32 = raw.trim().parse().map_err(|_| {
        ApiError::Validation(vec![format!(
            "hours must be a non-negative integer, got {raw:?}"
        )])
    })?;
    if hours > max {
        return Err(ApiError::Validation(vec![format!(
            "hours {hours} exceeds the maximum of {max}"
        )]));
    }
    Ok(hours)
}

/// The single `hours` value, if given.  Other parameters are ignored.
fn hours_param(pairs: &[(String, String)]) -> Result<Option<&str>, ApiError> {
    let mut values = pairs.iter().filter(|(k, _)| k == "hours").map(|(_, v)| v.as_str());
    let first = values.next();
    if values.next().is_some() {
        return Err(ApiError::Validation(vec![
            "hours must be given at most once".to_string(),
        ]));
    }
    Ok(first)
}

/// First whole second inside a window of `hours` ending at `now`.  Stored
/// timestamps have second resolution, so a cutoff that lands mid-second
/// excludes that second: a zero-hour window is empty.
pub fn window_start(now: OffsetDateTime, hours: u32) -> i64 {
    let cutoff = now - time::Duration::hours(i64::from(hours));
    cutoff.unix_timestamp() + i64::from(cutoff.nanosecond() > 0)
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("collector listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("web server error")?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("interrupt received, shutting down"),
        Err(e) => {
            error!("failed to listen for interrupt: {e}");
            std::future::pending::<()>().await;
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

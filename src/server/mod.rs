//! HTTP surface: ingestion endpoint, query endpoints, live channel
//!
//! Thin glue over the core pipeline. The only correctness rule enforced
//! here is ordering: a pulse is broadcast to live viewers only after the
//! store reports a durable write.

pub mod ws;

use crate::aggregator::{self, Bucket, BUCKET_WIDTH_MS};
use crate::fanout::PulseHub;
use crate::store::{now_ms, EventStore, NewPulse, PulseRecord, StoreSummary};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MAX_RECENT_MINUTES: i64 = 60;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<EventStore>,
    pub hub: Arc<PulseHub>,
    /// History lookback cap, tied to the retention horizon
    pub max_history_days: i64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/pulse", post(ingest_pulse))
        .route("/api/history", get(history))
        .route("/api/recent", get(recent))
        .route("/api/stats", get(stats))
        .route("/api/live", get(ws::live_handler))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
}

/// Accept a pulse notification from the sensor
///
/// The body is parsed leniently: a malformed payload degrades to an empty
/// one and the pulse is still recorded with defaults. A dropped reading is
/// worse than a defaulted field, since the device would otherwise retry.
async fn ingest_pulse(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let pulse: NewPulse = serde_json::from_slice(&body).unwrap_or_default();

    match state.store.append(pulse) {
        Ok(record) => {
            // Durability precedes notification: only a stored record is
            // ever pushed to subscribers
            let delivered = state.hub.broadcast(&record).await;
            log::debug!(
                "📡 Pulse {} broadcast to {} subscriber(s)",
                record.id,
                delivered
            );
            (
                StatusCode::OK,
                Json(IngestResponse {
                    success: true,
                    id: Some(record.id),
                }),
            )
        }
        Err(e) => {
            log::error!("❌ Failed to persist pulse: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(IngestResponse {
                    success: false,
                    id: None,
                }),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    days: Option<i64>,
}

/// 10-minute buckets over the last N days (capped at the retention horizon)
async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Bucket>>, StatusCode> {
    let days = params
        .days
        .unwrap_or(state.max_history_days)
        .clamp(1, state.max_history_days);
    let since = now_ms() - days * 24 * 60 * 60 * 1000;

    match aggregator::buckets(&state.store, since, BUCKET_WIDTH_MS) {
        Ok(buckets) => Ok(Json(buckets)),
        Err(e) => {
            log::error!("❌ History query failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecentParams {
    minutes: Option<i64>,
}

/// Raw records over the last N minutes (capped at 60)
async fn recent(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Result<Json<Vec<PulseRecord>>, StatusCode> {
    let minutes = params
        .minutes
        .unwrap_or(MAX_RECENT_MINUTES)
        .clamp(1, MAX_RECENT_MINUTES);
    let since = now_ms() - minutes * 60 * 1000;

    match aggregator::recent(&state.store, since) {
        Ok(records) => Ok(Json(records)),
        Err(e) => {
            log::error!("❌ Recent query failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn stats(State(state): State<AppState>) -> Result<Json<StoreSummary>, StatusCode> {
    match aggregator::stats(&state.store) {
        Ok(summary) => Ok(Json(summary)),
        Err(e) => {
            log::error!("❌ Stats query failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

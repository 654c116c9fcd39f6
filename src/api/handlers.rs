//! HTTP request handlers.

use axum::{Json, extract::State, http::Uri};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::ApiError;
use super::state::AppState;
use crate::history::HistorySnapshot;
use crate::round::SessionId;

/// Liveness response for `/`
#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub message: &'static str,
    pub endpoint: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub history_len: usize,
    pub capacity: usize,
    pub last_session: Option<SessionId>,
    pub cycles: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_kind: Option<&'static str>,
    pub consecutive_failures: u32,
}

pub async fn index(State(state): State<AppState>) -> Json<IndexResponse> {
    Json(IndexResponse {
        message: "API Server for TaiXiu MD5 is running",
        endpoint: state.history_path.to_string(),
    })
}

/// Current history, newest first.
pub async fn get_history(State(state): State<AppState>) -> Json<HistorySnapshot> {
    Json(state.history.snapshot().await)
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.poll_status.read().await.clone();

    Json(HealthResponse {
        status: status.state(),
        version: env!("CARGO_PKG_VERSION"),
        history_len: state.history.len().await,
        capacity: state.history.capacity(),
        last_session: state.history.last_session().await,
        cycles: status.cycles,
        last_success_at: status.last_success_at,
        last_failure_at: status.last_failure_at,
        last_error: status.last_error,
        last_error_kind: status.last_error_kind,
        consecutive_failures: status.consecutive_failures,
    })
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}

//! Test utilities and common setup.

use std::sync::Arc;

use axum::Router;
use taixiu_feed::api::{self, AppState};
use taixiu_feed::{HistoryStore, RoundResult, SessionId, SharedPollStatus};

pub struct TestApp {
    pub router: Router,
    pub history: Arc<HistoryStore>,
    pub poll_status: SharedPollStatus,
}

/// Create a router over an empty history with the given capacity.
pub fn test_app(capacity: usize) -> TestApp {
    test_app_at(capacity, "/txmd5")
}

pub fn test_app_at(capacity: usize, history_path: &str) -> TestApp {
    let history = Arc::new(HistoryStore::new(capacity));
    let poll_status = SharedPollStatus::default();
    let state = AppState::new(history.clone(), poll_status.clone(), history_path);

    TestApp {
        router: api::create_router(state),
        history,
        poll_status,
    }
}

pub fn round(sid: &str, dice: [i64; 3]) -> RoundResult {
    RoundResult::new(
        SessionId::from(sid),
        dice,
        Some(format!("md5-{sid}")),
        "S77SIMON",
    )
    .unwrap()
}

//! Application state shared across handlers.

use std::sync::Arc;

use crate::history::HistoryStore;
use crate::poller::SharedPollStatus;

#[derive(Clone)]
pub struct AppState {
    /// Round history, written by the poller.
    pub history: Arc<HistoryStore>,
    /// Outcome of recent poll cycles.
    pub poll_status: SharedPollStatus,
    /// Route the history is served on.
    pub history_path: Arc<str>,
}

impl AppState {
    pub fn new(
        history: Arc<HistoryStore>,
        poll_status: SharedPollStatus,
        history_path: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            history,
            poll_status,
            history_path: history_path.into(),
        }
    }
}

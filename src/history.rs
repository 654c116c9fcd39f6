//! Bounded in-memory round history.
//!
//! The sequence and the dedup cursor live behind a single lock, so a reader
//! never observes a half-applied commit or a sequence above capacity.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::round::{RoundResult, SessionId};

/// Default number of rounds kept in memory.
pub const DEFAULT_CAPACITY: usize = 300;

/// Point-in-time copy of the history, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub total: usize,
    pub data: Vec<RoundResult>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: VecDeque<RoundResult>,
    cursor: Option<SessionId>,
}

/// Shared round history.
///
/// Written by the poller, read by the API handlers. Wrap in an `Arc` to share.
#[derive(Debug)]
pub struct HistoryStore {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl HistoryStore {
    /// Create an empty store. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity),
                cursor: None,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert a record at the front, evicting the oldest entry when full.
    ///
    /// Does not consult or move the dedup cursor.
    pub async fn commit(&self, record: RoundResult) {
        let mut inner = self.inner.lock().await;
        Self::push_front(&mut inner, record, self.capacity);
    }

    /// Commit a record unless its session id matches the last accepted one.
    ///
    /// The cursor check, cursor update and insert happen under one lock.
    /// Returns `true` if the record was stored.
    pub async fn accept(&self, record: RoundResult) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.cursor.as_ref() == Some(&record.session_id) {
            return false;
        }
        inner.cursor = Some(record.session_id.clone());
        Self::push_front(&mut inner, record, self.capacity);
        true
    }

    /// Copy of the current history, newest first.
    pub async fn snapshot(&self) -> HistorySnapshot {
        let inner = self.inner.lock().await;
        let data: Vec<RoundResult> = inner.entries.iter().cloned().collect();
        HistorySnapshot {
            total: data.len(),
            data,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// The dedup cursor: session id of the last accepted round.
    pub async fn last_session(&self) -> Option<SessionId> {
        self.inner.lock().await.cursor.clone()
    }

    fn push_front(inner: &mut Inner, record: RoundResult, capacity: usize) {
        inner.entries.push_front(record);
        while inner.entries.len() > capacity {
            inner.entries.pop_back();
        }
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

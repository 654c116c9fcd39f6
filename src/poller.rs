//! Background poll loop.
//!
//! Each cycle fetches the notify endpoint, pushes round-result entries through
//! the acceptance gate and commits the survivors to the shared history. Every
//! failure is logged and retried; the loop never exits.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::config::Config;
use crate::history::HistoryStore;
use crate::upstream::{PollError, PollResult, RawRound, UpstreamClient, envelope_entries};

/// Outcome of the most recent poll cycles, for the health endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollStatus {
    pub cycles: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_kind: Option<&'static str>,
    pub consecutive_failures: u32,
}

impl PollStatus {
    /// `"starting"` before the first cycle, then `"ok"` or `"degraded"`
    /// depending on the last cycle.
    pub fn state(&self) -> &'static str {
        if self.cycles == 0 {
            "starting"
        } else if self.consecutive_failures == 0 {
            "ok"
        } else {
            "degraded"
        }
    }

    fn record_success(&mut self) {
        self.cycles += 1;
        self.last_success_at = Some(Utc::now());
        self.consecutive_failures = 0;
    }

    fn record_failure(&mut self, err: &PollError) {
        self.cycles += 1;
        self.last_failure_at = Some(Utc::now());
        self.last_error = Some(err.to_string());
        self.last_error_kind = Some(err.kind());
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }
}

pub type SharedPollStatus = Arc<RwLock<PollStatus>>;

/// Counts for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Entries in the envelope's `data` list.
    pub entries: usize,
    /// Entries carrying the round-result command.
    pub matched: usize,
    /// Rounds committed to history.
    pub accepted: usize,
}

/// Extra delay applied after a failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    /// When set, the delay doubles per consecutive failure up to this cap,
    /// with jitter. When unset the delay is always `base`.
    pub max: Option<Duration>,
}

impl RetryPolicy {
    pub fn flat(base: Duration) -> Self {
        Self { base, max: None }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            base: config.retry_delay(),
            max: config.retry_max_delay(),
        }
    }

    /// Delay after `failures` consecutive failed cycles (1 for the first).
    pub fn delay(&self, failures: u32) -> Duration {
        let Some(max) = self.max else {
            return self.base;
        };

        let exponent = failures.saturating_sub(1).min(16);
        let ceiling = self.base.saturating_mul(1u32 << exponent).min(max);
        if ceiling.is_zero() {
            return ceiling;
        }

        // Equal jitter: half fixed, half random.
        let half = ceiling / 2;
        let spread = (ceiling - half).as_millis() as u64;
        half + Duration::from_millis(rand::rng().random_range(0..=spread))
    }
}

pub struct Poller {
    client: UpstreamClient,
    store: Arc<HistoryStore>,
    status: SharedPollStatus,
    source_tag: String,
    poll_interval: Duration,
    retry: RetryPolicy,
}

impl Poller {
    pub fn new(
        client: UpstreamClient,
        store: Arc<HistoryStore>,
        status: SharedPollStatus,
        config: &Config,
    ) -> Self {
        Self {
            client,
            store,
            status,
            source_tag: config.source_tag.clone(),
            poll_interval: config.poll_interval(),
            retry: RetryPolicy::from_config(config),
        }
    }

    /// Override the delay between cycles.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run a single fetch and commit pass.
    ///
    /// Rounds are committed as they are read, so a shape error part way
    /// through the list keeps whatever was accepted before it.
    pub async fn poll_once(&self) -> PollResult<CycleReport> {
        let envelope = self.client.fetch().await?;
        let mut report = CycleReport::default();

        let Some(entries) = envelope_entries(&envelope)? else {
            debug!("upstream envelope not OK, nothing to read");
            return Ok(report);
        };
        report.entries = entries.len();

        for entry in entries {
            let Some(raw) = RawRound::from_entry(entry)? else {
                continue;
            };
            report.matched += 1;

            let Some(round) = raw.into_result(&self.source_tag)? else {
                trace!("skipping incomplete round entry");
                continue;
            };

            let session = round.session_id.clone();
            let (total, outcome) = (round.total, round.outcome);
            let checksum = round.checksum.clone();

            if self.store.accept(round).await {
                report.accepted += 1;
                info!(
                    session = %session,
                    total,
                    outcome = %outcome,
                    checksum = checksum.as_deref().unwrap_or("-"),
                    "accepted round"
                );
            } else {
                trace!(session = %session, "skipping already accepted round");
            }
        }

        Ok(report)
    }

    /// Poll forever.
    pub async fn run(self) {
        info!(
            url = self.client.url(),
            interval_secs = self.poll_interval.as_secs_f64(),
            "started polling upstream"
        );

        let mut failures: u32 = 0;
        loop {
            match self.poll_once().await {
                Ok(report) => {
                    failures = 0;
                    self.status.write().await.record_success();
                    debug!(
                        entries = report.entries,
                        matched = report.matched,
                        accepted = report.accepted,
                        "poll cycle complete"
                    );
                }
                Err(err) => {
                    failures = failures.saturating_add(1);
                    error!(kind = err.kind(), failures, "failed to poll upstream: {}", err);
                    self.status.write().await.record_failure(&err);
                    tokio::time::sleep(self.retry.delay(failures)).await;
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Start the loop on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::round::{Outcome, SessionId};
    use serde_json::{Value, json};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn round_entry(sid: &str, dice: [i64; 3]) -> Value {
        json!({
            "cmd": 2006,
            "sid": sid,
            "d1": dice[0],
            "d2": dice[1],
            "d3": dice[2],
            "hash": format!("hash-{sid}"),
        })
    }

    async fn serve(server: &MockServer, body: Value) {
        server.reset().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn poller_for(server: &MockServer, store: Arc<HistoryStore>) -> (Poller, SharedPollStatus) {
        let config = Config {
            upstream_url: server.uri(),
            poll_interval_secs: 0,
            retry_delay_secs: 0,
            ..Config::default()
        };
        let client = UpstreamClient::from_config(&config).unwrap();
        let status = SharedPollStatus::default();
        let poller = Poller::new(client, store, status.clone(), &config)
            .with_poll_interval(Duration::from_millis(10));
        (poller, status)
    }

    #[tokio::test]
    async fn test_poll_once_commits_rounds() {
        let server = MockServer::start().await;
        serve(
            &server,
            json!({
                "status": "OK",
                "data": [
                    {"cmd": 1001, "sid": "ignored"},
                    round_entry("100", [3, 3, 4]),
                    round_entry("101", [4, 4, 4]),
                ]
            }),
        )
        .await;

        let store = Arc::new(HistoryStore::new(10));
        let (poller, _) = poller_for(&server, store.clone());

        let report = poller.poll_once().await.unwrap();
        assert_eq!(
            report,
            CycleReport {
                entries: 3,
                matched: 2,
                accepted: 2
            }
        );

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.data[0].session_id, SessionId::from("101"));
        assert_eq!(snapshot.data[0].outcome, Outcome::High);
        assert_eq!(snapshot.data[1].outcome, Outcome::Low);
        assert_eq!(snapshot.data[1].checksum.as_deref(), Some("hash-100"));
        assert_eq!(snapshot.data[1].source_tag, "S77SIMON");
    }

    #[tokio::test]
    async fn test_repeated_envelope_is_deduplicated() {
        let server = MockServer::start().await;
        serve(
            &server,
            json!({"status": "OK", "data": [round_entry("200", [1, 1, 1])]}),
        )
        .await;

        let store = Arc::new(HistoryStore::new(10));
        let (poller, _) = poller_for(&server, store.clone());

        assert_eq!(poller.poll_once().await.unwrap().accepted, 1);
        assert_eq!(poller.poll_once().await.unwrap().accepted, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_incomplete_round_is_skipped() {
        let server = MockServer::start().await;
        serve(
            &server,
            json!({"status": "OK", "data": [
                {"cmd": 2006, "sid": "300", "d1": 1, "d2": 2, "d3": null},
                {"cmd": 2006, "sid": "", "d1": 1, "d2": 2, "d3": 3},
            ]}),
        )
        .await;

        let store = Arc::new(HistoryStore::new(10));
        let (poller, _) = poller_for(&server, store.clone());

        let report = poller.poll_once().await.unwrap();
        assert_eq!(report.matched, 2);
        assert_eq!(report.accepted, 0);
        assert!(store.is_empty().await);
        assert_eq!(store.last_session().await, None);
    }

    #[tokio::test]
    async fn test_non_ok_envelope_is_not_an_error() {
        let server = MockServer::start().await;
        serve(
            &server,
            json!({"status": "MAINTENANCE", "data": [round_entry("1", [1, 2, 3])]}),
        )
        .await;

        let store = Arc::new(HistoryStore::new(10));
        let (poller, _) = poller_for(&server, store.clone());

        assert_eq!(poller.poll_once().await.unwrap(), CycleReport::default());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_shape_error_keeps_earlier_rounds() {
        let server = MockServer::start().await;
        serve(
            &server,
            json!({"status": "OK", "data": [
                round_entry("400", [2, 2, 2]),
                {"cmd": 2006, "sid": "401", "d1": "x", "d2": 2, "d3": 2},
                round_entry("402", [2, 2, 2]),
            ]}),
        )
        .await;

        let store = Arc::new(HistoryStore::new(10));
        let (poller, _) = poller_for(&server, store.clone());

        let err = poller.poll_once().await.unwrap_err();
        assert_eq!(err.kind(), "shape");

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.data[0].session_id, SessionId::from("400"));
    }

    #[tokio::test]
    async fn test_overflowing_dice_do_not_stop_the_loop() {
        let server = MockServer::start().await;
        serve(
            &server,
            json!({"status": "OK", "data": [
                round_entry("600", [1, 1, 1]),
                {"cmd": 2006, "sid": "601", "d1": i64::MAX, "d2": 1, "d3": 1},
            ]}),
        )
        .await;

        let store = Arc::new(HistoryStore::new(10));
        let (poller, status) = poller_for(&server, store.clone());
        let handle = poller.spawn();

        let mut retried = false;
        for _ in 0..200 {
            if status.read().await.consecutive_failures >= 3 {
                retried = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!handle.is_finished(), "poll task must survive bad dice");
        handle.abort();
        assert!(retried, "poller should keep cycling after an overflowing round");

        let status = status.read().await;
        assert_eq!(status.state(), "degraded");
        assert_eq!(status.last_error_kind, Some("shape"));
        assert_eq!(store.len().await, 1);
        assert_eq!(store.last_session().await, Some(SessionId::from("600")));
    }

    #[tokio::test]
    async fn test_run_loop_recovers_after_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = Arc::new(HistoryStore::new(10));
        let (poller, status) = poller_for(&server, store.clone());
        let handle = poller.spawn();

        let mut degraded = false;
        for _ in 0..200 {
            if status.read().await.consecutive_failures >= 2 {
                degraded = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(degraded, "poller should keep retrying after failures");
        assert_eq!(status.read().await.state(), "degraded");
        assert_eq!(status.read().await.last_error_kind, Some("status"));

        serve(
            &server,
            json!({"status": "OK", "data": [round_entry("500", [6, 5, 4])]}),
        )
        .await;

        let mut recovered = false;
        for _ in 0..200 {
            if store.len().await == 1 && status.read().await.state() == "ok" {
                recovered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert!(recovered, "poller should resume committing rounds");
        assert_eq!(store.len().await, 1);
        assert!(status.read().await.last_success_at.is_some());
    }

    #[test]
    fn test_flat_retry_delay() {
        let retry = RetryPolicy::flat(Duration::from_secs(5));
        assert_eq!(retry.delay(1), Duration::from_secs(5));
        assert_eq!(retry.delay(50), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_retry_delay_is_capped() {
        let retry = RetryPolicy {
            base: Duration::from_secs(1),
            max: Some(Duration::from_secs(30)),
        };
        for failures in 1..40 {
            let delay = retry.delay(failures);
            assert!(delay <= Duration::from_secs(30), "{failures}: {delay:?}");
        }

        let first = retry.delay(1);
        assert!(first >= Duration::from_millis(500) && first <= Duration::from_secs(1));

        let late = retry.delay(30);
        assert!(late >= Duration::from_secs(15));
    }

    #[test]
    fn test_status_state_transitions() {
        let mut status = PollStatus::default();
        assert_eq!(status.state(), "starting");

        status.record_failure(&PollError::Shape("bad".to_string()));
        assert_eq!(status.state(), "degraded");
        assert_eq!(status.consecutive_failures, 1);

        status.record_success();
        assert_eq!(status.state(), "ok");
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.cycles, 2);
        assert_eq!(status.last_error_kind, Some("shape"));
    }
}

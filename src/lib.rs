//! TaiXiu round-result feed.
//!
//! Polls the upstream notify endpoint in the background, keeps a bounded
//! history of accepted rounds and serves it over HTTP. The binary wires these
//! pieces together; the library exposes them for embedding and tests.

pub mod api;
pub mod config;
pub mod history;
pub mod poller;
pub mod round;
pub mod upstream;

pub use config::Config;
pub use history::{HistorySnapshot, HistoryStore};
pub use poller::{Poller, PollStatus, SharedPollStatus};
pub use round::{Outcome, RoundResult, SessionId};

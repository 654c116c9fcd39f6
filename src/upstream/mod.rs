//! Upstream round-result feed.
//!
//! Provides the HTTP client for the notify endpoint and the decoding of its
//! envelope into raw round entries.

mod client;
mod error;
mod types;

pub use client::UpstreamClient;
pub use error::{PollError, PollResult};
pub use types::*;

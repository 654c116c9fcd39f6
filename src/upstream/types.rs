//! Decoding of the upstream notify envelope.

use serde_json::Value;

use super::error::{PollError, PollResult};
use crate::round::{RoundResult, SessionId};

/// `cmd` value of a round-result event.
pub const ROUND_RESULT_CMD: i64 = 2006;

/// Fields that may carry the checksum token, in precedence order.
pub const CHECKSUM_FIELDS: [&str; 3] = ["hash", "md5", "code"];

const ENVELOPE_OK: &str = "OK";

/// Entries of an envelope whose `status` is `"OK"` and whose `data` is a list.
///
/// Returns `Ok(None)` for any other well-formed envelope; those are skipped, not
/// treated as failures. A body that is not a JSON object is a shape error.
pub fn envelope_entries(envelope: &Value) -> PollResult<Option<&[Value]>> {
    let object = envelope.as_object().ok_or_else(|| {
        PollError::Shape(format!("envelope is {}, expected object", json_type(envelope)))
    })?;

    if object.get("status").and_then(Value::as_str) != Some(ENVELOPE_OK) {
        return Ok(None);
    }

    Ok(object.get("data").and_then(Value::as_array).map(Vec::as_slice))
}

/// A round-result entry as read from the feed, before the acceptance gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRound {
    pub session_id: Option<SessionId>,
    pub dice: [Option<i64>; 3],
    pub checksum: Option<String>,
}

impl RawRound {
    /// Read one `data` entry.
    ///
    /// Returns `Ok(None)` for entries that are not round results. Fails with a
    /// shape error if the entry is not an object or a die is present but not an
    /// integer.
    pub fn from_entry(entry: &Value) -> PollResult<Option<Self>> {
        let object = entry.as_object().ok_or_else(|| {
            PollError::Shape(format!("data entry is {}, expected object", json_type(entry)))
        })?;

        if object.get("cmd").and_then(Value::as_i64) != Some(ROUND_RESULT_CMD) {
            return Ok(None);
        }

        let session_id = object.get("sid").and_then(SessionId::from_json);
        let dice = [
            read_die(object.get("d1"), "d1")?,
            read_die(object.get("d2"), "d2")?,
            read_die(object.get("d3"), "d3")?,
        ];
        let checksum = CHECKSUM_FIELDS
            .iter()
            .find_map(|field| object.get(*field).and_then(checksum_token));

        Ok(Some(Self {
            session_id,
            dice,
            checksum,
        }))
    }

    /// Stateless half of the acceptance gate: a non-empty session id and all
    /// three dice. The dedup half is applied by the history store.
    ///
    /// Returns `Ok(None)` for entries the gate skips. Dice whose total does not
    /// fit in an `i64` are a shape error.
    pub fn into_result(self, source_tag: &str) -> PollResult<Option<RoundResult>> {
        let Some(session_id) = self.session_id.filter(|sid| !sid.is_empty()) else {
            return Ok(None);
        };
        let [Some(d1), Some(d2), Some(d3)] = self.dice else {
            return Ok(None);
        };

        RoundResult::new(session_id.clone(), [d1, d2, d3], self.checksum, source_tag)
            .map(Some)
            .ok_or_else(|| {
                PollError::Shape(format!(
                    "dice total of round {session_id} overflows ({d1}, {d2}, {d3})"
                ))
            })
    }
}

fn read_die(value: Option<&Value>, field: &str) -> PollResult<Option<i64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| {
            PollError::Shape(format!("{field} is {}, expected integer", json_type(v)))
        }),
    }
}

fn checksum_token(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

//! Round result model and the Low/High classification.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Highest dice total still classified as [`Outcome::Low`].
pub const LOW_MAX_TOTAL: i64 = 10;

/// Opaque identifier of a single round.
///
/// The upstream feed is not consistent about whether `sid` is a string or a
/// number, so both are kept and re-serialized in the JSON form they arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionId {
    Number(Number),
    Text(String),
}

impl SessionId {
    /// Read a session id from a raw JSON value.
    ///
    /// Returns `None` for null and for JSON types that cannot identify a round.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(SessionId::Text(s.clone())),
            Value::Number(n) => Some(SessionId::Number(n.clone())),
            _ => None,
        }
    }

    /// An empty string or a zero id never identifies a round.
    pub fn is_empty(&self) -> bool {
        match self {
            SessionId::Number(n) => n.as_f64() == Some(0.0),
            SessionId::Text(s) => s.is_empty(),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionId::Number(n) => write!(f, "{n}"),
            SessionId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        SessionId::Text(value.to_string())
    }
}

impl From<i64> for SessionId {
    fn from(value: i64) -> Self {
        SessionId::Number(Number::from(value))
    }
}

/// Classification of a round by its dice total.
///
/// Serialized with the labels existing consumers of the feed expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "Xỉu")]
    Low,
    #[serde(rename = "Tài")]
    High,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Low => "Xỉu",
            Outcome::High => "Tài",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sum three dice and classify the total.
///
/// Dice are not range checked, so the sum can overflow; that yields `None`.
pub fn classify(d1: i64, d2: i64, d3: i64) -> Option<(i64, Outcome)> {
    let total = d1.checked_add(d2)?.checked_add(d3)?;
    let outcome = if total <= LOW_MAX_TOTAL {
        Outcome::Low
    } else {
        Outcome::High
    };
    Some((total, outcome))
}

/// One accepted round, as stored in history and returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    #[serde(rename = "Phien")]
    pub session_id: SessionId,
    #[serde(rename = "Xuc_xac_1")]
    pub die_1: i64,
    #[serde(rename = "Xuc_xac_2")]
    pub die_2: i64,
    #[serde(rename = "Xuc_xac_3")]
    pub die_3: i64,
    #[serde(rename = "Tong")]
    pub total: i64,
    #[serde(rename = "Ket_qua")]
    pub outcome: Outcome,
    #[serde(rename = "Ma_MD5")]
    pub checksum: Option<String>,
    #[serde(rename = "id")]
    pub source_tag: String,
}

impl RoundResult {
    /// Build a record from a round's dice. `None` if the dice total overflows.
    pub fn new(
        session_id: SessionId,
        dice: [i64; 3],
        checksum: Option<String>,
        source_tag: impl Into<String>,
    ) -> Option<Self> {
        let [die_1, die_2, die_3] = dice;
        let (total, outcome) = classify(die_1, die_2, die_3)?;
        Some(Self {
            session_id,
            die_1,
            die_2,
            die_3,
            total,
            outcome,
            checksum,
            source_tag: source_tag.into(),
        })
    }
}

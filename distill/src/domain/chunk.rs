// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Session chunks and quality scores
//!
//! A chunk is created by the (external) embedding step with
//! `pending_score = true`. Only the quality scorer mutates it afterwards.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::filter::{Payload, VectorRecord};

/// Payload field names shared with the embedding step
pub mod fields {
    pub const SESSION_ID: &str = "session_id";
    pub const TEXT: &str = "text";
    pub const QUALITY_SCORE: &str = "quality_score";
    pub const PENDING_SCORE: &str = "pending_score";
    pub const SESSION_DATE: &str = "session_date";
    pub const SCORED_AT: &str = "scored_at";
}

pub const MAX_QUALITY_SCORE: u8 = 10;

/// Integer quality rating in `0..=10`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualityScore(u8);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoreParseError {
    #[error("no integer found in response: {0:?}")]
    NoInteger(String),
    #[error("score {0} is outside 0..=10")]
    OutOfRange(i64),
    #[error("score {0} is not an integer")]
    NotInteger(String),
    #[error("response names more than one candidate score: {0:?}")]
    Ambiguous(Vec<String>),
}

/// A numeric token, optionally followed by a "/10" or "out of 10" scale
static SCORE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(-?\d+(?:\.\d+)?)(?:\s*(?:/|out\s+of)\s*10\b)?").expect("score regex is valid")
});

impl QualityScore {
    pub fn new(value: i64) -> Result<Self, ScoreParseError> {
        if (0..=MAX_QUALITY_SCORE as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ScoreParseError::OutOfRange(value))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Parse a generation response into a score.
    ///
    /// Accepts a response that names exactly one value ("7", "Score: 7",
    /// "7/10", "7 out of 10"). A "/10" scale is not a competing value, and a
    /// repeated identical value is fine. Any other number makes the response
    /// ambiguous. Decimals and values outside the range are rejected rather
    /// than rounded or clamped.
    pub fn parse_response(response: &str) -> Result<Self, ScoreParseError> {
        let mut tokens: Vec<&str> = SCORE_TOKEN
            .captures_iter(response)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect();
        tokens.sort_unstable();
        tokens.dedup();

        let token = match tokens.as_slice() {
            [] => {
                return Err(ScoreParseError::NoInteger(
                    response.trim().chars().take(80).collect(),
                ))
            }
            [token] => *token,
            many => return Err(ScoreParseError::Ambiguous(many.iter().map(|t| t.to_string()).collect())),
        };

        if token.contains('.') {
            return Err(ScoreParseError::NotInteger(token.to_string()));
        }

        let value: i64 = token
            .parse()
            .map_err(|_| ScoreParseError::NotInteger(token.to_string()))?;
        Self::new(value)
    }
}

/// Where a scored chunk falls for contrastive mining
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    High,
    Low,
    Neutral,
}

impl ScoreBand {
    pub fn classify(score: QualityScore, high_threshold: u8, low_threshold: u8) -> Self {
        if score.value() >= high_threshold {
            ScoreBand::High
        } else if score.value() <= low_threshold {
            ScoreBand::Low
        } else {
            ScoreBand::Neutral
        }
    }
}

/// A bounded transcript span. The embedding vector stays in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionChunk {
    pub id: String,
    pub session_id: String,
    pub text: String,
    pub quality_score: Option<QualityScore>,
    pub pending_score: bool,
    pub session_date: DateTime<Utc>,
    pub scored_at: Option<DateTime<Utc>>,
}

impl SessionChunk {
    /// A freshly embedded chunk, as the capture step writes it
    pub fn pending(
        id: impl Into<String>,
        session_id: impl Into<String>,
        text: impl Into<String>,
        session_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            text: text.into(),
            quality_score: None,
            pending_score: true,
            session_date,
            scored_at: None,
        }
    }

    pub fn from_record(record: &VectorRecord) -> Result<Self> {
        let p = &record.payload;
        let session_id = p
            .get(fields::SESSION_ID)
            .and_then(Value::as_str)
            .with_context(|| format!("chunk {} missing {}", record.id, fields::SESSION_ID))?
            .to_string();
        let text = p
            .get(fields::TEXT)
            .and_then(Value::as_str)
            .with_context(|| format!("chunk {} missing {}", record.id, fields::TEXT))?
            .to_string();
        let quality_score = match p.get(fields::QUALITY_SCORE).and_then(Value::as_i64) {
            Some(v) => Some(QualityScore::new(v).with_context(|| format!("chunk {}", record.id))?),
            None => None,
        };
        let pending_score = p
            .get(fields::PENDING_SCORE)
            .and_then(Value::as_bool)
            .unwrap_or(quality_score.is_none());
        let session_date = p
            .get(fields::SESSION_DATE)
            .and_then(Value::as_i64)
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_default();
        let scored_at = p
            .get(fields::SCORED_AT)
            .and_then(Value::as_i64)
            .and_then(|ts| DateTime::from_timestamp(ts, 0));

        Ok(Self {
            id: record.id.clone(),
            session_id,
            text,
            quality_score,
            pending_score,
            session_date,
            scored_at,
        })
    }

    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert(fields::SESSION_ID.into(), self.session_id.clone().into());
        payload.insert(fields::TEXT.into(), self.text.clone().into());
        payload.insert(fields::PENDING_SCORE.into(), self.pending_score.into());
        payload.insert(fields::SESSION_DATE.into(), self.session_date.timestamp().into());
        if let Some(score) = self.quality_score {
            payload.insert(fields::QUALITY_SCORE.into(), (score.value() as i64).into());
        }
        if let Some(at) = self.scored_at {
            payload.insert(fields::SCORED_AT.into(), at.timestamp().into());
        }
        payload
    }

    /// Payload patch written when a score is accepted
    pub fn score_patch(score: QualityScore, now: DateTime<Utc>) -> Payload {
        let mut patch = Payload::new();
        patch.insert(fields::QUALITY_SCORE.into(), (score.value() as i64).into());
        patch.insert(fields::PENDING_SCORE.into(), false.into());
        patch.insert(fields::SCORED_AT.into(), now.timestamp().into());
        patch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_decorated_scores() {
        assert_eq!(QualityScore::parse_response("7").unwrap().value(), 7);
        assert_eq!(QualityScore::parse_response("  Score: 10\n").unwrap().value(), 10);
        assert_eq!(QualityScore::parse_response("3/10 - mostly noise").unwrap().value(), 3);
        assert_eq!(QualityScore::parse_response("0").unwrap().value(), 0);
        assert_eq!(QualityScore::parse_response("Score: 8 out of 10").unwrap().value(), 8);
        assert_eq!(QualityScore::parse_response("6. Final answer: 6").unwrap().value(), 6);
    }

    #[test]
    fn test_parse_rejects_competing_numbers() {
        assert!(matches!(
            QualityScore::parse_response("On a scale of 0 to 10, I would rate this excerpt a 7."),
            Err(ScoreParseError::Ambiguous(_))
        ));
        assert!(matches!(
            QualityScore::parse_response("7\n\nThe excerpt fixes 3 failing tests."),
            Err(ScoreParseError::Ambiguous(_))
        ));
        assert!(matches!(
            QualityScore::parse_response("Somewhere between 4 and 5"),
            Err(ScoreParseError::Ambiguous(_))
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            QualityScore::parse_response("I cannot rate this"),
            Err(ScoreParseError::NoInteger(_))
        ));
        assert_eq!(QualityScore::parse_response("11"), Err(ScoreParseError::OutOfRange(11)));
        assert_eq!(QualityScore::parse_response("-2"), Err(ScoreParseError::OutOfRange(-2)));
        assert!(matches!(
            QualityScore::parse_response("7.5"),
            Err(ScoreParseError::NotInteger(_))
        ));
    }

    #[test]
    fn test_score_band_boundaries() {
        let band = |v| ScoreBand::classify(QualityScore::new(v).unwrap(), 7, 3);
        assert_eq!(band(7), ScoreBand::High);
        assert_eq!(band(3), ScoreBand::Low);
        assert_eq!(band(4), ScoreBand::Neutral);
        assert_eq!(band(6), ScoreBand::Neutral);
    }

    #[test]
    fn test_record_roundtrip_keeps_pending_state() {
        let chunk = SessionChunk::pending("c1", "s1", "ran cargo test", Utc::now());
        let record = VectorRecord {
            id: chunk.id.clone(),
            payload: chunk.to_payload(),
            vector: None,
        };

        let parsed = SessionChunk::from_record(&record).unwrap();
        assert!(parsed.pending_score);
        assert_eq!(parsed.quality_score, None);
        assert_eq!(parsed.session_id, "s1");
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Failure signals and reflections
//!
//! A reflection is keyed by `(session_id, failure_index)`. Its id is a
//! UUIDv5 of that key, so re-processing a session overwrites instead of
//! duplicating.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::filter::Payload;

/// Namespace for deterministic reflection ids
const REFLECTION_NAMESPACE: Uuid = Uuid::from_u128(0x6d1c_4a6e_93f1_4c55_8a9e_2b7d_0c3e_5f10);

/// Raw session transcript as handed to failure detection
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub session_id: String,
    pub date: DateTime<Utc>,
    pub content: String,
}

/// Output of the failure classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSignal {
    #[serde(rename = "type")]
    pub failure_type: String,
    pub description: String,
    pub context: String,
}

/// The three fields parsed from one `FAILURE N:` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReflection {
    pub root_cause: String,
    pub reflection: String,
    pub prevention_rule: String,
}

pub mod fields {
    pub const SESSION_ID: &str = "session_id";
    pub const FAILURE_INDEX: &str = "failure_index";
    pub const FAILURE_TYPE: &str = "failure_type";
    pub const FAILURE_DESCRIPTION: &str = "failure_description";
    pub const ROOT_CAUSE: &str = "root_cause";
    pub const REFLECTION_TEXT: &str = "reflection_text";
    pub const PREVENTION_RULE: &str = "prevention_rule";
    pub const QUALITY_SCORE: &str = "quality_score";
    pub const DATE: &str = "date";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub id: Uuid,
    pub session_id: String,
    pub failure_index: usize,
    pub date: DateTime<Utc>,
    pub failure_type: String,
    pub failure_description: String,
    pub root_cause: String,
    pub reflection_text: String,
    pub prevention_rule: String,
    pub quality_score: u8,
}

impl Reflection {
    pub fn id_for(session_id: &str, failure_index: usize) -> Uuid {
        Uuid::new_v5(&REFLECTION_NAMESPACE, format!("{}:{}", session_id, failure_index).as_bytes())
    }

    pub fn new(
        session_id: &str,
        failure_index: usize,
        failure: &FailureSignal,
        parsed: ParsedReflection,
        date: DateTime<Utc>,
    ) -> Self {
        let quality_score = assess_quality(&parsed);
        Self {
            id: Self::id_for(session_id, failure_index),
            session_id: session_id.to_string(),
            failure_index,
            date,
            failure_type: failure.failure_type.clone(),
            failure_description: failure.description.clone(),
            root_cause: parsed.root_cause,
            reflection_text: parsed.reflection,
            prevention_rule: parsed.prevention_rule,
            quality_score,
        }
    }

    /// Canonical text that gets embedded
    pub fn summary(&self) -> String {
        format!(
            "Failure: {}\nRoot cause: {}\nReflection: {}\nPrevention: {}",
            self.failure_description, self.root_cause, self.reflection_text, self.prevention_rule
        )
    }

    pub fn to_payload(&self) -> Payload {
        let mut p = Payload::new();
        p.insert(fields::SESSION_ID.into(), self.session_id.clone().into());
        p.insert(fields::FAILURE_INDEX.into(), (self.failure_index as i64).into());
        p.insert(fields::FAILURE_TYPE.into(), self.failure_type.clone().into());
        p.insert(fields::FAILURE_DESCRIPTION.into(), self.failure_description.clone().into());
        p.insert(fields::ROOT_CAUSE.into(), self.root_cause.clone().into());
        p.insert(fields::REFLECTION_TEXT.into(), self.reflection_text.clone().into());
        p.insert(fields::PREVENTION_RULE.into(), self.prevention_rule.clone().into());
        p.insert(fields::QUALITY_SCORE.into(), (self.quality_score as i64).into());
        p.insert(fields::DATE.into(), self.date.timestamp().into());
        p
    }
}

/// Structural completeness score, 0–10.
///
/// Root cause and reflection are worth 3 points each, a prevention rule 2,
/// and a rule of usable length (10..200 chars) 2 more.
pub fn assess_quality(parsed: &ParsedReflection) -> u8 {
    let mut score = 0;
    if !parsed.root_cause.trim().is_empty() {
        score += 3;
    }
    if !parsed.reflection.trim().is_empty() {
        score += 3;
    }
    let rule_len = parsed.prevention_rule.trim().chars().count();
    if rule_len > 0 {
        score += 2;
    }
    if (10..200).contains(&rule_len) {
        score += 2;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(rule: &str) -> ParsedReflection {
        ParsedReflection {
            root_cause: "Assumed the module existed".into(),
            reflection: "Should have listed the directory first".into(),
            prevention_rule: rule.into(),
        }
    }

    #[test]
    fn test_id_is_deterministic_per_session_and_index() {
        assert_eq!(Reflection::id_for("s1", 1), Reflection::id_for("s1", 1));
        assert_ne!(Reflection::id_for("s1", 1), Reflection::id_for("s1", 2));
        assert_ne!(Reflection::id_for("s1", 1), Reflection::id_for("s2", 1));
    }

    #[test]
    fn test_quality_assessment() {
        assert_eq!(assess_quality(&parsed("Verify a path exists before importing from it")), 10);
        assert_eq!(assess_quality(&parsed("")), 6);
        assert_eq!(assess_quality(&parsed("Check")), 8);
    }

    #[test]
    fn test_summary_mentions_every_field() {
        let failure = FailureSignal {
            failure_type: "tool_error".into(),
            description: "ImportError on utils".into(),
            context: "".into(),
        };
        let reflection = Reflection::new("s1", 1, &failure, parsed("Verify paths first"), Utc::now());
        let summary = reflection.summary();
        assert!(summary.contains("ImportError on utils"));
        assert!(summary.contains("Assumed the module existed"));
        assert!(summary.contains("Verify paths first"));
    }
}

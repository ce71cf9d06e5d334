// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain model for the distillation bounded context
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Aggregates, value objects, events and provider contracts

pub mod chunk;
pub mod commit;
pub mod config;
pub mod embedding;
pub mod error;
pub mod events;
pub mod filter;
pub mod job;
pub mod llm;
pub mod reflection;
pub mod rule;

pub use chunk::{QualityScore, ScoreBand, ScoreParseError, SessionChunk, MAX_QUALITY_SCORE};
pub use commit::*;
pub use error::*;
pub use events::*;
pub use filter::*;
pub use job::*;
pub use reflection::{assess_quality, FailureSignal, ParsedReflection, Reflection, Transcript};
pub use rule::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_field_names_resolve_per_record_kind() {
        assert_eq!(chunk::fields::QUALITY_SCORE, "quality_score");
        assert_eq!(chunk::fields::PENDING_SCORE, "pending_score");
        assert_eq!(reflection::fields::QUALITY_SCORE, "quality_score");
        assert_eq!(reflection::fields::PREVENTION_RULE, "prevention_rule");

        let score = QualityScore::new(MAX_QUALITY_SCORE as i64).unwrap();
        assert_eq!(score.value(), MAX_QUALITY_SCORE);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application services for the distillation pipeline
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrates scoring, mining, reflection and the rule
//!   lifecycle over the repository and provider contracts

pub mod event_bus;
pub mod insight_extractor;
pub mod job_runner;
pub mod prompts;
pub mod quality_scorer;
pub mod reflection_generator;
pub mod reinforcement_tracker;
pub mod rule_manager;

pub use event_bus::EventBus;
pub use insight_extractor::{ExtractorSettings, InsightExtractor, InsightReport, InsightStatus};
pub use job_runner::{JobPayload, JobRunReport, JobRunner, PipelineServices};
pub use quality_scorer::{QualityScorer, ScoreReport, ScoreRequest, ScoreSelection, ScorerSettings};
pub use reflection_generator::{FailureDetector, ReflectionGenerator, ReflectionRunReport, ReflectorSettings};
pub use reinforcement_tracker::{ReinforcementStats, ReinforcementTracker};
pub use rule_manager::{
    AddRuleOutcome, AddRuleReason, ApplyReport, PruneReport, RejectOutcome, RevertOutcome, ReviewReport,
    RuleManager, RuleManagerConfig, StatusCounts,
};

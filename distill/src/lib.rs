// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # AEGIS Distill
//!
//! Turns raw session transcripts into durable behavioral rules.
//!
//! The pipeline runs as short-lived batch invocations:
//!
//! 1. [`application::QualityScorer`] rates pending chunks 0–10.
//! 2. [`application::InsightExtractor`] contrasts high and low scoring chunks
//!    and mines candidate rules.
//! 3. [`application::ReflectionGenerator`] turns detected failures into
//!    root-cause reflections and prevention rules.
//! 4. [`application::RuleManager`] owns dedup, capacity, proposal and pruning.
//! 5. [`application::ReinforcementTracker`] records usage signals.
//!
//! All durable state lives in the vector store and the rule store; every
//! transition is a conditional update so independent invocations converge.
//!
//! # Architecture
//!
//! - **Layer:** Learning & Memory Layer
//! - **Purpose:** Rule distillation bounded context

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;

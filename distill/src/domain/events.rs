// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain events for the distillation bounded context
//! Published to the EventBus for operator output and audit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::commit::CommitId;
use super::rule::{OriginType, RuleId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistillEvent {
    // Quality scoring

    /// A pending chunk received a valid score
    ChunkScored {
        chunk_id: String,
        score: u8,
        timestamp: DateTime<Utc>,
    },

    /// The generation response could not be used; the chunk stays pending
    ChunkScoreSkipped {
        chunk_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // Insight extraction

    /// One batch of contrastive pairs was mined
    InsightBatchCompleted {
        batch_index: usize,
        pairs: usize,
        candidates: usize,
        timestamp: DateTime<Utc>,
    },

    /// A batch call failed and was skipped
    InsightBatchFailed {
        batch_index: usize,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // Reflections

    ReflectionStored {
        reflection_id: uuid::Uuid,
        session_id: String,
        failure_index: usize,
        timestamp: DateTime<Utc>,
    },

    /// No parsable block for this failure, or storing it failed
    ReflectionDropped {
        session_id: String,
        failure_index: usize,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // Rule lifecycle

    RuleAdded {
        rule_id: RuleId,
        commit_id: CommitId,
        origin: OriginType,
        status: String,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// Valid rule with no free active slot, staged as proposed
    RuleStagedForCapacity {
        rule_id: RuleId,
        commit_id: CommitId,
        timestamp: DateTime<Utc>,
    },

    RuleDuplicateRejected {
        text: String,
        existing_rule_id: RuleId,
        timestamp: DateTime<Utc>,
    },

    ProposalsApplied {
        commit_id: CommitId,
        applied: usize,
        deferred: usize,
        timestamp: DateTime<Utc>,
    },

    ProposalRejected {
        rule_id: RuleId,
        commit_id: CommitId,
        timestamp: DateTime<Utc>,
    },

    RulesPruned {
        commit_id: CommitId,
        rule_ids: Vec<RuleId>,
        staleness_days: i64,
        timestamp: DateTime<Utc>,
    },

    RuleReinforced {
        rule_id: RuleId,
        reinforcement_count: u64,
        signal: String,
        timestamp: DateTime<Utc>,
    },

    CommitReverted {
        reverted: CommitId,
        commit_id: CommitId,
        timestamp: DateTime<Utc>,
    },
}

impl DistillEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DistillEvent::ChunkScored { timestamp, .. } => *timestamp,
            DistillEvent::ChunkScoreSkipped { timestamp, .. } => *timestamp,
            DistillEvent::InsightBatchCompleted { timestamp, .. } => *timestamp,
            DistillEvent::InsightBatchFailed { timestamp, .. } => *timestamp,
            DistillEvent::ReflectionStored { timestamp, .. } => *timestamp,
            DistillEvent::ReflectionDropped { timestamp, .. } => *timestamp,
            DistillEvent::RuleAdded { timestamp, .. } => *timestamp,
            DistillEvent::RuleStagedForCapacity { timestamp, .. } => *timestamp,
            DistillEvent::RuleDuplicateRejected { timestamp, .. } => *timestamp,
            DistillEvent::ProposalsApplied { timestamp, .. } => *timestamp,
            DistillEvent::ProposalRejected { timestamp, .. } => *timestamp,
            DistillEvent::RulesPruned { timestamp, .. } => *timestamp,
            DistillEvent::RuleReinforced { timestamp, .. } => *timestamp,
            DistillEvent::CommitReverted { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            DistillEvent::ChunkScored { .. } => "chunk_scored",
            DistillEvent::ChunkScoreSkipped { .. } => "chunk_score_skipped",
            DistillEvent::InsightBatchCompleted { .. } => "insight_batch_completed",
            DistillEvent::InsightBatchFailed { .. } => "insight_batch_failed",
            DistillEvent::ReflectionStored { .. } => "reflection_stored",
            DistillEvent::ReflectionDropped { .. } => "reflection_dropped",
            DistillEvent::RuleAdded { .. } => "rule_added",
            DistillEvent::RuleStagedForCapacity { .. } => "rule_staged_for_capacity",
            DistillEvent::RuleDuplicateRejected { .. } => "rule_duplicate_rejected",
            DistillEvent::ProposalsApplied { .. } => "proposals_applied",
            DistillEvent::ProposalRejected { .. } => "proposal_rejected",
            DistillEvent::RulesPruned { .. } => "rules_pruned",
            DistillEvent::RuleReinforced { .. } => "rule_reinforced",
            DistillEvent::CommitReverted { .. } => "commit_reverted",
        }
    }

    /// One-line operator summary
    pub fn describe(&self) -> String {
        match self {
            DistillEvent::ChunkScored { chunk_id, score, .. } => format!("scored {} = {}", chunk_id, score),
            DistillEvent::ChunkScoreSkipped { chunk_id, reason, .. } => {
                format!("skipped {} ({})", chunk_id, reason)
            }
            DistillEvent::InsightBatchCompleted { batch_index, pairs, candidates, .. } => {
                format!("batch {}: {} pairs -> {} candidates", batch_index, pairs, candidates)
            }
            DistillEvent::InsightBatchFailed { batch_index, reason, .. } => {
                format!("batch {} failed: {}", batch_index, reason)
            }
            DistillEvent::ReflectionStored { session_id, failure_index, .. } => {
                format!("reflection stored for {} failure {}", session_id, failure_index)
            }
            DistillEvent::ReflectionDropped { session_id, failure_index, reason, .. } => {
                format!("reflection dropped for {} failure {}: {}", session_id, failure_index, reason)
            }
            DistillEvent::RuleAdded { status, text, origin, .. } => {
                format!("{} rule [{}]: {}", status, origin, text)
            }
            DistillEvent::RuleStagedForCapacity { rule_id, .. } => {
                format!("rule {} staged as proposed (capacity)", rule_id)
            }
            DistillEvent::RuleDuplicateRejected { text, existing_rule_id, .. } => {
                format!("duplicate of {}: {}", existing_rule_id, text)
            }
            DistillEvent::ProposalsApplied { applied, deferred, .. } => {
                format!("applied {} proposals ({} deferred)", applied, deferred)
            }
            DistillEvent::ProposalRejected { rule_id, .. } => format!("rejected proposal {}", rule_id),
            DistillEvent::RulesPruned { rule_ids, .. } => format!("pruned {} stale rules", rule_ids.len()),
            DistillEvent::RuleReinforced { rule_id, reinforcement_count, .. } => {
                format!("reinforced {} (count {})", rule_id, reinforcement_count)
            }
            DistillEvent::CommitReverted { reverted, commit_id, .. } => {
                format!("reverted {} as {}", reverted, commit_id)
            }
        }
    }
}

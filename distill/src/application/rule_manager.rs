// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # RuleManager - Rule Lifecycle Authority
//!
//! Sole writer of the rule store. Every other component hands it
//! [`RuleCandidate`]s or rule ids; it decides dedup, capacity and status.
//!
//! ## Invariants (checked again by the store on every commit)
//!
//! - No two active or proposed rules share normalized text.
//! - No mutation grows `count(active)` past `max_active`.
//!
//! ## Concurrency
//!
//! Writes are optimistic: load the document, plan the change, commit against
//! the loaded version. On a version conflict the plan is recomputed from a
//! fresh document, so dedup and capacity are always judged against the state
//! the commit lands on.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::EventBus;
use crate::domain::config::{DistillConfig, OperatingMode};
use crate::domain::{
    normalize_text, token_similarity, CommitId, DistillEvent, Rule, RuleCandidate, RuleChange,
    RuleCommit, RuleDocument, RuleId, RuleStatus, MAX_ACTIVE_RULES,
};
use crate::infrastructure::repository::{RuleStore, RuleStoreError};

#[derive(Debug, Clone)]
pub struct RuleManagerConfig {
    pub mode: OperatingMode,
    pub max_active: usize,
    pub staleness_days: i64,
    pub min_reinforcement: u64,
    /// Token-overlap ratio treated as a duplicate
    pub similarity_threshold: f64,
    pub commit_retries: u32,
}

impl Default for RuleManagerConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::Supervised,
            max_active: MAX_ACTIVE_RULES,
            staleness_days: 60,
            min_reinforcement: 1,
            similarity_threshold: 0.8,
            commit_retries: 5,
        }
    }
}

impl RuleManagerConfig {
    pub fn from_config(config: &DistillConfig) -> Self {
        Self {
            mode: config.mode,
            max_active: config.rules.max_active,
            staleness_days: config.rules.staleness_days,
            min_reinforcement: config.rules.min_reinforcement,
            similarity_threshold: config.rules.similarity_threshold,
            commit_retries: config.rules.commit_retries,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddRuleReason {
    Activated,
    Proposed,
    /// Valid but no active slot left; staged as proposed
    Capacity,
    Duplicate,
    Empty,
    DryRun,
}

impl AddRuleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddRuleReason::Activated => "activated",
            AddRuleReason::Proposed => "proposed",
            AddRuleReason::Capacity => "capacity",
            AddRuleReason::Duplicate => "duplicate",
            AddRuleReason::Empty => "empty",
            AddRuleReason::DryRun => "dry_run",
        }
    }
}

impl fmt::Display for AddRuleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `applied` is true when the rule was written, active or proposed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddRuleOutcome {
    pub applied: bool,
    pub reason: AddRuleReason,
    pub rule_id: Option<RuleId>,
    pub commit_id: Option<CommitId>,
    pub duplicate_of: Option<RuleId>,
}

impl AddRuleOutcome {
    fn skipped(reason: AddRuleReason) -> Self {
        Self {
            applied: false,
            reason,
            rule_id: None,
            commit_id: None,
            duplicate_of: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub commit_id: Option<CommitId>,
    pub applied: Vec<RuleId>,
    /// Proposals left waiting for a free active slot
    pub deferred: Vec<RuleId>,
    /// Selected ids that are not pending proposals
    pub unknown: Vec<RuleId>,
    /// Manual mode was asked to apply without an explicit selection
    pub selection_required: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub commit_id: Option<CommitId>,
    pub pruned: Vec<RuleId>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub proposed: usize,
    pub active: usize,
    pub pruned: usize,
}

impl StatusCounts {
    pub fn of(document: &RuleDocument) -> Self {
        Self {
            proposed: document.count(RuleStatus::Proposed),
            active: document.count(RuleStatus::Active),
            pruned: document.count(RuleStatus::Pruned),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewReport {
    pub counts: StatusCounts,
    pub capacity: usize,
    /// Oldest first, the order `apply` activates them in
    pub proposals: Vec<Rule>,
    pub stale_candidates: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectOutcome {
    Rejected(CommitId),
    NotFound,
    NotProposed(RuleStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RevertOutcome {
    Reverted(CommitId),
    /// These rules changed after the target commit; nothing was written
    Conflict(Vec<RuleId>),
    /// The restored state would break a rule store invariant
    Rejected(String),
}

/// Result of planning against one document snapshot
struct Planned<T> {
    outcome: T,
    commit: Option<(String, Vec<RuleChange>)>,
}

impl<T> Planned<T> {
    fn done(outcome: T) -> Self {
        Self { outcome, commit: None }
    }

    fn commit(outcome: T, message: String, changes: Vec<RuleChange>) -> Self {
        Self {
            outcome,
            commit: Some((message, changes)),
        }
    }
}

pub struct RuleManager {
    store: Arc<dyn RuleStore>,
    event_bus: Arc<dyn EventBus>,
    config: RuleManagerConfig,
}

impl RuleManager {
    pub fn new(store: Arc<dyn RuleStore>, event_bus: Arc<dyn EventBus>, config: RuleManagerConfig) -> Self {
        Self {
            store,
            event_bus,
            config,
        }
    }

    pub fn config(&self) -> &RuleManagerConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn RuleStore> {
        self.store.clone()
    }

    /// Load, plan, commit; replan on version conflicts
    async fn write_with_retry<T, F>(&self, mut plan: F) -> Result<(T, Option<RuleCommit>)>
    where
        F: FnMut(&RuleDocument, DateTime<Utc>) -> Planned<T> + Send,
        T: Send,
    {
        let attempts = self.config.commit_retries.max(1);
        for attempt in 1..=attempts {
            let document = self.store.load().await.context("Failed to load rule document")?;
            let planned = plan(&document, Utc::now());
            let Some((message, changes)) = planned.commit else {
                return Ok((planned.outcome, None));
            };

            match self.store.commit(document.version, &message, changes).await {
                Ok(commit) => return Ok((planned.outcome, Some(commit))),
                Err(RuleStoreError::VersionConflict { expected, actual }) => {
                    debug!(attempt, expected, actual, "Rule store version conflict, replanning");
                    metrics::counter!("distill_rule_store_conflicts_total").increment(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        anyhow::bail!("Rule store kept changing; gave up after {} attempts", attempts)
    }

    fn find_duplicate<'a>(&self, document: &'a RuleDocument, text: &str) -> Option<&'a Rule> {
        let normalized = normalize_text(text);
        document.live().find(|rule| {
            rule.normalized_text() == normalized
                || token_similarity(&rule.text, text) >= self.config.similarity_threshold
        })
    }

    fn placement(&self, document: &RuleDocument) -> (RuleStatus, AddRuleReason) {
        match self.config.mode {
            OperatingMode::Autonomous if document.active_count() < self.config.max_active => {
                (RuleStatus::Active, AddRuleReason::Activated)
            }
            OperatingMode::Autonomous => (RuleStatus::Proposed, AddRuleReason::Capacity),
            OperatingMode::Supervised | OperatingMode::Manual => (RuleStatus::Proposed, AddRuleReason::Proposed),
        }
    }

    /// Dedup, place by mode and capacity, and persist one candidate
    pub async fn add_rule(&self, candidate: RuleCandidate, dry_run: bool) -> Result<AddRuleOutcome> {
        let text = candidate.text.trim().to_string();
        if text.is_empty() {
            return Ok(AddRuleOutcome::skipped(AddRuleReason::Empty));
        }

        let (mut outcome, commit) = self
            .write_with_retry(|document, now| {
                if let Some(existing) = self.find_duplicate(document, &text) {
                    let mut outcome = AddRuleOutcome::skipped(AddRuleReason::Duplicate);
                    outcome.duplicate_of = Some(existing.id);
                    return Planned::done(outcome);
                }
                if dry_run {
                    return Planned::done(AddRuleOutcome::skipped(AddRuleReason::DryRun));
                }

                let (status, reason) = self.placement(document);
                let rule = Rule::from_candidate(&candidate, status, now);
                let outcome = AddRuleOutcome {
                    applied: true,
                    reason,
                    rule_id: Some(rule.id),
                    commit_id: None,
                    duplicate_of: None,
                };
                let message = format!("add {} rule: {}", status, rule.text);
                Planned::commit(outcome, message, vec![RuleChange::insert(rule)])
            })
            .await?;

        outcome.commit_id = commit.as_ref().map(|c| c.id);
        metrics::counter!("distill_rules_added_total", "reason" => outcome.reason.as_str()).increment(1);

        let now = Utc::now();
        match (outcome.reason, outcome.rule_id, outcome.commit_id) {
            (AddRuleReason::Duplicate, _, _) => {
                debug!(text = %text, "Duplicate rule rejected");
                if let Some(existing_rule_id) = outcome.duplicate_of {
                    self.event_bus
                        .publish(DistillEvent::RuleDuplicateRejected {
                            text: text.clone(),
                            existing_rule_id,
                            timestamp: now,
                        })
                        .await?;
                }
            }
            (AddRuleReason::Capacity, Some(rule_id), Some(commit_id)) => {
                warn!(rule_id = %rule_id, capacity = self.config.max_active, "No active slot left, rule staged as proposed");
                self.event_bus
                    .publish(DistillEvent::RuleStagedForCapacity {
                        rule_id,
                        commit_id,
                        timestamp: now,
                    })
                    .await?;
            }
            (reason, Some(rule_id), Some(commit_id)) => {
                info!(rule_id = %rule_id, reason = %reason, origin = %candidate.origin_type, "Rule added");
                let status = if reason == AddRuleReason::Activated {
                    RuleStatus::Active
                } else {
                    RuleStatus::Proposed
                };
                self.event_bus
                    .publish(DistillEvent::RuleAdded {
                        rule_id,
                        commit_id,
                        origin: candidate.origin_type,
                        status: status.to_string(),
                        text: text.clone(),
                        timestamp: now,
                    })
                    .await?;
            }
            _ => {}
        }

        Ok(outcome)
    }

    /// `proposed → active`, oldest first, up to the free capacity.
    ///
    /// In manual mode only an explicit selection is applied.
    pub async fn apply_pending_proposals(&self, selection: Option<&[RuleId]>, dry_run: bool) -> Result<ApplyReport> {
        if self.config.mode == OperatingMode::Manual && selection.is_none() {
            warn!("Manual mode: apply requires an explicit selection of proposal ids");
            return Ok(ApplyReport {
                selection_required: true,
                dry_run,
                ..Default::default()
            });
        }

        let max_active = self.config.max_active;
        let (mut report, commit) = self
            .write_with_retry(|document, now| {
                let mut proposals: Vec<&Rule> = document
                    .rules
                    .iter()
                    .filter(|r| r.status == RuleStatus::Proposed)
                    .filter(|r| selection.map_or(true, |ids| ids.contains(&r.id)))
                    .collect();
                proposals.sort_by_key(|r| r.created_at);

                let unknown: Vec<RuleId> = selection
                    .unwrap_or_default()
                    .iter()
                    .filter(|id| document.get(**id).map_or(true, |r| r.status != RuleStatus::Proposed))
                    .copied()
                    .collect();

                let free = max_active.saturating_sub(document.active_count());
                let (take, defer) = proposals.split_at(free.min(proposals.len()));

                let report = ApplyReport {
                    commit_id: None,
                    applied: take.iter().map(|r| r.id).collect(),
                    deferred: defer.iter().map(|r| r.id).collect(),
                    unknown,
                    selection_required: false,
                    dry_run,
                };
                if dry_run || take.is_empty() {
                    return Planned::done(report);
                }

                let changes = take
                    .iter()
                    .map(|rule| {
                        let mut after = (*rule).clone();
                        after.status = RuleStatus::Active;
                        // Staleness counts from activation, not from proposal
                        if now > after.last_reinforced_at {
                            after.last_reinforced_at = now;
                        }
                        RuleChange::update((*rule).clone(), after)
                    })
                    .collect();
                let message = format!("apply {} proposals", take.len());
                Planned::commit(report, message, changes)
            })
            .await?;

        report.commit_id = commit.map(|c| c.id);
        info!(
            applied = report.applied.len(),
            deferred = report.deferred.len(),
            dry_run,
            "Pending proposals processed"
        );

        if let Some(commit_id) = report.commit_id {
            metrics::counter!("distill_proposals_applied_total").increment(report.applied.len() as u64);
            self.event_bus
                .publish(DistillEvent::ProposalsApplied {
                    commit_id,
                    applied: report.applied.len(),
                    deferred: report.deferred.len(),
                    timestamp: Utc::now(),
                })
                .await?;
        }

        Ok(report)
    }

    /// Active rules unreinforced for longer than `staleness_days` and
    /// reinforced fewer than `min_reinforcement` times become pruned in one commit
    pub async fn prune_stale(
        &self,
        now: DateTime<Utc>,
        staleness_days: i64,
        min_reinforcement: u64,
        dry_run: bool,
    ) -> Result<PruneReport> {
        let (mut report, commit) = self
            .write_with_retry(|document, _| {
                let stale: Vec<&Rule> = document
                    .rules
                    .iter()
                    .filter(|r| r.is_stale(now, staleness_days, min_reinforcement))
                    .collect();
                let report = PruneReport {
                    commit_id: None,
                    pruned: stale.iter().map(|r| r.id).collect(),
                    dry_run,
                };
                if dry_run || stale.is_empty() {
                    return Planned::done(report);
                }

                let changes = stale
                    .iter()
                    .map(|rule| {
                        let mut after = (*rule).clone();
                        after.prune(now);
                        RuleChange::update((*rule).clone(), after)
                    })
                    .collect();
                let message = format!("prune {} stale rules (>{} days)", stale.len(), staleness_days);
                Planned::commit(report, message, changes)
            })
            .await?;

        report.commit_id = commit.map(|c| c.id);
        info!(pruned = report.pruned.len(), staleness_days, dry_run, "Stale rule pruning finished");

        if let Some(commit_id) = report.commit_id {
            metrics::counter!("distill_rules_pruned_total").increment(report.pruned.len() as u64);
            self.event_bus
                .publish(DistillEvent::RulesPruned {
                    commit_id,
                    rule_ids: report.pruned.clone(),
                    staleness_days,
                    timestamp: Utc::now(),
                })
                .await?;
        }

        Ok(report)
    }

    /// Prune with the configured staleness policy
    pub async fn prune_with_policy(&self, now: DateTime<Utc>, dry_run: bool) -> Result<PruneReport> {
        self.prune_stale(now, self.config.staleness_days, self.config.min_reinforcement, dry_run)
            .await
    }

    pub async fn review(&self, now: DateTime<Utc>) -> Result<ReviewReport> {
        let document = self.store.load().await.context("Failed to load rule document")?;

        let mut proposals: Vec<Rule> = document
            .rules
            .iter()
            .filter(|r| r.status == RuleStatus::Proposed)
            .cloned()
            .collect();
        proposals.sort_by_key(|r| r.created_at);

        let stale_candidates = document
            .rules
            .iter()
            .filter(|r| r.is_stale(now, self.config.staleness_days, self.config.min_reinforcement))
            .cloned()
            .collect();

        Ok(ReviewReport {
            counts: StatusCounts::of(&document),
            capacity: self.config.max_active,
            proposals,
            stale_candidates,
        })
    }

    /// Human veto: `proposed → pruned`
    pub async fn reject_proposal(&self, rule_id: RuleId) -> Result<RejectOutcome> {
        let (outcome, commit) = self
            .write_with_retry(|document, now| match document.get(rule_id) {
                None => Planned::done(Some(RejectOutcome::NotFound)),
                Some(rule) if rule.status != RuleStatus::Proposed => {
                    Planned::done(Some(RejectOutcome::NotProposed(rule.status)))
                }
                Some(rule) => {
                    let mut after = rule.clone();
                    after.prune(now);
                    Planned::commit(
                        None,
                        format!("reject proposal {}", rule_id),
                        vec![RuleChange::update(rule.clone(), after)],
                    )
                }
            })
            .await?;

        let Some(commit) = commit else {
            return Ok(outcome.unwrap_or(RejectOutcome::NotFound));
        };
        info!(rule_id = %rule_id, commit_id = %commit.id, "Proposal rejected");
        self.event_bus
            .publish(DistillEvent::ProposalRejected {
                rule_id,
                commit_id: commit.id,
                timestamp: Utc::now(),
            })
            .await?;
        Ok(RejectOutcome::Rejected(commit.id))
    }

    /// Restore every rule a commit touched to its prior state, as a new commit
    pub async fn revert(&self, commit_id: CommitId) -> Result<RevertOutcome> {
        let target = self
            .store
            .find_commit(commit_id)
            .await?
            .with_context(|| format!("Commit {} not found", commit_id))?;

        let result = self
            .write_with_retry(|document, _| {
                let conflicts: Vec<RuleId> = target
                    .changes
                    .iter()
                    .filter(|change| document.get(change.rule_id) != change.after.as_ref())
                    .map(|change| change.rule_id)
                    .collect();
                if !conflicts.is_empty() {
                    return Planned::done(Some(conflicts));
                }

                let inverse = target.changes.iter().rev().map(RuleChange::inverse).collect();
                Planned::commit(None, format!("revert {}", commit_id), inverse)
            })
            .await;

        let (conflicts, commit) = match result {
            Ok(planned) => planned,
            Err(e) => {
                if let Some(RuleStoreError::InvariantViolated(reason)) = e.downcast_ref::<RuleStoreError>() {
                    warn!(commit_id = %commit_id, reason = %reason, "Revert rejected");
                    return Ok(RevertOutcome::Rejected(reason.clone()));
                }
                return Err(e);
            }
        };

        if let Some(rule_ids) = conflicts {
            warn!(commit_id = %commit_id, conflicts = rule_ids.len(), "Revert conflicts with later changes");
            return Ok(RevertOutcome::Conflict(rule_ids));
        }

        let Some(commit) = commit else {
            anyhow::bail!("Revert of {} produced no commit", commit_id);
        };
        info!(reverted = %commit_id, commit_id = %commit.id, "Commit reverted");
        self.event_bus
            .publish(DistillEvent::CommitReverted {
                reverted: commit_id,
                commit_id: commit.id,
                timestamp: Utc::now(),
            })
            .await?;
        Ok(RevertOutcome::Reverted(commit.id))
    }

    /// Count one usage signal against an active rule; `None` when the rule
    /// is missing or not active
    pub async fn reinforce(&self, rule_id: RuleId, signal: &str) -> Result<Option<Rule>> {
        let (updated, _) = self
            .write_with_retry(|document, now| match document.get(rule_id) {
                Some(rule) if rule.status == RuleStatus::Active => {
                    let mut after = rule.clone();
                    after.reinforce(now);
                    Planned::commit(
                        Some(after.clone()),
                        format!("reinforce {} ({})", rule_id, signal),
                        vec![RuleChange::update(rule.clone(), after)],
                    )
                }
                _ => Planned::done(None),
            })
            .await?;
        Ok(updated)
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<RuleCommit>> {
        Ok(self.store.history(limit).await?)
    }

    pub async fn document(&self) -> Result<RuleDocument> {
        Ok(self.store.load().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OriginType;
    use crate::infrastructure::event_bus::BroadcastEventBus;
    use crate::infrastructure::rule_store::InMemoryRuleStore;
    use chrono::Duration;

    fn manager(mode: OperatingMode) -> RuleManager {
        RuleManager::new(
            Arc::new(InMemoryRuleStore::new()),
            Arc::new(BroadcastEventBus::new(16)),
            RuleManagerConfig {
                mode,
                ..Default::default()
            },
        )
    }

    fn candidate(text: &str) -> RuleCandidate {
        RuleCandidate::new(text, OriginType::Manual, vec!["s1".into()])
    }

    #[tokio::test]
    async fn test_duplicate_rejection_is_case_and_space_insensitive() {
        let manager = manager(OperatingMode::Supervised);

        let first = manager.add_rule(candidate("Always check imports"), false).await.unwrap();
        assert!(first.applied);
        assert_eq!(first.reason, AddRuleReason::Proposed);

        let second = manager.add_rule(candidate("  always   check IMPORTS "), false).await.unwrap();
        assert!(!second.applied);
        assert_eq!(second.reason, AddRuleReason::Duplicate);
        assert_eq!(second.duplicate_of, first.rule_id);
    }

    #[tokio::test]
    async fn test_near_duplicate_by_token_overlap() {
        let manager = manager(OperatingMode::Supervised);
        manager.add_rule(candidate("Run the full test suite before every commit"), false).await.unwrap();

        let outcome = manager
            .add_rule(candidate("Run the full test suite before every single commit"), false)
            .await
            .unwrap();
        assert_eq!(outcome.reason, AddRuleReason::Duplicate);
    }

    #[tokio::test]
    async fn test_empty_and_dry_run_write_nothing() {
        let manager = manager(OperatingMode::Autonomous);
        assert_eq!(manager.add_rule(candidate("   "), false).await.unwrap().reason, AddRuleReason::Empty);
        assert_eq!(
            manager.add_rule(candidate("Check imports first"), true).await.unwrap().reason,
            AddRuleReason::DryRun
        );
        assert!(manager.document().await.unwrap().rules.is_empty());
    }

    #[tokio::test]
    async fn test_autonomous_capacity_overflow_is_staged() {
        let manager = manager(OperatingMode::Autonomous);
        for i in 0..35 {
            let outcome = manager
                .add_rule(candidate(&format!("distinct guidance number {} for {}", i, "x".repeat(i + 1))), false)
                .await
                .unwrap();
            assert!(outcome.applied);
            let expected = if i < 30 { AddRuleReason::Activated } else { AddRuleReason::Capacity };
            assert_eq!(outcome.reason, expected, "rule {}", i);
            assert!(manager.document().await.unwrap().active_count() <= MAX_ACTIVE_RULES);
        }

        let counts = StatusCounts::of(&manager.document().await.unwrap());
        assert_eq!(counts.active, 30);
        assert_eq!(counts.proposed, 5);
    }

    #[tokio::test]
    async fn test_apply_respects_capacity_oldest_first() {
        let store = Arc::new(InMemoryRuleStore::with_capacity(2));
        let manager = RuleManager::new(
            store,
            Arc::new(BroadcastEventBus::new(16)),
            RuleManagerConfig {
                max_active: 2,
                ..Default::default()
            },
        );
        let a = manager.add_rule(candidate("Check imports first"), false).await.unwrap();
        let b = manager.add_rule(candidate("Run tests before committing"), false).await.unwrap();
        let c = manager.add_rule(candidate("Ask before deleting files"), false).await.unwrap();

        let preview = manager.apply_pending_proposals(None, true).await.unwrap();
        assert_eq!(preview.applied.len(), 2);
        assert!(preview.commit_id.is_none());
        assert_eq!(manager.document().await.unwrap().active_count(), 0);

        let report = manager.apply_pending_proposals(None, false).await.unwrap();
        assert_eq!(report.applied, vec![a.rule_id.unwrap(), b.rule_id.unwrap()]);
        assert_eq!(report.deferred, vec![c.rule_id.unwrap()]);
        assert!(report.commit_id.is_some());
    }

    #[tokio::test]
    async fn test_manual_mode_requires_selection() {
        let manager = manager(OperatingMode::Manual);
        let a = manager.add_rule(candidate("Check imports first"), false).await.unwrap();
        manager.add_rule(candidate("Run tests before committing"), false).await.unwrap();

        let report = manager.apply_pending_proposals(None, false).await.unwrap();
        assert!(report.selection_required);
        assert!(report.applied.is_empty());

        let missing = RuleId::new();
        let ids = [a.rule_id.unwrap(), missing];
        let report = manager.apply_pending_proposals(Some(&ids), false).await.unwrap();
        assert_eq!(report.applied, vec![a.rule_id.unwrap()]);
        assert_eq!(report.unknown, vec![missing]);
        assert_eq!(manager.document().await.unwrap().active_count(), 1);
    }

    #[tokio::test]
    async fn test_prune_stale_window() {
        let manager = manager(OperatingMode::Autonomous);
        let old = manager.add_rule(candidate("Check imports first"), false).await.unwrap();
        let fresh = manager.add_rule(candidate("Run tests before committing"), false).await.unwrap();
        let now = Utc::now();

        // Age the rules directly through the store
        let store = manager.store();
        let doc = store.load().await.unwrap();
        let changes = doc
            .rules
            .iter()
            .map(|rule| {
                let mut after = rule.clone();
                after.last_reinforced_at = if Some(rule.id) == old.rule_id {
                    now - Duration::days(61)
                } else {
                    now - Duration::days(10)
                };
                RuleChange::update(rule.clone(), after)
            })
            .collect();
        store.commit(doc.version, "age", changes).await.unwrap();

        let report = manager.prune_stale(now, 60, 1, false).await.unwrap();
        assert_eq!(report.pruned, vec![old.rule_id.unwrap()]);

        let doc = manager.document().await.unwrap();
        assert_eq!(doc.get(old.rule_id.unwrap()).unwrap().status, RuleStatus::Pruned);
        assert_eq!(doc.get(fresh.rule_id.unwrap()).unwrap().status, RuleStatus::Active);
        assert!(doc.get(old.rule_id.unwrap()).unwrap().pruned_at.is_some());
    }

    #[tokio::test]
    async fn test_pruned_text_can_be_proposed_again() {
        let manager = manager(OperatingMode::Supervised);
        let first = manager.add_rule(candidate("Check imports first"), false).await.unwrap();
        let rejected = manager.reject_proposal(first.rule_id.unwrap()).await.unwrap();
        assert!(matches!(rejected, RejectOutcome::Rejected(_)));

        let again = manager.add_rule(candidate("check imports first"), false).await.unwrap();
        assert!(again.applied);
        assert_eq!(
            manager.reject_proposal(RuleId::new()).await.unwrap(),
            RejectOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_revert_restores_prior_state() {
        let manager = manager(OperatingMode::Supervised);
        let added = manager.add_rule(candidate("Check imports first"), false).await.unwrap();
        let applied = manager.apply_pending_proposals(None, false).await.unwrap();
        let rule_id = added.rule_id.unwrap();
        assert_eq!(manager.document().await.unwrap().get(rule_id).unwrap().status, RuleStatus::Active);

        // The rule moved on since it was added
        let outcome = manager.revert(added.commit_id.unwrap()).await.unwrap();
        assert!(matches!(outcome, RevertOutcome::Conflict(ref ids) if *ids == vec![rule_id]));

        let outcome = manager.revert(applied.commit_id.unwrap()).await.unwrap();
        assert!(matches!(outcome, RevertOutcome::Reverted(_)));
        assert_eq!(manager.document().await.unwrap().get(rule_id).unwrap().status, RuleStatus::Proposed);

        let outcome = manager.revert(added.commit_id.unwrap()).await.unwrap();
        assert!(matches!(outcome, RevertOutcome::Reverted(_)));
        assert!(manager.document().await.unwrap().get(rule_id).is_none());
        assert_eq!(manager.history(10).await.unwrap().len(), 4);
    }
}

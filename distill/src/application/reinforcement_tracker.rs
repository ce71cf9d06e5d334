// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Reinforcement tracking
//!
//! Records that an active rule proved useful and aggregates usage for
//! operators. Writes go through the [`RuleManager`] so concurrent signals
//! converge on the rule store's version check; each signal lands exactly once.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::application::rule_manager::{RuleManager, StatusCounts};
use crate::application::EventBus;
use crate::domain::{DistillEvent, RuleId, RuleStatus};

#[derive(Debug, Clone, Serialize)]
pub struct RuleUsage {
    pub id: RuleId,
    pub text: String,
    pub status: RuleStatus,
    pub categories: Vec<String>,
    pub reinforcement_count: u64,
    pub days_since_reinforced: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryUsage {
    pub rules: usize,
    pub active: usize,
    pub reinforcements: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReinforcementStats {
    /// Most reinforced first
    pub rules: Vec<RuleUsage>,
    pub by_category: BTreeMap<String, CategoryUsage>,
    pub by_status: StatusCounts,
    pub total_reinforcements: u64,
}

pub struct ReinforcementTracker {
    rules: Arc<RuleManager>,
    event_bus: Arc<dyn EventBus>,
}

impl ReinforcementTracker {
    pub fn new(rules: Arc<RuleManager>, event_bus: Arc<dyn EventBus>) -> Self {
        Self { rules, event_bus }
    }

    /// False when the rule does not exist or is not active
    pub async fn record(&self, rule_id: RuleId, signal: &str) -> Result<bool> {
        let Some(rule) = self.rules.reinforce(rule_id, signal).await? else {
            debug!(rule_id = %rule_id, "Reinforcement ignored for inactive rule");
            return Ok(false);
        };

        info!(rule_id = %rule_id, count = rule.reinforcement_count, signal, "Rule reinforced");
        metrics::counter!("distill_reinforcements_total").increment(1);
        self.event_bus
            .publish(DistillEvent::RuleReinforced {
                rule_id,
                reinforcement_count: rule.reinforcement_count,
                signal: signal.to_string(),
                timestamp: Utc::now(),
            })
            .await?;
        Ok(true)
    }

    pub async fn stats(&self) -> Result<ReinforcementStats> {
        self.stats_at(Utc::now()).await
    }

    pub async fn stats_at(&self, now: DateTime<Utc>) -> Result<ReinforcementStats> {
        let document = self.rules.document().await?;
        let mut stats = ReinforcementStats {
            by_status: StatusCounts::of(&document),
            ..Default::default()
        };

        for rule in &document.rules {
            stats.total_reinforcements += rule.reinforcement_count;
            for category in &rule.categories {
                let usage = stats.by_category.entry(category.clone()).or_default();
                usage.rules += 1;
                usage.reinforcements += rule.reinforcement_count;
                if rule.status == RuleStatus::Active {
                    usage.active += 1;
                }
            }
            stats.rules.push(RuleUsage {
                id: rule.id,
                text: rule.text.clone(),
                status: rule.status,
                categories: rule.categories.clone(),
                reinforcement_count: rule.reinforcement_count,
                days_since_reinforced: rule.days_since_reinforced(now),
            });
        }

        stats
            .rules
            .sort_by(|a, b| b.reinforcement_count.cmp(&a.reinforcement_count).then(a.text.cmp(&b.text)));
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::rule_manager::RuleManagerConfig;
    use crate::domain::config::OperatingMode;
    use crate::domain::{OriginType, RuleCandidate};
    use crate::infrastructure::event_bus::BroadcastEventBus;
    use crate::infrastructure::rule_store::InMemoryRuleStore;

    async fn setup() -> (ReinforcementTracker, Arc<RuleManager>, RuleId, RuleId) {
        let bus = Arc::new(BroadcastEventBus::new(64));
        let rules = Arc::new(RuleManager::new(
            Arc::new(InMemoryRuleStore::new()),
            bus.clone(),
            RuleManagerConfig {
                mode: OperatingMode::Autonomous,
                // One retry per competing writer
                commit_retries: 10,
                ..Default::default()
            },
        ));
        let active = rules
            .add_rule(RuleCandidate::new("Run the tests before each commit", OriginType::Manual, vec![]), false)
            .await
            .unwrap();
        let other = rules
            .add_rule(RuleCandidate::new("Ask the user before deleting files", OriginType::Manual, vec![]), false)
            .await
            .unwrap();
        (
            ReinforcementTracker::new(rules.clone(), bus),
            rules,
            active.rule_id.unwrap(),
            other.rule_id.unwrap(),
        )
    }

    #[tokio::test]
    async fn test_concurrent_signals_all_land() {
        let (tracker, rules, rule_id, _) = setup().await;
        let tracker = Arc::new(tracker);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.record(rule_id, "used").await.unwrap() })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let rule = rules.document().await.unwrap().get(rule_id).cloned().unwrap();
        assert_eq!(rule.reinforcement_count, 8);
    }

    #[tokio::test]
    async fn test_inactive_rules_are_not_reinforced() {
        let (tracker, _, _, _) = setup().await;
        assert!(!tracker.record(RuleId::new(), "used").await.unwrap());
    }

    #[tokio::test]
    async fn test_stats_aggregate_by_category_and_status() {
        let (tracker, _, rule_id, _) = setup().await;
        tracker.record(rule_id, "used").await.unwrap();
        tracker.record(rule_id, "used").await.unwrap();

        let stats = tracker.stats().await.unwrap();
        assert_eq!(stats.total_reinforcements, 2);
        assert_eq!(stats.by_status.active, 2);
        assert_eq!(stats.rules[0].id, rule_id);
        assert_eq!(stats.by_category["testing"].reinforcements, 2);
        assert_eq!(stats.by_category["communication"].active, 1);
    }
}

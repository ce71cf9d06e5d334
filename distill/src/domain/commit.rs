// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Rule store document and commit model
//!
//! The rule store holds one ordered document. Every mutation is a named
//! commit recording the before/after image of each rule it touched, which
//! is what makes a single commit revertible on its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::rule::{Rule, RuleId, RuleStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitId(pub Uuid);

impl CommitId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CommitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CommitId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Snapshot of the rule document at a version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    pub version: u64,
    pub rules: Vec<Rule>,
}

impl RuleDocument {
    pub fn count(&self, status: RuleStatus) -> usize {
        self.rules.iter().filter(|r| r.status == status).count()
    }

    pub fn active_count(&self) -> usize {
        self.count(RuleStatus::Active)
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn live(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.is_live())
    }

    /// Apply a change set in order. Insertions append, preserving order.
    pub fn apply(&mut self, changes: &[RuleChange]) {
        for change in changes {
            let position = self.rules.iter().position(|r| r.id == change.rule_id);
            match (&change.after, position) {
                (Some(after), Some(i)) => self.rules[i] = after.clone(),
                (Some(after), None) => self.rules.push(after.clone()),
                (None, Some(i)) => {
                    self.rules.remove(i);
                }
                (None, None) => {}
            }
        }
    }

    /// Invariant check run before every commit.
    ///
    /// `previous_active` is the active count the change set started from. A
    /// document already over `max_active` (capacity lowered after the fact)
    /// may still shrink or stay level; it may not grow.
    pub fn check_invariants(&self, max_active: usize, previous_active: usize) -> Result<(), String> {
        let active = self.active_count();
        if active > max_active && active > previous_active {
            return Err(format!("{} active rules exceeds capacity {}", active, max_active));
        }
        let mut seen: BTreeMap<String, RuleId> = BTreeMap::new();
        for rule in self.live() {
            if let Some(other) = seen.insert(rule.normalized_text(), rule.id) {
                return Err(format!("rules {} and {} share text {:?}", other, rule.id, rule.normalized_text()));
            }
        }
        Ok(())
    }
}

/// Before/after image of one rule within a commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleChange {
    pub rule_id: RuleId,
    pub before: Option<Rule>,
    pub after: Option<Rule>,
}

impl RuleChange {
    pub fn insert(rule: Rule) -> Self {
        Self {
            rule_id: rule.id,
            before: None,
            after: Some(rule),
        }
    }

    pub fn update(before: Rule, after: Rule) -> Self {
        Self {
            rule_id: after.id,
            before: Some(before),
            after: Some(after),
        }
    }

    /// The change that undoes this one
    pub fn inverse(&self) -> Self {
        Self {
            rule_id: self.rule_id,
            before: self.after.clone(),
            after: self.before.clone(),
        }
    }
}

/// One named, atomic mutation of the rule document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCommit {
    pub id: CommitId,
    /// Document version produced by this commit
    pub version: u64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub changes: Vec<RuleChange>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule::{OriginType, RuleCandidate};

    fn rule(text: &str, status: RuleStatus) -> Rule {
        Rule::from_candidate(&RuleCandidate::new(text, OriginType::Manual, vec![]), status, Utc::now())
    }

    #[test]
    fn test_apply_and_inverse() {
        let mut doc = RuleDocument::default();
        let original = rule("Check imports", RuleStatus::Proposed);
        let insert = RuleChange::insert(original.clone());
        doc.apply(&[insert.clone()]);
        assert_eq!(doc.rules.len(), 1);

        let mut activated = original.clone();
        activated.status = RuleStatus::Active;
        let update = RuleChange::update(original.clone(), activated);
        doc.apply(&[update.clone()]);
        assert_eq!(doc.active_count(), 1);

        doc.apply(&[update.inverse()]);
        assert_eq!(doc.count(RuleStatus::Proposed), 1);

        doc.apply(&[insert.inverse()]);
        assert!(doc.rules.is_empty());
    }

    #[test]
    fn test_invariants_detect_duplicates_and_capacity() {
        let mut doc = RuleDocument::default();
        doc.rules.push(rule("Check imports", RuleStatus::Active));
        doc.rules.push(rule("check  IMPORTS", RuleStatus::Proposed));
        assert!(doc.check_invariants(30, 0).is_err());

        doc.rules[1].status = RuleStatus::Pruned;
        assert!(doc.check_invariants(30, 0).is_ok());
        assert!(doc.check_invariants(0, 0).is_err());
    }

    #[test]
    fn test_over_capacity_document_may_shrink_but_not_grow() {
        let mut doc = RuleDocument::default();
        for i in 0..4 {
            doc.rules.push(rule(&format!("Rule number {}", i), RuleStatus::Active));
        }

        // Capacity lowered to 2 after four rules were activated.
        assert!(doc.check_invariants(2, 4).is_ok());
        assert!(doc.check_invariants(2, 5).is_ok());
        assert!(doc.check_invariants(2, 3).is_err());
        assert!(doc.check_invariants(4, 3).is_ok());
    }
}

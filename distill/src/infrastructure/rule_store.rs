// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory rule store for tests and dry runs

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{CommitId, RuleChange, RuleCommit, RuleDocument, MAX_ACTIVE_RULES};
use crate::infrastructure::repository::{prepare_commit, RuleStore, RuleStoreError};

#[derive(Default)]
struct State {
    document: RuleDocument,
    commits: Vec<RuleCommit>,
}

pub struct InMemoryRuleStore {
    state: Arc<RwLock<State>>,
    max_active: usize,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::with_capacity(MAX_ACTIVE_RULES)
    }

    pub fn with_capacity(max_active: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            max_active,
        }
    }
}

impl Default for InMemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn load(&self) -> Result<RuleDocument, RuleStoreError> {
        Ok(self.state.read().await.document.clone())
    }

    async fn commit(
        &self,
        expected_version: u64,
        message: &str,
        changes: Vec<RuleChange>,
    ) -> Result<RuleCommit, RuleStoreError> {
        let mut state = self.state.write().await;
        let (document, commit) =
            prepare_commit(&state.document, expected_version, message, changes, self.max_active)?;
        state.document = document;
        state.commits.push(commit.clone());
        Ok(commit)
    }

    async fn history(&self, limit: usize) -> Result<Vec<RuleCommit>, RuleStoreError> {
        let state = self.state.read().await;
        Ok(state.commits.iter().rev().take(limit).cloned().collect())
    }

    async fn find_commit(&self, id: CommitId) -> Result<Option<RuleCommit>, RuleStoreError> {
        let state = self.state.read().await;
        Ok(state.commits.iter().find(|c| c.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OriginType, Rule, RuleCandidate, RuleStatus};
    use chrono::Utc;

    fn insert(text: &str, status: RuleStatus) -> RuleChange {
        let candidate = RuleCandidate::new(text, OriginType::Manual, vec![]);
        RuleChange::insert(Rule::from_candidate(&candidate, status, Utc::now()))
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let store = InMemoryRuleStore::new();
        store.commit(0, "first", vec![insert("Check imports", RuleStatus::Active)]).await.unwrap();

        let err = store
            .commit(0, "racing", vec![insert("Run tests", RuleStatus::Active)])
            .await
            .unwrap_err();
        assert!(matches!(err, RuleStoreError::VersionConflict { expected: 0, actual: 1 }));
        assert_eq!(store.load().await.unwrap().rules.len(), 1);
    }

    #[tokio::test]
    async fn test_invariant_violation_writes_nothing() {
        let store = InMemoryRuleStore::with_capacity(1);
        store.commit(0, "first", vec![insert("Check imports", RuleStatus::Active)]).await.unwrap();

        let err = store
            .commit(1, "over", vec![insert("Run tests", RuleStatus::Active)])
            .await
            .unwrap_err();
        assert!(matches!(err, RuleStoreError::InvariantViolated(_)));

        let doc = store.load().await.unwrap();
        assert_eq!(doc.version, 1);
        assert_eq!(store.history(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_newest_first() {
        let store = InMemoryRuleStore::new();
        let first = store.commit(0, "a", vec![insert("Check imports", RuleStatus::Proposed)]).await.unwrap();
        let second = store.commit(1, "b", vec![insert("Run tests", RuleStatus::Proposed)]).await.unwrap();

        let history = store.history(10).await.unwrap();
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);
        assert_eq!(store.find_commit(first.id).await.unwrap().unwrap().version, 1);
    }
}

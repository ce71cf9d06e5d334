// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository interfaces for the distillation bounded context
//! Defines the contracts for the vector store, rule store, job queue and
//! transcript source

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    CommitId, Filter, Job, JobId, JobOutcome, JobStatus, JobType, Payload, RuleChange, RuleCommit,
    RuleDocument, ScoredRecord, Transcript, VectorRecord,
};

/// Filtered access to an external vector collection
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// At most `limit` records matching `filter`, payload included
    async fn scroll(&self, collection: &str, filter: &Filter, limit: usize) -> Result<Vec<VectorRecord>> {
        Ok(self.scroll_page(collection, filter, limit, None).await?.records)
    }

    /// One page of at most `limit` matching records starting at `offset`.
    /// Pass the returned `next_offset` back to read the following page.
    async fn scroll_page(
        &self,
        collection: &str,
        filter: &Filter,
        limit: usize,
        offset: Option<&str>,
    ) -> Result<ScrollPage>;

    /// Merge `payload` into each record in `ids` that still satisfies
    /// `condition`. Records that no longer match are left untouched.
    async fn patch_payload(
        &self,
        collection: &str,
        ids: &[String],
        condition: &Filter,
        payload: Payload,
    ) -> Result<()>;

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &Filter,
        score_threshold: Option<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>>;

    async fn upsert(&self, collection: &str, id: &str, vector: Vec<f32>, payload: Payload) -> Result<()>;

    async fn health_check(&self) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub records: Vec<VectorRecord>,
    /// Id the next page starts from; `None` once the collection is exhausted
    pub next_offset: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RuleStoreError {
    #[error("rule document changed underneath (expected version {expected}, found {actual})")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("commit rejected: {0}")]
    InvariantViolated(String),

    #[error("commit {0} not found")]
    CommitNotFound(CommitId),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Durable, versioned rule document with a revertible commit log
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn load(&self) -> Result<RuleDocument, RuleStoreError>;

    /// Apply `changes` atomically when the document is still at
    /// `expected_version`. The resulting document must keep live text unique
    /// and must not grow the active set past capacity, or nothing is written.
    async fn commit(
        &self,
        expected_version: u64,
        message: &str,
        changes: Vec<RuleChange>,
    ) -> Result<RuleCommit, RuleStoreError>;

    /// Most recent commits first
    async fn history(&self, limit: usize) -> Result<Vec<RuleCommit>, RuleStoreError>;

    async fn find_commit(&self, id: CommitId) -> Result<Option<RuleCommit>, RuleStoreError>;
}

/// Result of an enqueue attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Enqueued {
    Created(Job),
    /// An identical job was already queued
    Existing(Job),
}

impl Enqueued {
    pub fn job(&self) -> &Job {
        match self {
            Enqueued::Created(job) | Enqueued::Existing(job) => job,
        }
    }
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn enqueue(&self, job_type: JobType, priority: i32, payload: serde_json::Value) -> Result<Enqueued>;

    /// Conditionally move the next queued job to running. Two concurrent
    /// callers never receive the same job.
    async fn claim_next(&self) -> Result<Option<Job>>;

    /// Conditionally move a running job to done or failed
    async fn complete(&self, id: JobId, outcome: JobOutcome) -> Result<bool>;

    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<Job>>;

    /// Return jobs stuck in running since before `started_before` to the queue
    async fn requeue_stale(&self, started_before: DateTime<Utc>) -> Result<usize>;
}

/// Where session transcripts come from
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn list_sessions(&self) -> Result<Vec<String>>;

    async fn load(&self, session_id: &str) -> Result<Option<Transcript>>;
}

/// Validate a proposed commit against the current document and produce the
/// next document. Shared by every rule store implementation.
pub(crate) fn prepare_commit(
    current: &RuleDocument,
    expected_version: u64,
    message: &str,
    changes: Vec<RuleChange>,
    max_active: usize,
) -> Result<(RuleDocument, RuleCommit), RuleStoreError> {
    if current.version != expected_version {
        return Err(RuleStoreError::VersionConflict {
            expected: expected_version,
            actual: current.version,
        });
    }

    let mut next = current.clone();
    next.apply(&changes);
    next.version = current.version + 1;
    next.check_invariants(max_active, current.active_count())
        .map_err(RuleStoreError::InvariantViolated)?;

    let commit = RuleCommit {
        id: CommitId::new(),
        version: next.version,
        message: message.to_string(),
        timestamp: Utc::now(),
        changes,
    };
    Ok((next, commit))
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Job queue implementations
//!
//! Both stores share the same queue semantics ([`JobBook`]); the file store
//! wraps every operation in the state-directory lock so independent
//! processes can produce and consume jobs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::{claim_order, Job, JobId, JobOutcome, JobStatus, JobType};
use crate::infrastructure::file_lock::{blocking, write_atomic, StateLock};
use crate::infrastructure::repository::{Enqueued, JobRepository};

const JOBS_FILE: &str = "jobs.json";
const LOCK_FILE: &str = ".jobs.lock";

/// Queue state transitions over a plain list of jobs
#[derive(Debug, Default)]
struct JobBook {
    jobs: Vec<Job>,
}

impl JobBook {
    fn enqueue(&mut self, job_type: JobType, priority: i32, payload: serde_json::Value) -> Enqueued {
        if let Some(existing) = self
            .jobs
            .iter()
            .find(|j| j.status == JobStatus::Queued && j.is_equivalent(job_type, &payload))
        {
            return Enqueued::Existing(existing.clone());
        }
        let job = Job::new(job_type, priority, payload);
        self.jobs.push(job.clone());
        Enqueued::Created(job)
    }

    fn claim_next(&mut self, now: DateTime<Utc>) -> Option<Job> {
        let next_id = self
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Queued)
            .min_by(|a, b| claim_order(a, b))
            .map(|j| j.job_id)?;
        let job = self.jobs.iter_mut().find(|j| j.job_id == next_id)?;
        job.start(now).then(|| job.clone())
    }

    fn complete(&mut self, id: JobId, outcome: JobOutcome, now: DateTime<Utc>) -> bool {
        self.jobs
            .iter_mut()
            .find(|j| j.job_id == id)
            .map_or(false, |job| job.finish(outcome, now))
    }

    fn list(&self, status: Option<JobStatus>) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }

    fn requeue_stale(&mut self, started_before: DateTime<Utc>) -> usize {
        let mut requeued = 0;
        for job in self.jobs.iter_mut() {
            let stuck = job.status == JobStatus::Running
                && job.started_at.map_or(true, |at| at < started_before);
            if stuck {
                job.status = JobStatus::Queued;
                job.started_at = None;
                requeued += 1;
            }
        }
        requeued
    }
}

/// In-memory queue for tests and single-process runs
#[derive(Default)]
pub struct InMemoryJobRepository {
    book: Arc<Mutex<JobBook>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn enqueue(&self, job_type: JobType, priority: i32, payload: serde_json::Value) -> Result<Enqueued> {
        Ok(self.book.lock().await.enqueue(job_type, priority, payload))
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        Ok(self.book.lock().await.claim_next(Utc::now()))
    }

    async fn complete(&self, id: JobId, outcome: JobOutcome) -> Result<bool> {
        Ok(self.book.lock().await.complete(id, outcome, Utc::now()))
    }

    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
        Ok(self.book.lock().await.list(status))
    }

    async fn requeue_stale(&self, started_before: DateTime<Utc>) -> Result<usize> {
        Ok(self.book.lock().await.requeue_stale(started_before))
    }
}

/// JSON file queue shared between processes
#[derive(Clone)]
pub struct FileJobRepository {
    dir: PathBuf,
}

impl FileJobRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read(dir: &Path) -> Result<JobBook> {
        let path = dir.join(JOBS_FILE);
        if !path.exists() {
            return Ok(JobBook::default());
        }
        let content = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        let jobs = serde_json::from_str(&content).with_context(|| format!("Corrupt job queue {:?}", path))?;
        Ok(JobBook { jobs })
    }

    /// Run `f` against the queue under the lock, persisting when it reports a change
    async fn with_book<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut JobBook) -> (T, bool) + Send + 'static,
        T: Send + 'static,
    {
        let dir = self.dir.clone();
        blocking(move || {
            let _lock = StateLock::acquire(&dir.join(LOCK_FILE))?;
            let mut book = Self::read(&dir)?;
            let (value, changed) = f(&mut book);
            if changed {
                write_atomic(&dir.join(JOBS_FILE), &serde_json::to_vec_pretty(&book.jobs)?)?;
            }
            Ok(value)
        })
        .await
    }
}

#[async_trait]
impl JobRepository for FileJobRepository {
    async fn enqueue(&self, job_type: JobType, priority: i32, payload: serde_json::Value) -> Result<Enqueued> {
        self.with_book(move |book| {
            let enqueued = book.enqueue(job_type, priority, payload);
            let changed = matches!(enqueued, Enqueued::Created(_));
            (enqueued, changed)
        })
        .await
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        self.with_book(|book| {
            let job = book.claim_next(Utc::now());
            let changed = job.is_some();
            (job, changed)
        })
        .await
    }

    async fn complete(&self, id: JobId, outcome: JobOutcome) -> Result<bool> {
        self.with_book(move |book| {
            let done = book.complete(id, outcome, Utc::now());
            (done, done)
        })
        .await
    }

    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
        self.with_book(move |book| (book.list(status), false)).await
    }

    async fn requeue_stale(&self, started_before: DateTime<Utc>) -> Result<usize> {
        self.with_book(move |book| {
            let count = book.requeue_stale(started_before);
            (count, count > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn test_enqueue_collapses_identical_queued_jobs() {
        let repo = InMemoryJobRepository::new();
        let first = repo.enqueue(JobType::ScorePending, 0, json!({})).await.unwrap();
        let second = repo.enqueue(JobType::ScorePending, 0, json!({})).await.unwrap();
        let other = repo.enqueue(JobType::ScorePending, 0, json!({"all": true})).await.unwrap();

        assert!(matches!(first, Enqueued::Created(_)));
        assert!(matches!(second, Enqueued::Existing(_)));
        assert_eq!(first.job().job_id, second.job().job_id);
        assert!(matches!(other, Enqueued::Created(_)));
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_and_ordered() {
        let repo = InMemoryJobRepository::new();
        repo.enqueue(JobType::PruneStale, 0, json!({})).await.unwrap();
        repo.enqueue(JobType::ScorePending, 10, json!({})).await.unwrap();

        let first = repo.claim_next().await.unwrap().unwrap();
        let second = repo.claim_next().await.unwrap().unwrap();
        assert_eq!(first.job_type, JobType::ScorePending);
        assert_eq!(second.job_type, JobType::PruneStale);
        assert!(repo.claim_next().await.unwrap().is_none());

        assert!(repo.complete(first.job_id, JobOutcome::Done).await.unwrap());
        assert!(!repo.complete(first.job_id, JobOutcome::Done).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_queue_shared_between_handles() {
        let dir = tempfile::tempdir().unwrap();
        let producer = FileJobRepository::new(dir.path());
        let consumer = FileJobRepository::new(dir.path());

        producer.enqueue(JobType::ExtractInsights, 1, json!({"dry_run": false})).await.unwrap();
        let claimed = consumer.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.job_type, JobType::ExtractInsights);
        assert!(producer.claim_next().await.unwrap().is_none());

        consumer.complete(claimed.job_id, JobOutcome::Failed("boom".into())).await.unwrap();
        let failed = producer.list(Some(JobStatus::Failed)).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_requeue_stale_running_jobs() {
        let repo = InMemoryJobRepository::new();
        repo.enqueue(JobType::ApplyProposals, 0, json!({})).await.unwrap();
        repo.claim_next().await.unwrap().unwrap();

        assert_eq!(repo.requeue_stale(Utc::now() - Duration::hours(1)).await.unwrap(), 0);
        assert_eq!(repo.requeue_stale(Utc::now() + Duration::seconds(1)).await.unwrap(), 1);

        let again = repo.claim_next().await.unwrap().unwrap();
        assert_eq!(again.attempts, 2);
    }
}

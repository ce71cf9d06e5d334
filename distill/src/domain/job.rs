// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deferred work descriptors
//!
//! Producers and consumers are independent processes, so a job may run more
//! than once. Every job type maps to an idempotent pipeline operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ScorePending,
    ExtractInsights,
    GenerateReflections,
    ApplyProposals,
    PruneStale,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ScorePending => "score_pending",
            JobType::ExtractInsights => "extract_insights",
            JobType::GenerateReflections => "generate_reflections",
            JobType::ApplyProposals => "apply_proposals",
            JobType::PruneStale => "prune_stale",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    /// Higher runs first
    pub priority: i32,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(job_type: JobType, priority: i32, payload: serde_json::Value) -> Self {
        Self {
            job_id: JobId::new(),
            job_type,
            status: JobStatus::Queued,
            priority,
            payload,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            attempts: 0,
            error: None,
        }
    }

    /// Same work as another queued job (used to collapse duplicate triggers)
    pub fn is_equivalent(&self, job_type: JobType, payload: &serde_json::Value) -> bool {
        self.job_type == job_type && &self.payload == payload
    }

    /// `queued → running`; false when the job is not queued
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != JobStatus::Queued {
            return false;
        }
        self.status = JobStatus::Running;
        self.started_at = Some(now);
        self.attempts += 1;
        true
    }

    /// `running → done|failed`; false when the job is not running
    pub fn finish(&mut self, outcome: JobOutcome, now: DateTime<Utc>) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        match outcome {
            JobOutcome::Done => {
                self.status = JobStatus::Done;
                self.error = None;
            }
            JobOutcome::Failed(reason) => {
                self.status = JobStatus::Failed;
                self.error = Some(reason);
            }
        }
        self.finished_at = Some(now);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    Failed(String),
}

/// Claim order: highest priority first, then oldest
pub fn claim_order(a: &Job, b: &Job) -> std::cmp::Ordering {
    b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transitions_are_conditional() {
        let now = Utc::now();
        let mut job = Job::new(JobType::ScorePending, 0, json!({}));

        assert!(!job.finish(JobOutcome::Done, now));
        assert!(job.start(now));
        assert!(!job.start(now));
        assert_eq!(job.attempts, 1);
        assert!(job.finish(JobOutcome::Failed("timeout".into()), now));
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_claim_order() {
        let low = Job::new(JobType::PruneStale, 0, json!({}));
        let high = Job::new(JobType::ScorePending, 5, json!({}));
        let mut jobs = vec![low.clone(), high.clone()];
        jobs.sort_by(claim_order);
        assert_eq!(jobs[0].job_id, high.job_id);
    }

    #[test]
    fn test_serialized_type_field() {
        let job = Job::new(JobType::GenerateReflections, 1, json!({"session_id": "s1"}));
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "generate_reflections");
        assert_eq!(value["status"], "queued");
    }
}

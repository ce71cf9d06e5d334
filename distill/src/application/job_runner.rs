// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Job runner
//!
//! Drains the job queue into the pipeline services. Every job type maps to an
//! idempotent operation, so a job that runs twice after a crash is harmless.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::insight_extractor::InsightExtractor;
use crate::application::quality_scorer::{QualityScorer, ScoreRequest, ScoreSelection};
use crate::application::reflection_generator::ReflectionGenerator;
use crate::application::rule_manager::RuleManager;
use crate::domain::{Job, JobOutcome, JobType, RuleId};
use crate::infrastructure::repository::{JobRepository, TranscriptSource};

/// Options shared by every job type; each type reads the fields it needs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub all: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<RuleId>>,
}

impl JobPayload {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    pub fn from_job(job: &Job) -> Result<Self> {
        if job.payload.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(job.payload.clone()).with_context(|| format!("Invalid payload for job {}", job.job_id))
    }
}

/// The services a job can be dispatched to
#[derive(Clone)]
pub struct PipelineServices {
    pub scorer: Arc<QualityScorer>,
    pub extractor: Arc<InsightExtractor>,
    pub reflector: Arc<ReflectionGenerator>,
    pub rules: Arc<RuleManager>,
    pub transcripts: Option<Arc<dyn TranscriptSource>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobRunReport {
    pub requeued: usize,
    pub claimed: usize,
    pub done: usize,
    pub failed: usize,
}

pub struct JobRunner {
    jobs: Arc<dyn JobRepository>,
    services: PipelineServices,
    stale_after: Duration,
}

impl JobRunner {
    pub fn new(jobs: Arc<dyn JobRepository>, services: PipelineServices) -> Self {
        Self {
            jobs,
            services,
            stale_after: Duration::hours(1),
        }
    }

    /// Running jobs older than this are assumed orphaned by a crash
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub async fn run(&self, max_jobs: usize) -> Result<JobRunReport> {
        let mut report = JobRunReport {
            requeued: self.jobs.requeue_stale(Utc::now() - self.stale_after).await?,
            ..Default::default()
        };
        if report.requeued > 0 {
            warn!(requeued = report.requeued, "Requeued orphaned jobs");
        }

        while report.claimed < max_jobs {
            let Some(job) = self.jobs.claim_next().await? else {
                break;
            };
            report.claimed += 1;
            info!(job_id = %job.job_id, job_type = %job.job_type, attempt = job.attempts, "Running job");

            let outcome = match self.dispatch(&job).await {
                Ok(summary) => {
                    info!(job_id = %job.job_id, summary = %summary, "Job done");
                    report.done += 1;
                    JobOutcome::Done
                }
                Err(e) => {
                    warn!(job_id = %job.job_id, error = %format!("{:#}", e), "Job failed");
                    report.failed += 1;
                    JobOutcome::Failed(format!("{:#}", e))
                }
            };
            if !self.jobs.complete(job.job_id, outcome).await? {
                warn!(job_id = %job.job_id, "Job was no longer running when completed");
            }
        }

        Ok(report)
    }

    async fn dispatch(&self, job: &Job) -> Result<String> {
        let payload = JobPayload::from_job(job)?;
        let services = &self.services;

        match job.job_type {
            JobType::ScorePending => {
                let request = ScoreRequest {
                    selection: if payload.all { ScoreSelection::All } else { ScoreSelection::Pending },
                    session_ids: payload.session_ids,
                };
                let r = services.scorer.score_pending(&request).await?;
                Ok(format!("scored {}, skipped {}, failed {}", r.scored, r.skipped, r.failed))
            }
            JobType::ExtractInsights => {
                let r = services.extractor.extract_insights(payload.dry_run).await?;
                Ok(format!(
                    "{} candidates, {} applied, {} not persisted",
                    r.candidates_found, r.applied, r.rule_failures
                ))
            }
            JobType::GenerateReflections => {
                let source = services
                    .transcripts
                    .as_ref()
                    .context("No transcript source configured (spec.transcripts_dir)")?;
                let r = services
                    .reflector
                    .process_all(source.as_ref(), payload.session_id.as_deref(), payload.force)
                    .await?;
                Ok(format!(
                    "{} sessions, {} reflections, {} sessions failed",
                    r.sessions_processed, r.reflections_stored, r.sessions_failed
                ))
            }
            JobType::ApplyProposals => {
                let r = services
                    .rules
                    .apply_pending_proposals(payload.ids.as_deref(), payload.dry_run)
                    .await?;
                Ok(format!("applied {}, deferred {}", r.applied.len(), r.deferred.len()))
            }
            JobType::PruneStale => {
                let r = services.rules.prune_with_policy(Utc::now(), payload.dry_run).await?;
                Ok(format!("pruned {}", r.pruned.len()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::insight_extractor::ExtractorSettings;
    use crate::application::quality_scorer::ScorerSettings;
    use crate::application::reflection_generator::{FailureDetector, ReflectorSettings};
    use crate::application::rule_manager::RuleManagerConfig;
    use crate::domain::llm::{GenerationOptions, GenerationResponse, LLMError, LLMProvider};
    use crate::domain::{FailureSignal, JobStatus, OriginType, RuleCandidate, Transcript};
    use crate::infrastructure::embedding_client::HashEmbeddingClient;
    use crate::infrastructure::event_bus::BroadcastEventBus;
    use crate::infrastructure::in_memory_vector_store::InMemoryVectorStore;
    use crate::infrastructure::job_store::InMemoryJobRepository;
    use crate::infrastructure::rule_store::InMemoryRuleStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct SilentLLM;

    #[async_trait]
    impl LLMProvider for SilentLLM {
        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
            Ok(GenerationResponse::text("mock", "mock", ""))
        }

        async fn health_check(&self) -> Result<(), LLMError> {
            Ok(())
        }
    }

    struct NoFailures;

    impl FailureDetector for NoFailures {
        fn detect(&self, _transcript: &Transcript) -> Vec<FailureSignal> {
            Vec::new()
        }
    }

    fn runner(jobs: Arc<InMemoryJobRepository>) -> (JobRunner, Arc<RuleManager>) {
        let bus = Arc::new(BroadcastEventBus::new(64));
        let store = Arc::new(InMemoryVectorStore::new());
        let llm: Arc<dyn LLMProvider> = Arc::new(SilentLLM);
        let rules = Arc::new(RuleManager::new(
            Arc::new(InMemoryRuleStore::new()),
            bus.clone(),
            RuleManagerConfig::default(),
        ));
        let services = PipelineServices {
            scorer: Arc::new(QualityScorer::new(store.clone(), llm.clone(), bus.clone(), ScorerSettings::default())),
            extractor: Arc::new(InsightExtractor::new(
                store.clone(),
                llm.clone(),
                rules.clone(),
                bus.clone(),
                ExtractorSettings::default(),
            )),
            reflector: Arc::new(ReflectionGenerator::new(
                store,
                llm,
                Arc::new(HashEmbeddingClient::default()),
                Arc::new(NoFailures),
                rules.clone(),
                bus,
                ReflectorSettings::default(),
            )),
            rules: rules.clone(),
            transcripts: None,
        };
        (JobRunner::new(jobs, services), rules)
    }

    #[test]
    fn test_payload_omits_defaults() {
        let payload = JobPayload {
            dry_run: true,
            ..Default::default()
        };
        assert_eq!(payload.to_value(), json!({"dry_run": true}));
    }

    #[tokio::test]
    async fn test_jobs_run_in_priority_order_and_record_outcome() {
        let jobs = Arc::new(InMemoryJobRepository::new());
        let (runner, rules) = runner(jobs.clone());
        rules
            .add_rule(RuleCandidate::new("Check imports first", OriginType::Manual, vec![]), false)
            .await
            .unwrap();

        jobs.enqueue(JobType::ApplyProposals, 5, JobPayload::default().to_value()).await.unwrap();
        jobs.enqueue(JobType::GenerateReflections, 1, JobPayload::default().to_value()).await.unwrap();
        jobs.enqueue(JobType::PruneStale, 0, json!({"dry_run": true})).await.unwrap();

        let report = runner.run(10).await.unwrap();
        assert_eq!(report.claimed, 3);
        assert_eq!(report.done, 2);
        // No transcript source configured
        assert_eq!(report.failed, 1);

        assert_eq!(rules.document().await.unwrap().active_count(), 1);
        let failed = jobs.list(Some(JobStatus::Failed)).await.unwrap();
        assert_eq!(failed[0].job_type, JobType::GenerateReflections);
        assert!(failed[0].error.as_deref().unwrap_or_default().contains("transcript"));
    }

    #[tokio::test]
    async fn test_run_stops_at_max_jobs() {
        let jobs = Arc::new(InMemoryJobRepository::new());
        let (runner, _) = runner(jobs.clone());
        jobs.enqueue(JobType::ScorePending, 0, json!({})).await.unwrap();
        jobs.enqueue(JobType::ExtractInsights, 0, json!({})).await.unwrap();

        let report = runner.run(1).await.unwrap();
        assert_eq!(report.claimed, 1);
        assert_eq!(jobs.list(Some(JobStatus::Queued)).await.unwrap().len(), 1);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # QualityScorer - Pending Chunk Rating
//!
//! Pulls one bounded batch of chunks from the vector store, asks the
//! generation service for a 0–10 rating per chunk and writes the rating back
//! with a conditional payload patch.
//!
//! Unusable responses leave the chunk pending; a later invocation retries it.
//! The batch runs under a wall-clock budget. Chunks not reached before the
//! budget runs out stay pending too.

use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::application::prompts::score_prompt;
use crate::application::EventBus;
use crate::domain::chunk::fields;
use crate::domain::config::{DistillConfig, ScoringConfig};
use crate::domain::llm::{GenerationOptions, LLMProvider};
use crate::domain::{Condition, DistillError, DistillEvent, Filter, QualityScore, SessionChunk};
use crate::infrastructure::llm::generation_options;
use crate::infrastructure::repository::VectorStore;

#[derive(Debug, Clone)]
pub struct ScorerSettings {
    pub scoring: ScoringConfig,
    pub collection: String,
    pub generation: GenerationOptions,
}

impl Default for ScorerSettings {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            collection: "session_chunks".to_string(),
            generation: GenerationOptions::default(),
        }
    }
}

impl ScorerSettings {
    pub fn from_config(config: &DistillConfig) -> Self {
        Self {
            scoring: config.scoring.clone(),
            collection: config.vector_store.chunks_collection.clone(),
            generation: generation_options(&config.generation),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSelection {
    /// Only chunks still flagged `pending_score`
    #[default]
    Pending,
    /// Re-rate everything in the batch, overwriting existing scores
    All,
}

#[derive(Debug, Clone, Default)]
pub struct ScoreRequest {
    pub selection: ScoreSelection,
    pub session_ids: Option<Vec<String>>,
}

impl ScoreRequest {
    pub fn pending() -> Self {
        Self::default()
    }

    fn filter(&self) -> Filter {
        let mut filter = match self.selection {
            ScoreSelection::Pending => Filter::must([Condition::equals(fields::PENDING_SCORE, true)]),
            ScoreSelection::All => Filter::new(),
        };
        if let Some(ids) = &self.session_ids {
            filter = filter.and(Condition::any_of(fields::SESSION_ID, ids.iter().map(String::as_str)));
        }
        filter
    }

    /// Current-state guard for the write-back
    fn patch_condition(&self) -> Filter {
        match self.selection {
            ScoreSelection::Pending => Filter::must([Condition::equals(fields::PENDING_SCORE, true)]),
            ScoreSelection::All => Filter::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreReport {
    pub scored: usize,
    /// Soft failures plus chunks the budget never reached
    pub skipped: usize,
    pub failed: usize,
    pub budget_exhausted: bool,
}

impl ScoreReport {
    pub fn processed(&self) -> usize {
        self.scored + self.skipped + self.failed
    }
}

enum ItemResult {
    Scored,
    Skipped,
    OutOfBudget,
    Failed,
}

pub struct QualityScorer {
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LLMProvider>,
    event_bus: Arc<dyn EventBus>,
    settings: ScorerSettings,
}

impl QualityScorer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LLMProvider>,
        event_bus: Arc<dyn EventBus>,
        settings: ScorerSettings,
    ) -> Self {
        Self {
            store,
            llm,
            event_bus,
            settings,
        }
    }

    pub async fn score_pending(&self, request: &ScoreRequest) -> Result<ScoreReport> {
        let deadline = Instant::now() + self.settings.scoring.time_budget;
        let filter = request.filter();

        let records = self
            .store
            .scroll(&self.settings.collection, &filter, self.settings.scoring.batch_size)
            .await
            .context("Failed to select chunks for scoring")?;

        info!(
            selected = records.len(),
            selection = ?request.selection,
            budget = ?self.settings.scoring.time_budget,
            "Starting quality scoring"
        );

        let mut report = ScoreReport::default();
        let mut chunks = Vec::with_capacity(records.len());
        for record in &records {
            match SessionChunk::from_record(record) {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => {
                    warn!(chunk_id = %record.id, error = %e, "Malformed chunk payload");
                    report.failed += 1;
                }
            }
        }

        let condition = request.patch_condition();
        let results: Vec<ItemResult> = stream::iter(chunks)
            .map(|chunk| self.score_one(chunk, deadline, &condition))
            .buffer_unordered(self.settings.scoring.concurrency.max(1))
            .collect()
            .await;

        for result in results {
            match result {
                ItemResult::Scored => report.scored += 1,
                ItemResult::Skipped => report.skipped += 1,
                ItemResult::OutOfBudget => {
                    report.skipped += 1;
                    report.budget_exhausted = true;
                }
                ItemResult::Failed => report.failed += 1,
            }
        }

        if report.budget_exhausted {
            warn!("Scoring budget exhausted; remaining chunks stay pending");
        }
        info!(
            scored = report.scored,
            skipped = report.skipped,
            failed = report.failed,
            "Quality scoring finished"
        );
        Ok(report)
    }

    async fn score_one(&self, chunk: SessionChunk, deadline: Instant, condition: &Filter) -> ItemResult {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return ItemResult::OutOfBudget;
        }
        let timeout = remaining.min(self.settings.generation.timeout);
        let options = self.settings.generation.clone().with_timeout(timeout);

        let prompt = score_prompt(&chunk.text, self.settings.scoring.max_chunk_chars);
        let response = match self.llm.generate(&prompt, &options).await {
            Ok(response) => response,
            Err(e) => {
                let error = DistillError::from(e);
                if !error.is_soft() {
                    warn!(chunk_id = %chunk.id, error = %error, "Generation failed");
                    metrics::counter!("distill_chunks_failed_total").increment(1);
                    return ItemResult::Failed;
                }
                if timeout < self.settings.generation.timeout && Instant::now() >= deadline {
                    return ItemResult::OutOfBudget;
                }
                self.skip(&chunk.id, error.to_string()).await;
                return ItemResult::Skipped;
            }
        };

        let score = match QualityScore::parse_response(&response.text) {
            Ok(score) => score,
            Err(e) => {
                self.skip(&chunk.id, e.to_string()).await;
                return ItemResult::Skipped;
            }
        };

        let patch = SessionChunk::score_patch(score, Utc::now());
        if let Err(e) = self
            .store
            .patch_payload(&self.settings.collection, &[chunk.id.clone()], condition, patch)
            .await
        {
            warn!(chunk_id = %chunk.id, error = %e, "Failed to persist score");
            metrics::counter!("distill_chunks_failed_total").increment(1);
            return ItemResult::Failed;
        }

        debug!(chunk_id = %chunk.id, score = score.value(), "Chunk scored");
        metrics::counter!("distill_chunks_scored_total").increment(1);
        self.emit(DistillEvent::ChunkScored {
            chunk_id: chunk.id,
            score: score.value(),
            timestamp: Utc::now(),
        })
        .await;
        ItemResult::Scored
    }

    async fn skip(&self, chunk_id: &str, reason: String) {
        debug!(chunk_id, reason = %reason, "Chunk left pending");
        metrics::counter!("distill_chunks_skipped_total").increment(1);
        self.emit(DistillEvent::ChunkScoreSkipped {
            chunk_id: chunk_id.to_string(),
            reason,
            timestamp: Utc::now(),
        })
        .await;
    }

    async fn emit(&self, event: DistillEvent) {
        if let Err(e) = self.event_bus.publish(event).await {
            debug!(error = %e, "Event not delivered");
        }
    }

    pub fn time_budget(&self) -> Duration {
        self.settings.scoring.time_budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{GenerationResponse, LLMError};
    use crate::infrastructure::event_bus::BroadcastEventBus;
    use crate::infrastructure::in_memory_vector_store::InMemoryVectorStore;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Replies with the score configured for the first matching excerpt text
    struct MockLLM {
        replies: HashMap<String, String>,
    }

    #[async_trait]
    impl LLMProvider for MockLLM {
        async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
            self.replies
                .iter()
                .find(|(text, _)| prompt.contains(text.as_str()))
                .map(|(_, reply)| GenerationResponse::text("mock", "mock", reply.clone()))
                .ok_or_else(|| LLMError::Provider("no reply configured".into()))
        }

        async fn health_check(&self) -> Result<(), LLMError> {
            Ok(())
        }
    }

    async fn seed(store: &InMemoryVectorStore, chunks: &[(&str, &str)]) {
        for (id, text) in chunks {
            let chunk = SessionChunk::pending(*id, "s1", *text, Utc::now());
            store.upsert("session_chunks", id, vec![0.0; 4], chunk.to_payload()).await.unwrap();
        }
    }

    fn scorer(store: Arc<InMemoryVectorStore>, replies: &[(&str, &str)]) -> QualityScorer {
        let llm = MockLLM {
            replies: replies.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        };
        QualityScorer::new(
            store,
            Arc::new(llm),
            Arc::new(BroadcastEventBus::new(64)),
            ScorerSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_valid_scores_are_persisted_and_garbage_stays_pending() {
        let store = Arc::new(InMemoryVectorStore::new());
        seed(&store, &[("c1", "fixed the flaky test"), ("c2", "chatted about lunch"), ("c3", "mystery")]).await;
        let scorer = scorer(
            store.clone(),
            &[("fixed the flaky test", "9"), ("chatted about lunch", "Score: 1"), ("mystery", "eleven")],
        );

        let report = scorer.score_pending(&ScoreRequest::pending()).await.unwrap();
        assert_eq!(report.scored, 2);
        assert_eq!(report.skipped, 1);
        assert!(!report.budget_exhausted);

        let c1 = SessionChunk::from_record(&store.get("session_chunks", "c1").await.unwrap()).unwrap();
        assert_eq!(c1.quality_score.map(|s| s.value()), Some(9));
        assert!(!c1.pending_score);

        let c3 = SessionChunk::from_record(&store.get("session_chunks", "c3").await.unwrap()).unwrap();
        assert!(c3.pending_score);
        assert_eq!(c3.quality_score, None);
    }

    #[tokio::test]
    async fn test_rerun_after_success_mutates_nothing() {
        let store = Arc::new(InMemoryVectorStore::new());
        seed(&store, &[("c1", "fixed the flaky test"), ("c2", "chatted about lunch")]).await;
        let scorer = scorer(store.clone(), &[("fixed the flaky test", "9"), ("chatted about lunch", "1")]);

        scorer.score_pending(&ScoreRequest::pending()).await.unwrap();
        let before = store.mutation_count();

        let report = scorer.score_pending(&ScoreRequest::pending()).await.unwrap();
        assert_eq!(report.processed(), 0);
        assert_eq!(store.mutation_count(), before);
    }

    #[tokio::test]
    async fn test_rescore_all_overwrites() {
        let store = Arc::new(InMemoryVectorStore::new());
        seed(&store, &[("c1", "fixed the flaky test")]).await;
        scorer(store.clone(), &[("fixed the flaky test", "4")])
            .score_pending(&ScoreRequest::pending())
            .await
            .unwrap();

        let request = ScoreRequest {
            selection: ScoreSelection::All,
            session_ids: Some(vec!["s1".into()]),
        };
        let report = scorer(store.clone(), &[("fixed the flaky test", "8")])
            .score_pending(&request)
            .await
            .unwrap();
        assert_eq!(report.scored, 1);

        let c1 = SessionChunk::from_record(&store.get("session_chunks", "c1").await.unwrap()).unwrap();
        assert_eq!(c1.quality_score.map(|s| s.value()), Some(8));
    }

    #[tokio::test]
    async fn test_zero_budget_leaves_everything_pending() {
        let store = Arc::new(InMemoryVectorStore::new());
        seed(&store, &[("c1", "fixed the flaky test")]).await;
        let mut scorer = scorer(store.clone(), &[("fixed the flaky test", "9")]);
        scorer.settings.scoring.time_budget = Duration::ZERO;

        let report = scorer.score_pending(&ScoreRequest::pending()).await.unwrap();
        assert!(report.budget_exhausted);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.scored, 0);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # InsightExtractor - Contrastive Rule Mining
//!
//! Contrasts high-scoring chunks against low-scoring ones and asks the
//! generation service what the good sessions did that the bad ones did not.
//!
//! ## Algorithm
//!
//! 1. Scroll `quality_score >= high` and `quality_score <= low`; the middle
//!    band is ignored.
//! 2. Order each side by session date (newest first, id as tiebreak) and
//!    zip them index-aligned, giving `min(|high|, |low|)` pairs.
//! 3. One generation call per batch of pairs; `- ` bullets become
//!    candidates.
//! 4. Every candidate goes through [`RuleManager::add_rule`], which owns
//!    dedup and capacity. Re-running is safe.
//!
//! A failed batch is logged and skipped; the other batches still apply.

use anyhow::{Context, Result};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::prompts::insight_prompt;
use crate::application::rule_manager::{AddRuleReason, RuleManager};
use crate::application::EventBus;
use crate::domain::chunk::fields;
use crate::domain::config::{DistillConfig, InsightConfig};
use crate::domain::llm::{GenerationOptions, LLMProvider};
use crate::domain::{Condition, DistillEvent, Filter, OriginType, RuleCandidate, SessionChunk};
use crate::infrastructure::llm::generation_options;
use crate::infrastructure::repository::VectorStore;

static PAIR_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\[\s*pair\s*(\d+)\s*\]\s*").expect("pair tag regex is valid"));

/// One high-scoring chunk set against one low-scoring chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ContrastPair {
    pub high: SessionChunk,
    pub low: SessionChunk,
}

impl ContrastPair {
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids = vec![self.high.session_id.clone()];
        if self.low.session_id != self.high.session_id {
            ids.push(self.low.session_id.clone());
        }
        ids
    }
}

fn recency_order(a: &SessionChunk, b: &SessionChunk) -> Ordering {
    b.session_date.cmp(&a.session_date).then_with(|| a.id.cmp(&b.id))
}

/// Most recent high with most recent low, and so on down both lists
pub fn pair_chunks(mut high: Vec<SessionChunk>, mut low: Vec<SessionChunk>) -> Vec<ContrastPair> {
    high.sort_by(recency_order);
    low.sort_by(recency_order);
    high.into_iter()
        .zip(low)
        .map(|(high, low)| ContrastPair { high, low })
        .collect()
}

/// Pull candidate rules out of a bulleted response.
///
/// `[PAIR n]`-tagged bullets are attributed to that pair's sessions,
/// untagged ones to every session in the batch. Bullets outside
/// `min_chars..max_chars` characters are dropped.
pub fn parse_bullets(response: &str, pairs: &[ContrastPair], min_chars: usize, max_chars: usize) -> Vec<RuleCandidate> {
    let mut batch_sessions: Vec<String> = pairs.iter().flat_map(ContrastPair::session_ids).collect();
    batch_sessions.sort();
    batch_sessions.dedup();

    let mut candidates = Vec::new();
    for line in response.lines() {
        let Some(body) = line.trim().strip_prefix("- ") else {
            continue;
        };

        let (sessions, text) = match PAIR_TAG.captures(body) {
            Some(caps) => {
                let tag_end = caps.get(0).map_or(0, |m| m.end());
                let pair = caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| pairs.get(i));
                let sessions = pair.map_or_else(|| batch_sessions.clone(), ContrastPair::session_ids);
                (sessions, &body[tag_end..])
            }
            None => (batch_sessions.clone(), body),
        };

        let text = text.trim();
        let len = text.chars().count();
        if len < min_chars || len >= max_chars {
            debug!(len, "Bullet outside accepted length, dropped");
            continue;
        }
        candidates.push(RuleCandidate::new(text, OriginType::InsightExtraction, sessions));
    }
    candidates
}

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub insights: InsightConfig,
    pub collection: String,
    pub generation: GenerationOptions,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            insights: InsightConfig::default(),
            collection: "session_chunks".to_string(),
            generation: GenerationOptions::default(),
        }
    }
}

impl ExtractorSettings {
    pub fn from_config(config: &DistillConfig) -> Self {
        Self {
            insights: config.insights.clone(),
            collection: config.vector_store.chunks_collection.clone(),
            generation: generation_options(&config.generation),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightStatus {
    #[default]
    Completed,
    /// One of the partitions was empty; nothing was asked
    InsufficientData,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InsightReport {
    pub status: InsightStatus,
    pub pairs: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub candidates_found: usize,
    pub applied: usize,
    pub duplicates: usize,
    /// Written as proposed because no active slot was free
    pub staged: usize,
    /// Candidates the rule manager could not persist
    pub rule_failures: usize,
    pub dry_run: bool,
}

pub struct InsightExtractor {
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LLMProvider>,
    rules: Arc<RuleManager>,
    event_bus: Arc<dyn EventBus>,
    settings: ExtractorSettings,
}

impl InsightExtractor {
    pub fn new(
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LLMProvider>,
        rules: Arc<RuleManager>,
        event_bus: Arc<dyn EventBus>,
        settings: ExtractorSettings,
    ) -> Self {
        Self {
            store,
            llm,
            rules,
            event_bus,
            settings,
        }
    }

    /// The `scroll_limit` most recent chunks matching `condition`. Every
    /// page is read so recency is judged over the whole partition.
    async fn partition(&self, condition: Condition) -> Result<Vec<SessionChunk>> {
        let filter = Filter::must([condition]);
        let keep = self.settings.insights.scroll_limit.max(1);
        let mut newest: Vec<SessionChunk> = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let page = self
                .store
                .scroll_page(&self.settings.collection, &filter, keep, offset.as_deref())
                .await
                .context("Failed to scroll scored chunks")?;

            newest.extend(page.records.iter().filter_map(|record| match SessionChunk::from_record(record) {
                Ok(chunk) => Some(chunk),
                Err(e) => {
                    warn!(chunk_id = %record.id, error = %e, "Malformed chunk payload, ignored");
                    None
                }
            }));
            newest.sort_by(recency_order);
            newest.truncate(keep);

            match page.next_offset {
                Some(next) if offset.as_deref() != Some(next.as_str()) => offset = Some(next),
                _ => break,
            }
        }

        Ok(newest)
    }

    pub async fn extract_insights(&self, dry_run: bool) -> Result<InsightReport> {
        let cfg = &self.settings.insights;
        let high = self
            .partition(Condition::gte(fields::QUALITY_SCORE, cfg.high_threshold as f64))
            .await?;
        let low = self
            .partition(Condition::lte(fields::QUALITY_SCORE, cfg.low_threshold as f64))
            .await?;

        let mut report = InsightReport {
            dry_run,
            ..Default::default()
        };

        if high.is_empty() || low.is_empty() {
            info!(high = high.len(), low = low.len(), "Insufficient data for insight extraction");
            report.status = InsightStatus::InsufficientData;
            return Ok(report);
        }

        let pairs = pair_chunks(high, low);
        report.pairs = pairs.len();
        info!(pairs = pairs.len(), batch_size = cfg.pairs_per_batch, dry_run, "Extracting insights");

        for (batch_index, batch) in pairs.chunks(cfg.pairs_per_batch.max(1)).enumerate() {
            report.batches += 1;
            let prompt = insight_prompt(batch, cfg.max_chunk_chars);

            let response = match self.llm.generate(&prompt, &self.settings.generation).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(batch_index, error = %e, "Insight batch failed, skipping");
                    metrics::counter!("distill_insight_batches_failed_total").increment(1);
                    report.failed_batches += 1;
                    self.emit(DistillEvent::InsightBatchFailed {
                        batch_index,
                        reason: e.to_string(),
                        timestamp: Utc::now(),
                    })
                    .await;
                    continue;
                }
            };

            let candidates = parse_bullets(&response.text, batch, cfg.min_rule_chars, cfg.max_rule_chars);
            let found = candidates.len();
            report.candidates_found += found;

            for candidate in candidates {
                let outcome = match self.rules.add_rule(candidate, dry_run).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(batch_index, error = %e, "Rule manager rejected insight candidate, skipping");
                        metrics::counter!("distill_insight_rule_failures_total").increment(1);
                        report.rule_failures += 1;
                        continue;
                    }
                };
                match outcome.reason {
                    AddRuleReason::Duplicate => report.duplicates += 1,
                    AddRuleReason::Capacity => report.staged += 1,
                    _ => {}
                }
                if outcome.applied {
                    report.applied += 1;
                }
            }

            debug!(batch_index, pairs = batch.len(), candidates = found, "Insight batch completed");
            self.emit(DistillEvent::InsightBatchCompleted {
                batch_index,
                pairs: batch.len(),
                candidates: found,
                timestamp: Utc::now(),
            })
            .await;
        }

        metrics::counter!("distill_insight_candidates_total").increment(report.candidates_found as u64);
        info!(
            candidates = report.candidates_found,
            applied = report.applied,
            duplicates = report.duplicates,
            failed_batches = report.failed_batches,
            "Insight extraction finished"
        );
        Ok(report)
    }

    async fn emit(&self, event: DistillEvent) {
        if let Err(e) = self.event_bus.publish(event).await {
            debug!(error = %e, "Event not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::prompts::INSIGHT_MARKER;
    use crate::application::rule_manager::RuleManagerConfig;
    use crate::domain::llm::{GenerationResponse, LLMError};
    use crate::domain::QualityScore;
    use crate::infrastructure::event_bus::BroadcastEventBus;
    use crate::infrastructure::in_memory_vector_store::InMemoryVectorStore;
    use crate::domain::{CommitId, RuleChange, RuleCommit, RuleDocument};
    use crate::infrastructure::repository::{RuleStore, RuleStoreError};
    use crate::infrastructure::rule_store::InMemoryRuleStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn chunk(id: &str, session: &str, days_ago: i64) -> SessionChunk {
        let base: DateTime<Utc> = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        SessionChunk::pending(id, session, format!("text of {}", id), base - Duration::days(days_ago))
    }

    /// Fails every call whose number is listed, otherwise returns `reply`
    struct MockLLM {
        reply: String,
        fail_on: Vec<usize>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LLMProvider for MockLLM {
        async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
            assert!(prompt.starts_with(INSIGHT_MARKER));
            let call = self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            if self.fail_on.contains(&call) {
                return Err(LLMError::Timeout(std::time::Duration::from_secs(1)));
            }
            Ok(GenerationResponse::text("mock", "mock", self.reply.clone()))
        }

        async fn health_check(&self) -> Result<(), LLMError> {
            Ok(())
        }
    }

    #[test]
    fn test_pairing_is_bounded_by_smaller_side() {
        let high = vec![chunk("h1", "a", 3), chunk("h2", "b", 1), chunk("h3", "c", 2)];
        let low = vec![chunk("l1", "d", 5), chunk("l2", "e", 0)];

        let pairs = pair_chunks(high, low);
        assert_eq!(pairs.len(), 2);
        assert_eq!((pairs[0].high.id.as_str(), pairs[0].low.id.as_str()), ("h2", "l2"));
        assert_eq!((pairs[1].high.id.as_str(), pairs[1].low.id.as_str()), ("h3", "l1"));
    }

    #[test]
    fn test_pairing_ties_break_on_id() {
        let high = vec![chunk("hb", "a", 1), chunk("ha", "a", 1)];
        let low = vec![chunk("l1", "b", 1)];
        assert_eq!(pair_chunks(high, low)[0].high.id, "ha");
    }

    #[test]
    fn test_parse_bullets_attribution_and_length() {
        let pairs = pair_chunks(vec![chunk("h1", "s1", 0), chunk("h2", "s3", 1)], vec![chunk("l1", "s2", 0), chunk("l2", "s4", 1)]);
        let response = "Here are the rules:\n\
                        - [PAIR 2] Run the test suite before committing\n\
                        - Ask before deleting any file\n\
                        * Not a dash bullet at all\n\
                        - short\n\
                        - [PAIR 9] Check imports before running scripts";
        let candidates = parse_bullets(response, &pairs, 10, 200);

        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].text, "Run the test suite before committing");
        assert_eq!(candidates[0].source_session_ids, vec!["s3", "s4"]);
        assert_eq!(candidates[1].source_session_ids, vec!["s1", "s2", "s3", "s4"]);
        assert_eq!(candidates[2].source_session_ids.len(), 4);
        assert!(candidates.iter().all(|c| c.origin_type == OriginType::InsightExtraction));
    }

    #[test]
    fn test_parse_bullets_upper_bound_is_exclusive() {
        let pairs = pair_chunks(vec![chunk("h1", "s1", 0)], vec![chunk("l1", "s2", 0)]);
        let exact = format!("- {}", "x".repeat(200));
        let under = format!("- {}", "y".repeat(199));
        let candidates = parse_bullets(&format!("{}\n{}", exact, under), &pairs, 10, 200);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].text.starts_with('y'));
    }

    async fn seeded_store(scores: &[(&str, &str, u8)]) -> Arc<InMemoryVectorStore> {
        let store = Arc::new(InMemoryVectorStore::new());
        for (id, session, score) in scores {
            let mut chunk = chunk(id, session, 0);
            chunk.quality_score = Some(QualityScore::new(*score as i64).unwrap());
            chunk.pending_score = false;
            store.upsert("session_chunks", id, vec![0.0; 4], chunk.to_payload()).await.unwrap();
        }
        store
    }

    fn extractor(store: Arc<InMemoryVectorStore>, llm: MockLLM, pairs_per_batch: usize) -> (InsightExtractor, Arc<RuleManager>) {
        extractor_with_rules(store, llm, pairs_per_batch, Arc::new(InMemoryRuleStore::new()))
    }

    fn extractor_with_rules(
        store: Arc<InMemoryVectorStore>,
        llm: MockLLM,
        pairs_per_batch: usize,
        rule_store: Arc<dyn RuleStore>,
    ) -> (InsightExtractor, Arc<RuleManager>) {
        let bus = Arc::new(BroadcastEventBus::new(64));
        let rules = Arc::new(RuleManager::new(rule_store, bus.clone(), RuleManagerConfig::default()));
        let mut settings = ExtractorSettings::default();
        settings.insights.pairs_per_batch = pairs_per_batch;
        (InsightExtractor::new(store, Arc::new(llm), rules.clone(), bus, settings), rules)
    }

    /// Loads fine, refuses every write
    struct ReadOnlyRuleStore;

    #[async_trait]
    impl RuleStore for ReadOnlyRuleStore {
        async fn load(&self) -> Result<RuleDocument, RuleStoreError> {
            Ok(RuleDocument::default())
        }

        async fn commit(&self, _: u64, _: &str, _: Vec<RuleChange>) -> Result<RuleCommit, RuleStoreError> {
            Err(RuleStoreError::Storage(anyhow::anyhow!("rules directory is read-only")))
        }

        async fn history(&self, _: usize) -> Result<Vec<RuleCommit>, RuleStoreError> {
            Ok(vec![])
        }

        async fn find_commit(&self, _: CommitId) -> Result<Option<RuleCommit>, RuleStoreError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_insufficient_data_asks_nothing() {
        let store = seeded_store(&[("h1", "s1", 9), ("m1", "s2", 5)]).await;
        let llm = MockLLM {
            reply: String::new(),
            fail_on: vec![],
            calls: AtomicUsize::new(0),
        };
        let (extractor, _) = extractor(store, llm, 5);

        let report = extractor.extract_insights(false).await.unwrap();
        assert_eq!(report.status, InsightStatus::InsufficientData);
        assert_eq!(report.candidates_found, 0);
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_the_others() {
        let store = seeded_store(&[("h1", "s1", 9), ("h2", "s2", 8), ("l1", "s3", 1), ("l2", "s4", 2)]).await;
        let llm = MockLLM {
            reply: "- [PAIR 1] Run the test suite before committing".into(),
            fail_on: vec![0],
            calls: AtomicUsize::new(0),
        };
        let (extractor, rules) = extractor(store, llm, 1);

        let report = extractor.extract_insights(false).await.unwrap();
        assert_eq!(report.batches, 2);
        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(rules.document().await.unwrap().rules.len(), 1);

        // Second pass finds the same bullet and rejects it as a duplicate
        let report = extractor.extract_insights(false).await.unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.duplicates, 2);
    }

    #[tokio::test]
    async fn test_dry_run_writes_no_rules() {
        let store = seeded_store(&[("h1", "s1", 9), ("l1", "s3", 1)]).await;
        let llm = MockLLM {
            reply: "- Run the test suite before committing".into(),
            fail_on: vec![],
            calls: AtomicUsize::new(0),
        };
        let (extractor, rules) = extractor(store, llm, 5);

        let report = extractor.extract_insights(true).await.unwrap();
        assert_eq!(report.candidates_found, 1);
        assert_eq!(report.applied, 0);
        assert!(rules.document().await.unwrap().rules.is_empty());
    }

    #[tokio::test]
    async fn test_rule_store_failure_is_counted_and_batches_continue() {
        let store = seeded_store(&[("h1", "s1", 9), ("h2", "s2", 8), ("l1", "s3", 1), ("l2", "s4", 2)]).await;
        let llm = MockLLM {
            reply: "- Run the test suite before committing".into(),
            fail_on: vec![],
            calls: AtomicUsize::new(0),
        };
        let (extractor, _) = extractor_with_rules(store, llm, 1, Arc::new(ReadOnlyRuleStore));

        let report = extractor.extract_insights(false).await.unwrap();
        assert_eq!(report.batches, 2);
        assert_eq!(report.failed_batches, 0);
        assert_eq!(report.candidates_found, 2);
        assert_eq!(report.rule_failures, 2);
        assert_eq!(report.applied, 0);
    }

    #[tokio::test]
    async fn test_newest_chunks_are_paired_when_partition_exceeds_scroll_limit() {
        let store = Arc::new(InMemoryVectorStore::new());
        // Ids sort oldest first so a single unpaged read would see only the old chunks.
        for (id, session, score, days_ago) in [
            ("a-old-high", "s-old-high", 9u8, 30),
            ("b-new-high", "s-new-high", 9, 0),
            ("c-old-low", "s-old-low", 1, 30),
            ("d-new-low", "s-new-low", 1, 0),
        ] {
            let mut chunk = chunk(id, session, days_ago);
            chunk.quality_score = Some(QualityScore::new(score as i64).unwrap());
            chunk.pending_score = false;
            store.upsert("session_chunks", id, vec![0.0; 4], chunk.to_payload()).await.unwrap();
        }
        let llm = MockLLM {
            reply: "- Run the test suite before committing".into(),
            fail_on: vec![],
            calls: AtomicUsize::new(0),
        };
        let (mut extractor, rules) = extractor(store, llm, 5);
        extractor.settings.insights.scroll_limit = 1;

        let report = extractor.extract_insights(false).await.unwrap();
        assert_eq!(report.pairs, 1);
        assert_eq!(report.applied, 1);

        let doc = rules.document().await.unwrap();
        assert_eq!(doc.rules[0].source_session_ids, vec!["s-new-high", "s-new-low"]);
    }
}

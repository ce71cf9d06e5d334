// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # ReflectionGenerator - Failure Post-Mortems
//!
//! For each session: detect failures, ask for one root-cause analysis per
//! failure in a single batched call, then store every parsable reflection
//! in the vector store and forward its prevention rule to the
//! [`RuleManager`].
//!
//! Reflections are keyed by `(session_id, failure_index)` so a re-run
//! overwrites instead of duplicating. A missing or malformed block drops
//! only that failure. Embedding and storage errors are logged per item.

use anyhow::{Context, Result};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::prompts::reflection_prompt;
use crate::application::rule_manager::RuleManager;
use crate::application::EventBus;
use crate::domain::config::{DistillConfig, ReflectionConfig};
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::llm::{GenerationOptions, LLMProvider};
use crate::domain::reflection::fields;
use crate::domain::{
    Condition, DistillEvent, FailureSignal, Filter, OriginType, ParsedReflection, Reflection, RuleCandidate,
    Transcript,
};
use crate::infrastructure::llm::generation_options;
use crate::infrastructure::repository::{TranscriptSource, VectorStore};

/// Classifier boundary: which parts of a transcript went wrong
pub trait FailureDetector: Send + Sync {
    fn detect(&self, transcript: &Transcript) -> Vec<FailureSignal>;
}

static BLOCK_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*[*#_]*[ \t]*FAILURE[ \t]+(\d+)[ \t]*[*_]*[ \t]*:[*_]*").expect("header regex is valid")
});

static FIELD_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*[*_]*(ROOT_CAUSE|REFLECTION|PREVENTION_RULE)[*_]*[ \t]*:[*_]*").expect("label regex is valid")
});

/// Split a response into `count` slots, one per failure.
///
/// Blocks are located by their `FAILURE N:` header; when a number repeats
/// the first block wins. Slots without a well-formed block are `None`.
pub fn parse_reflections(response: &str, count: usize) -> Vec<Option<ParsedReflection>> {
    let headers: Vec<(usize, usize, usize)> = BLOCK_HEADER
        .captures_iter(response)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let n = caps[1].parse::<usize>().ok()?;
            Some((n, whole.start(), whole.end()))
        })
        .collect();

    let mut blocks: HashMap<usize, &str> = HashMap::new();
    for (i, (n, _, body_start)) in headers.iter().enumerate() {
        let body_end = headers.get(i + 1).map_or(response.len(), |(_, start, _)| *start);
        blocks.entry(*n).or_insert(&response[*body_start..body_end]);
    }

    (1..=count).map(|n| blocks.get(&n).and_then(|block| parse_block(block))).collect()
}

fn parse_block(block: &str) -> Option<ParsedReflection> {
    let labels: Vec<(&str, usize, usize)> = FIELD_LABEL
        .captures_iter(block)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((caps.get(1)?.as_str(), whole.start(), whole.end()))
        })
        .collect();

    let mut values: HashMap<&str, &str> = HashMap::new();
    for (i, (label, _, value_start)) in labels.iter().enumerate() {
        let value_end = labels.get(i + 1).map_or(block.len(), |(_, start, _)| *start);
        values.entry(*label).or_insert(block[*value_start..value_end].trim());
    }

    let root_cause = values.get("ROOT_CAUSE").filter(|v| !v.is_empty())?;
    let reflection = values.get("REFLECTION").filter(|v| !v.is_empty())?;
    let prevention_rule = values.get("PREVENTION_RULE")?;

    Some(ParsedReflection {
        root_cause: root_cause.to_string(),
        reflection: reflection.to_string(),
        prevention_rule: prevention_rule.lines().next().unwrap_or_default().trim().to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct ReflectorSettings {
    pub reflections: ReflectionConfig,
    pub collection: String,
    pub generation: GenerationOptions,
}

impl Default for ReflectorSettings {
    fn default() -> Self {
        Self {
            reflections: ReflectionConfig::default(),
            collection: "reflections".to_string(),
            generation: GenerationOptions::default(),
        }
    }
}

impl ReflectorSettings {
    pub fn from_config(config: &DistillConfig) -> Self {
        Self {
            reflections: config.reflections.clone(),
            collection: config.vector_store.reflections_collection.clone(),
            generation: generation_options(&config.generation),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReflectionReport {
    pub session_id: String,
    pub failures_detected: usize,
    pub reflections_stored: usize,
    pub dropped: usize,
    pub rules_forwarded: usize,
    pub rules_applied: usize,
    /// Prevention rules the rule manager could not persist
    pub rules_failed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReflectionRunReport {
    pub sessions_processed: usize,
    /// Already reflected on and not forced
    pub sessions_skipped: usize,
    pub sessions_missing: usize,
    /// Sessions abandoned on a store or transcript error
    pub sessions_failed: usize,
    pub failures_detected: usize,
    pub reflections_stored: usize,
    pub dropped: usize,
    pub rules_applied: usize,
    pub rules_failed: usize,
}

impl ReflectionRunReport {
    fn absorb(&mut self, session: &SessionReflectionReport) {
        self.sessions_processed += 1;
        self.failures_detected += session.failures_detected;
        self.reflections_stored += session.reflections_stored;
        self.dropped += session.dropped;
        self.rules_applied += session.rules_applied;
        self.rules_failed += session.rules_failed;
    }
}

enum SessionRun {
    Processed(SessionReflectionReport),
    AlreadyReflected,
    Missing,
}

pub struct ReflectionGenerator {
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LLMProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    detector: Arc<dyn FailureDetector>,
    rules: Arc<RuleManager>,
    event_bus: Arc<dyn EventBus>,
    settings: ReflectorSettings,
}

impl ReflectionGenerator {
    pub fn new(
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LLMProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        detector: Arc<dyn FailureDetector>,
        rules: Arc<RuleManager>,
        event_bus: Arc<dyn EventBus>,
        settings: ReflectorSettings,
    ) -> Self {
        Self {
            store,
            llm,
            embedder,
            detector,
            rules,
            event_bus,
            settings,
        }
    }

    pub async fn process_session(&self, transcript: &Transcript) -> Result<SessionReflectionReport> {
        let session_id = transcript.session_id.as_str();
        let mut failures = self.detector.detect(transcript);
        let mut report = SessionReflectionReport {
            session_id: session_id.to_string(),
            failures_detected: failures.len(),
            ..Default::default()
        };

        let cap = self.settings.reflections.max_failures_per_session;
        if failures.len() > cap {
            info!(session_id, detected = failures.len(), cap, "Capping failures for session");
            failures.truncate(cap);
        }
        if failures.is_empty() {
            debug!(session_id, "No failures detected");
            return Ok(report);
        }

        let prompt = reflection_prompt(transcript, &failures, self.settings.reflections.max_context_chars);
        let response = match self.llm.generate(&prompt, &self.settings.generation).await {
            Ok(response) => response,
            Err(e) => {
                warn!(session_id, error = %e, "Reflection generation failed for session");
                report.dropped = failures.len();
                for failure_index in 1..=failures.len() {
                    self.dropped(session_id, failure_index, e.to_string()).await;
                }
                return Ok(report);
            }
        };

        let parsed = parse_reflections(&response.text, failures.len());
        for (i, (failure, parsed)) in failures.iter().zip(parsed).enumerate() {
            let failure_index = i + 1;
            let Some(parsed) = parsed else {
                report.dropped += 1;
                self.dropped(session_id, failure_index, "no parsable block".to_string()).await;
                continue;
            };

            let reflection = Reflection::new(session_id, failure_index, failure, parsed, transcript.date);
            if let Err(reason) = self.store_reflection(&reflection).await {
                warn!(session_id, failure_index, error = %reason, "Failed to store reflection");
                report.dropped += 1;
                self.dropped(session_id, failure_index, reason).await;
                continue;
            }
            report.reflections_stored += 1;
            metrics::counter!("distill_reflections_stored_total").increment(1);
            self.emit(DistillEvent::ReflectionStored {
                reflection_id: reflection.id,
                session_id: session_id.to_string(),
                failure_index,
                timestamp: Utc::now(),
            })
            .await;

            let rule = reflection.prevention_rule.trim();
            if rule.is_empty() {
                continue;
            }
            report.rules_forwarded += 1;
            let candidate = RuleCandidate::new(rule, OriginType::Reflection, vec![session_id.to_string()]);
            match self.rules.add_rule(candidate, false).await {
                Ok(outcome) if outcome.applied => report.rules_applied += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(session_id, failure_index, error = %e, "Rule manager rejected prevention rule");
                    metrics::counter!("distill_reflection_rule_failures_total").increment(1);
                    report.rules_failed += 1;
                }
            }
        }

        info!(
            session_id,
            failures = report.failures_detected,
            stored = report.reflections_stored,
            dropped = report.dropped,
            "Session reflected"
        );
        Ok(report)
    }

    async fn store_reflection(&self, reflection: &Reflection) -> std::result::Result<(), String> {
        let vector = self.embedder.embed(&reflection.summary()).await.map_err(|e| e.to_string())?;
        self.store
            .upsert(&self.settings.collection, &reflection.id.to_string(), vector, reflection.to_payload())
            .await
            .map_err(|e| format!("{:#}", e))
    }

    async fn already_reflected(&self, session_id: &str) -> Result<bool> {
        let filter = Filter::must([Condition::equals(fields::SESSION_ID, session_id)]);
        let count = self
            .store
            .count(&self.settings.collection, &filter)
            .await
            .context("Failed to count existing reflections")?;
        Ok(count > 0)
    }

    /// Reflect on every session the source knows, or only `session_id`.
    ///
    /// Sessions that already have reflections are skipped unless `force`.
    pub async fn process_all(
        &self,
        source: &dyn TranscriptSource,
        session_id: Option<&str>,
        force: bool,
    ) -> Result<ReflectionRunReport> {
        let sessions = match session_id {
            Some(id) => vec![id.to_string()],
            None => source.list_sessions().await.context("Failed to list sessions")?,
        };

        let mut report = ReflectionRunReport::default();
        for session_id in &sessions {
            match self.process_one(source, session_id, force).await {
                Ok(SessionRun::Processed(session)) => report.absorb(&session),
                Ok(SessionRun::AlreadyReflected) => {
                    debug!(session_id = %session_id, "Session already reflected, skipping");
                    report.sessions_skipped += 1;
                }
                Ok(SessionRun::Missing) => {
                    warn!(session_id = %session_id, "Transcript not found");
                    report.sessions_missing += 1;
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %format!("{:#}", e), "Session reflection failed, continuing");
                    metrics::counter!("distill_reflection_sessions_failed_total").increment(1);
                    report.sessions_failed += 1;
                }
            }
        }

        info!(
            processed = report.sessions_processed,
            skipped = report.sessions_skipped,
            failed = report.sessions_failed,
            stored = report.reflections_stored,
            "Reflection run finished"
        );
        Ok(report)
    }

    async fn process_one(&self, source: &dyn TranscriptSource, session_id: &str, force: bool) -> Result<SessionRun> {
        if !force && self.already_reflected(session_id).await? {
            return Ok(SessionRun::AlreadyReflected);
        }
        let Some(transcript) = source
            .load(session_id)
            .await
            .with_context(|| format!("Failed to load transcript {}", session_id))?
        else {
            return Ok(SessionRun::Missing);
        };
        Ok(SessionRun::Processed(self.process_session(&transcript).await?))
    }

    async fn dropped(&self, session_id: &str, failure_index: usize, reason: String) {
        metrics::counter!("distill_reflections_dropped_total").increment(1);
        self.emit(DistillEvent::ReflectionDropped {
            session_id: session_id.to_string(),
            failure_index,
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
}

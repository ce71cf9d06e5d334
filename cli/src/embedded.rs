// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-process pipeline wiring
//!
//! Every command is a short-lived batch run: load the manifest, build the
//! stores, health-check the external services the command needs, run, exit.
//! Health checks happen before any mutation, so an unreachable dependency
//! aborts the command with nothing written.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use aegis_distill::application::{
    EventBus, ExtractorSettings, InsightExtractor, JobRunner, PipelineServices, QualityScorer, ReflectionGenerator,
    ReflectorSettings, ReinforcementTracker, RuleManager, RuleManagerConfig, ScorerSettings,
};
use aegis_distill::domain::config::{
    resolve_secret, DistillConfig, DistillConfigManifest, EmbeddingProviderKind, VectorBackend,
};
use aegis_distill::domain::embedding::EmbeddingProvider;
use aegis_distill::domain::llm::LLMProvider;
use aegis_distill::domain::DistillError;
use aegis_distill::infrastructure::llm::build_provider;
use aegis_distill::infrastructure::{
    BroadcastEventBus, DirectoryTranscriptSource, FileJobRepository, FileRuleStore, HashEmbeddingClient,
    InMemoryVectorStore, JobRepository, MarkerFailureDetector, OllamaEmbeddingClient, QdrantVectorStore,
    TranscriptSource, VectorStore,
};

/// Buffered events before a slow printer starts dropping lines
const EVENT_CAPACITY: usize = 4096;

pub struct EmbeddedPipeline {
    config: DistillConfig,
    event_bus: Arc<BroadcastEventBus>,
    rules: Arc<RuleManager>,
    jobs: Arc<dyn JobRepository>,
}

impl EmbeddedPipeline {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let manifest = DistillConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
        manifest.validate().context("Configuration validation failed")?;
        Ok(Self::from_config(manifest.spec))
    }

    pub fn from_config(config: DistillConfig) -> Self {
        let event_bus = Arc::new(BroadcastEventBus::new(EVENT_CAPACITY));
        let rule_store = Arc::new(FileRuleStore::new(config.state_dir.join("rules"), config.rules.max_active));
        let rules = Arc::new(RuleManager::new(
            rule_store,
            event_bus.clone(),
            RuleManagerConfig::from_config(&config),
        ));
        let jobs: Arc<dyn JobRepository> = Arc::new(FileJobRepository::new(config.state_dir.join("jobs")));

        info!(mode = %config.mode, state_dir = ?config.state_dir, "Pipeline initialized");
        Self {
            config,
            event_bus,
            rules,
            jobs,
        }
    }

    pub fn config(&self) -> &DistillConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &BroadcastEventBus {
        &self.event_bus
    }

    pub fn rules(&self) -> Arc<RuleManager> {
        self.rules.clone()
    }

    pub fn jobs(&self) -> Arc<dyn JobRepository> {
        self.jobs.clone()
    }

    fn bus(&self) -> Arc<dyn EventBus> {
        self.event_bus.clone()
    }

    pub fn tracker(&self) -> ReinforcementTracker {
        ReinforcementTracker::new(self.rules.clone(), self.bus())
    }

    async fn vector_store(&self) -> Result<Arc<dyn VectorStore>> {
        let cfg = &self.config.vector_store;
        match cfg.backend {
            VectorBackend::Memory => {
                debug!("Using in-memory vector store");
                Ok(Arc::new(InMemoryVectorStore::new()))
            }
            VectorBackend::Qdrant => {
                let api_key = cfg.api_key.as_deref().map(resolve_secret).transpose()?;
                let store = QdrantVectorStore::new(&cfg.url, api_key, cfg.timeout)
                    .map_err(|e| DistillError::unavailable("vector store", format!("{:#}", e)))?;
                store
                    .health_check()
                    .await
                    .map_err(|e| DistillError::unavailable("vector store", format!("{:#}", e)))?;
                store
                    .ensure_collection(&cfg.reflections_collection, self.config.embedding.dimension as u64)
                    .await
                    .context("Failed to prepare reflections collection")?;
                info!(url = %cfg.url, "Vector store reachable");
                Ok(Arc::new(store))
            }
        }
    }

    async fn generation(&self) -> Result<Arc<dyn LLMProvider>> {
        let provider = build_provider(&self.config.generation)?;
        provider
            .health_check()
            .await
            .map_err(|e| DistillError::at_startup("generation service", e))?;
        info!(endpoint = %self.config.generation.endpoint, "Generation service reachable");
        Ok(provider)
    }

    async fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let cfg = &self.config.embedding;
        let embedder: Arc<dyn EmbeddingProvider> = match cfg.provider {
            EmbeddingProviderKind::Hash => Arc::new(HashEmbeddingClient::new(cfg.dimension)),
            EmbeddingProviderKind::Ollama => Arc::new(OllamaEmbeddingClient::new(
                cfg.endpoint.clone(),
                cfg.model.clone(),
                cfg.dimension,
                cfg.timeout,
            )),
        };
        embedder
            .health_check()
            .await
            .map_err(|e| DistillError::unavailable("embedding service", e))?;
        Ok(embedder)
    }

    fn transcripts(&self) -> Option<Arc<dyn TranscriptSource>> {
        self.config
            .transcripts_dir
            .as_ref()
            .map(|dir| Arc::new(DirectoryTranscriptSource::new(dir.clone())) as Arc<dyn TranscriptSource>)
    }

    pub fn require_transcripts(&self) -> Result<Arc<dyn TranscriptSource>> {
        let source = self
            .transcripts()
            .context("No transcripts directory configured (spec.transcripts_dir)")?;
        if let Some(dir) = &self.config.transcripts_dir {
            if !dir.is_dir() {
                anyhow::bail!("Transcripts directory {:?} does not exist", dir);
            }
        }
        Ok(source)
    }

    pub async fn scorer(&self) -> Result<QualityScorer> {
        let store = self.vector_store().await?;
        let llm = self.generation().await?;
        Ok(QualityScorer::new(store, llm, self.bus(), ScorerSettings::from_config(&self.config)))
    }

    pub async fn extractor(&self) -> Result<InsightExtractor> {
        let store = self.vector_store().await?;
        let llm = self.generation().await?;
        Ok(InsightExtractor::new(
            store,
            llm,
            self.rules.clone(),
            self.bus(),
            ExtractorSettings::from_config(&self.config),
        ))
    }

    pub async fn reflector(&self) -> Result<ReflectionGenerator> {
        let store = self.vector_store().await?;
        let llm = self.generation().await?;
        let embedder = self.embedder().await?;
        Ok(self.reflector_with(store, llm, embedder))
    }

    fn reflector_with(
        &self,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LLMProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> ReflectionGenerator {
        ReflectionGenerator::new(
            store,
            llm,
            embedder,
            Arc::new(MarkerFailureDetector::new()),
            self.rules.clone(),
            self.bus(),
            ReflectorSettings::from_config(&self.config),
        )
    }

    /// Runner with every service a queued job may need, all health-checked
    pub async fn job_runner(&self) -> Result<JobRunner> {
        let store = self.vector_store().await?;
        let llm = self.generation().await?;
        let embedder = self.embedder().await?;

        let services = PipelineServices {
            scorer: Arc::new(QualityScorer::new(
                store.clone(),
                llm.clone(),
                self.bus(),
                ScorerSettings::from_config(&self.config),
            )),
            extractor: Arc::new(InsightExtractor::new(
                store.clone(),
                llm.clone(),
                self.rules.clone(),
                self.bus(),
                ExtractorSettings::from_config(&self.config),
            )),
            reflector: Arc::new(self.reflector_with(store, llm, embedder)),
            rules: self.rules.clone(),
            transcripts: self.transcripts(),
        };
        Ok(JobRunner::new(self.jobs.clone(), services))
    }
}

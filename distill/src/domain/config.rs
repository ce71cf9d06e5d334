// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Distill Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) for the
// distillation pipeline:
// - Operating mode (autonomous / supervised / manual)
// - Vector store, generation and embedding endpoints with timeouts
// - Batch bounds for scoring and insight extraction
// - Rule capacity and staleness policy

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "DistillConfig";
pub const CONFIG_ENV_VAR: &str = "AEGIS_DISTILL_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistillConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "DistillConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: DistillConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistillConfig {
    /// How accepted rules enter the store
    #[serde(default)]
    pub mode: OperatingMode,

    /// Rule store and job queue live here
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Session transcripts for reflection generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcripts_dir: Option<PathBuf>,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub insights: InsightConfig,

    #[serde(default)]
    pub reflections: ReflectionConfig,

    #[serde(default)]
    pub rules: RuleConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Accepted rules go active immediately (capacity permitting)
    Autonomous,
    /// Accepted rules are proposed; `apply` activates all pending proposals
    #[default]
    Supervised,
    /// Accepted rules are proposed; `apply` activates only selected ids
    Manual,
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperatingMode::Autonomous => "autonomous",
            OperatingMode::Supervised => "supervised",
            OperatingMode::Manual => "manual",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for OperatingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "autonomous" => Ok(OperatingMode::Autonomous),
            "supervised" => Ok(OperatingMode::Supervised),
            "manual" => Ok(OperatingMode::Manual),
            other => anyhow::bail!("Unknown operating mode: '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    #[default]
    Qdrant,
    /// Process-local store, for dry runs and tests
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub backend: VectorBackend,

    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_chunks_collection")]
    pub chunks_collection: String,

    #[serde(default = "default_reflections_collection")]
    pub reflections_collection: String,

    #[serde(default = "default_store_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            url: default_qdrant_url(),
            api_key: None,
            chunks_collection: default_chunks_collection(),
            reflections_collection: default_reflections_collection(),
            timeout: default_store_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationProviderKind {
    #[default]
    Ollama,
    /// OpenAI or any OpenAI-compatible endpoint (vLLM, LM Studio)
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub provider: GenerationProviderKind,

    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    /// API key (supports "env:VAR_NAME")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_generation_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProviderKind::default(),
            endpoint: default_ollama_endpoint(),
            model: default_generation_model(),
            api_key: None,
            timeout: default_generation_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    #[default]
    Ollama,
    /// Deterministic hash vectors; no semantic similarity, offline only
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,

    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default = "default_store_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            endpoint: default_ollama_endpoint(),
            model: default_embedding_model(),
            dimension: default_dimension(),
            timeout: default_store_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Chunks selected per invocation
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Wall-clock budget for one invocation
    #[serde(default = "default_time_budget", with = "humantime_serde")]
    pub time_budget: Duration,

    /// Outstanding generation calls
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Characters of chunk text sent to the scorer
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            time_budget: default_time_budget(),
            concurrency: default_concurrency(),
            max_chunk_chars: default_max_chunk_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightConfig {
    #[serde(default = "default_high_threshold")]
    pub high_threshold: u8,

    #[serde(default = "default_low_threshold")]
    pub low_threshold: u8,

    #[serde(default = "default_pairs_per_batch")]
    pub pairs_per_batch: usize,

    /// Accepted rule length band is `[min_rule_chars, max_rule_chars)`
    #[serde(default = "default_min_rule_chars")]
    pub min_rule_chars: usize,

    #[serde(default = "default_max_rule_chars")]
    pub max_rule_chars: usize,

    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Upper bound on chunks read per partition
    #[serde(default = "default_batch_size")]
    pub scroll_limit: usize,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            high_threshold: default_high_threshold(),
            low_threshold: default_low_threshold(),
            pairs_per_batch: default_pairs_per_batch(),
            min_rule_chars: default_min_rule_chars(),
            max_rule_chars: default_max_rule_chars(),
            max_chunk_chars: default_max_chunk_chars(),
            scroll_limit: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    #[serde(default = "default_max_failures")]
    pub max_failures_per_session: usize,

    /// Characters of failure context quoted in the prompt
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            max_failures_per_session: default_max_failures(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default = "default_max_active")]
    pub max_active: usize,

    #[serde(default = "default_staleness_days")]
    pub staleness_days: i64,

    #[serde(default = "default_min_reinforcement")]
    pub min_reinforcement: u64,

    /// Token-overlap ratio at or above which two rules are duplicates
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Attempts at a conflicting rule store commit before giving up
    #[serde(default = "default_commit_retries")]
    pub commit_retries: u32,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            max_active: default_max_active(),
            staleness_days: default_staleness_days(),
            min_reinforcement: default_min_reinforcement(),
            similarity_threshold: default_similarity_threshold(),
            commit_retries: default_commit_retries(),
        }
    }
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::default(),
            state_dir: default_state_dir(),
            transcripts_dir: None,
            vector_store: VectorStoreConfig::default(),
            generation: GenerationConfig::default(),
            embedding: EmbeddingConfig::default(),
            scoring: ScoringConfig::default(),
            insights: InsightConfig::default(),
            reflections: ReflectionConfig::default(),
            rules: RuleConfig::default(),
        }
    }
}

impl Default for DistillConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "default-distill".to_string(),
                version: None,
                labels: None,
            },
            spec: DistillConfig::default(),
        }
    }
}

impl DistillConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. AEGIS_DISTILL_CONFIG environment variable
    /// 2. ./distill-config.yaml (working directory)
    /// 3. ~/.aegis/distill.yaml (user home)
    /// 4. /etc/aegis/distill.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./distill-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aegis").join("distill.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/aegis/distill.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path: fail if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Environment overrides for container deployments
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AEGIS_DISTILL_MODE") {
            match val.parse() {
                Ok(mode) => self.spec.mode = mode,
                Err(e) => tracing::warn!("Ignoring AEGIS_DISTILL_MODE: {}", e),
            }
        }
        if let Ok(val) = std::env::var("AEGIS_DISTILL_STATE_DIR") {
            self.spec.state_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("AEGIS_DISTILL_QDRANT_URL") {
            self.spec.vector_store.url = val;
        }
        if let Ok(val) = std::env::var("AEGIS_DISTILL_GENERATION_ENDPOINT") {
            self.spec.generation.endpoint = val;
        }
        if let Ok(val) = std::env::var("AEGIS_DISTILL_GENERATION_MODEL") {
            self.spec.generation.model = val;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;

        if spec.vector_store.backend == VectorBackend::Qdrant && spec.vector_store.url.is_empty() {
            anyhow::bail!("spec.vector_store.url cannot be empty for the qdrant backend");
        }
        if spec.vector_store.chunks_collection.is_empty() || spec.vector_store.reflections_collection.is_empty() {
            anyhow::bail!("spec.vector_store collections cannot be empty");
        }
        if spec.generation.endpoint.is_empty() || spec.generation.model.is_empty() {
            anyhow::bail!("spec.generation requires an endpoint and a model");
        }
        if spec.embedding.dimension == 0 {
            anyhow::bail!("spec.embedding.dimension must be positive");
        }
        if spec.scoring.batch_size == 0 || spec.scoring.concurrency == 0 {
            anyhow::bail!("spec.scoring.batch_size and concurrency must be positive");
        }

        let insights = &spec.insights;
        if insights.high_threshold > 10 || insights.low_threshold >= insights.high_threshold {
            anyhow::bail!(
                "spec.insights thresholds must satisfy low < high <= 10 (got low={}, high={})",
                insights.low_threshold,
                insights.high_threshold
            );
        }
        if insights.pairs_per_batch == 0 {
            anyhow::bail!("spec.insights.pairs_per_batch must be positive");
        }
        if insights.min_rule_chars >= insights.max_rule_chars {
            anyhow::bail!("spec.insights.min_rule_chars must be below max_rule_chars");
        }

        let rules = &spec.rules;
        let cap = crate::domain::rule::MAX_ACTIVE_RULES;
        if rules.max_active == 0 || rules.max_active > cap {
            anyhow::bail!("spec.rules.max_active must be within 1..={cap}");
        }
        if rules.staleness_days < 0 {
            anyhow::bail!("spec.rules.staleness_days cannot be negative");
        }
        if !(rules.similarity_threshold > 0.0 && rules.similarity_threshold <= 1.0) {
            anyhow::bail!("spec.rules.similarity_threshold must be within (0.0, 1.0]");
        }

        Ok(())
    }
}

/// Resolve "env:VAR_NAME" references; plain values pass through
pub fn resolve_secret(value: &str) -> anyhow::Result<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var)
            .map_err(|_| anyhow::anyhow!("Environment variable '{}' is not set", var)),
        None => Ok(value.to_string()),
    }
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".aegis").join("distill"))
        .unwrap_or_else(|| PathBuf::from(".aegis-distill"))
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

fn default_chunks_collection() -> String {
    "session_chunks".to_string()
}

fn default_reflections_collection() -> String {
    "reflections".to_string()
}

fn default_store_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_generation_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_embedding_model() -> String {
    "all-minilm".to_string()
}

fn default_generation_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_dimension() -> usize {
    384
}

fn default_batch_size() -> usize {
    1000
}

fn default_time_budget() -> Duration {
    Duration::from_secs(300)
}

fn default_concurrency() -> usize {
    4
}

fn default_max_chunk_chars() -> usize {
    1500
}

fn default_high_threshold() -> u8 {
    7
}

fn default_low_threshold() -> u8 {
    3
}

fn default_pairs_per_batch() -> usize {
    5
}

fn default_min_rule_chars() -> usize {
    10
}

fn default_max_rule_chars() -> usize {
    200
}

fn default_max_failures() -> usize {
    10
}

fn default_max_context_chars() -> usize {
    800
}

fn default_max_active() -> usize {
    crate::domain::rule::MAX_ACTIVE_RULES
}

fn default_staleness_days() -> i64 {
    60
}

fn default_min_reinforcement() -> u64 {
    1
}

fn default_similarity_threshold() -> f64 {
    0.8
}

fn default_commit_retries() -> u32 {
    5
}

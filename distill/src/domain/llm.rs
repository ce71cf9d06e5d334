// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Generation Service contract
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Anti-corruption layer over text-generation vendors

// Responses are untrusted text. Errors are classified so callers can tell
// "skip this item" apart from "abort the run".
//
// Implementations live in infrastructure/llm/.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion from the LLM
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError>;

    /// Check if provider is healthy and accessible
    async fn health_check(&self) -> Result<(), LLMError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 = deterministic)
    pub temperature: Option<f32>,

    pub stop_sequences: Option<Vec<String>>,

    /// Per-call deadline; adapters enforce it with `tokio::time::timeout`
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(1024),
            temperature: Some(0.2),
            stop_sequences: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl GenerationOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub usage: TokenUsage,

    /// Provider type (e.g., "openai", "ollama")
    pub provider: String,

    pub model: String,
    pub finish_reason: FinishReason,
}

impl GenerationResponse {
    /// Convenience constructor for fixed responses
    pub fn text(provider: &str, model: &str, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: TokenUsage::default(),
            provider: provider.to_string(),
            model: model.to_string(),
            finish_reason: FinishReason::Stop,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
}

#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LLMError {
    /// The provider cannot be reached or used at all, as opposed to one bad call
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            LLMError::Network(_) | LLMError::Authentication(_) | LLMError::ModelNotFound(_)
        )
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedding Clients
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Text → fixed-dimension vector for reflection summaries
//!
//! `OllamaEmbeddingClient` calls a local Ollama server. `HashEmbeddingClient`
//! is an offline fallback: token hashing into buckets, deterministic, with
//! no semantic similarity beyond shared words.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::domain::embedding::{EmbeddingError, EmbeddingProvider};

pub struct OllamaEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
    timeout: Duration,
}

#[derive(Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbeddingClient {
    pub fn new(endpoint: String, model: String, dimension: usize, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            model,
            dimension,
            timeout,
        }
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embeddings", self.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&OllamaEmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(if status == 404 {
                EmbeddingError::Unavailable(format!("model {} not found", self.model))
            } else {
                EmbeddingError::Provider(format!("HTTP {}: {}", status, error_text))
            });
        }

        let body: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Provider(format!("Failed to parse response: {}", e)))?;

        if body.embedding.len() != self.dimension {
            return Err(EmbeddingError::Dimension {
                expected: self.dimension,
                actual: body.embedding.len(),
            });
        }
        Ok(body.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        tokio::time::timeout(self.timeout, self.request(text))
            .await
            .map_err(|_| EmbeddingError::Timeout(self.timeout))?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        let url = format!("{}/api/tags", self.endpoint.trim_end_matches('/'));
        let response = tokio::time::timeout(self.timeout, self.client.get(&url).send())
            .await
            .map_err(|_| EmbeddingError::Timeout(self.timeout))?
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(EmbeddingError::Unavailable(format!("HTTP {}", response.status())))
        }
    }
}

/// Deterministic offline embedding
pub struct HashEmbeddingClient {
    dimension: usize,
}

impl HashEmbeddingClient {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbeddingClient {
    fn default() -> Self {
        // Matches all-MiniLM-L6-v2
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut embedding = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return Ok(embedding);
        }

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let hash = hasher.finish();
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) & 1 == 1 { -1.0 } else { 1.0 };
            embedding[bucket] += sign;
        }

        let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        Ok(())
    }
}

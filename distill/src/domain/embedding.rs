// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Embedding Service contract: text in, fixed-dimension vector out

use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Dimension of every vector this provider returns
    fn dimension(&self) -> usize;

    async fn health_check(&self) -> Result<(), EmbeddingError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding service unavailable: {0}")]
    Unavailable(String),

    #[error("Embedding request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Unexpected embedding dimension: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("Embedding provider error: {0}")]
    Provider(String),
}

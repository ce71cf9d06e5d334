// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Failure taxonomy
//!
//! | Variant | Effect |
//! |---------|--------|
//! | `ServiceUnavailable` | abort before any mutation, non-zero exit |
//! | `SoftParseFailure` | skip the item, state unchanged, batch continues |
//! | `CapacityRejected` | stage the rule as proposed |
//! | `DuplicateRejected` | no-op |
//! | `Timeout` | soft failure mid-run, unavailable at startup |

use std::time::Duration;

use super::embedding::EmbeddingError;
use super::llm::LLMError;

#[derive(Debug, thiserror::Error)]
pub enum DistillError {
    #[error("{service} unavailable: {reason}")]
    ServiceUnavailable { service: String, reason: String },

    #[error("unparsable response for {item}: {reason}")]
    SoftParseFailure { item: String, reason: String },

    #[error("no active slot left (capacity {capacity})")]
    CapacityRejected { capacity: usize },

    #[error("duplicate of an existing rule")]
    DuplicateRejected,

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },
}

impl DistillError {
    pub fn unavailable(service: impl Into<String>, reason: impl ToString) -> Self {
        DistillError::ServiceUnavailable {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    /// Item-local failures never abort a batch
    pub fn is_soft(&self) -> bool {
        !matches!(self, DistillError::ServiceUnavailable { .. })
    }

    /// Startup health checks treat every failure, timeouts included, as unavailability
    pub fn at_startup(service: &str, error: LLMError) -> Self {
        Self::unavailable(service, error)
    }
}

impl From<LLMError> for DistillError {
    fn from(error: LLMError) -> Self {
        match error {
            LLMError::Timeout(after) => DistillError::Timeout {
                operation: "generation".to_string(),
                after,
            },
            e if e.is_unavailable() => DistillError::unavailable("generation service", e),
            e => DistillError::SoftParseFailure {
                item: "generation".to_string(),
                reason: e.to_string(),
            },
        }
    }
}

impl From<EmbeddingError> for DistillError {
    fn from(error: EmbeddingError) -> Self {
        match error {
            EmbeddingError::Timeout(after) => DistillError::Timeout {
                operation: "embedding".to_string(),
                after,
            },
            EmbeddingError::Unavailable(reason) => DistillError::unavailable("embedding service", reason),
            e => DistillError::SoftParseFailure {
                item: "embedding".to_string(),
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_classification() {
        let timeout: DistillError = LLMError::Timeout(Duration::from_secs(5)).into();
        assert!(matches!(timeout, DistillError::Timeout { .. }));
        assert!(timeout.is_soft());

        let network: DistillError = LLMError::Network("connection refused".into()).into();
        assert!(!network.is_soft());

        let provider: DistillError = LLMError::Provider("HTTP 500".into()).into();
        assert!(matches!(provider, DistillError::SoftParseFailure { .. }));
    }

    #[test]
    fn test_startup_timeout_is_unavailable() {
        let err = DistillError::at_startup("generation service", LLMError::Timeout(Duration::from_secs(1)));
        assert!(!err.is_soft());
    }
}

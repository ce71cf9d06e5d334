// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure adapters
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Vector stores, rule and job stores, provider clients,
//!   transcripts and the in-process event bus

pub mod embedding_client;
pub mod event_bus;
pub mod failure_detector;
mod file_lock;
pub mod file_rule_store;
pub mod in_memory_vector_store;
pub mod job_store;
pub mod llm;
pub mod qdrant_vector_store;
pub mod repository;
pub mod rule_store;
pub mod transcripts;

pub use embedding_client::{HashEmbeddingClient, OllamaEmbeddingClient};
pub use event_bus::{BroadcastEventBus, EventReceiver};
pub use failure_detector::MarkerFailureDetector;
pub use file_rule_store::FileRuleStore;
pub use in_memory_vector_store::InMemoryVectorStore;
pub use job_store::{FileJobRepository, InMemoryJobRepository};
pub use qdrant_vector_store::QdrantVectorStore;
pub use repository::{Enqueued, JobRepository, RuleStore, RuleStoreError, TranscriptSource, VectorStore};
pub use rule_store::InMemoryRuleStore;
pub use transcripts::DirectoryTranscriptSource;

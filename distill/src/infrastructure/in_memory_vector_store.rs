// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory vector store
//! Used for tests and `backend: memory` dry runs. Evaluates filters with
//! [`Filter::matches`] and ranks search hits by cosine similarity.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{Filter, Payload, ScoredRecord, VectorRecord};
use crate::infrastructure::repository::{ScrollPage, VectorStore};

type Collection = BTreeMap<String, VectorRecord>;

pub struct InMemoryVectorStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
    mutations: AtomicU64,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            mutations: AtomicU64::new(0),
        }
    }

    /// Number of record writes (upserts and patched records) so far
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    pub async fn get(&self, collection: &str, id: &str) -> Option<VectorRecord> {
        let collections = self.collections.read().await;
        collections.get(collection).and_then(|c| c.get(id)).cloned()
    }

    pub async fn len(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map_or(0, |c| c.len())
    }

    /// Calculate cosine similarity between two vectors
    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if magnitude_a == 0.0 || magnitude_b == 0.0 {
            return 0.0;
        }

        dot_product / (magnitude_a * magnitude_b)
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let collections = self.collections.read().await;
        let count = collections
            .get(collection)
            .map_or(0, |c| c.values().filter(|r| filter.matches(&r.id, &r.payload)).count());
        Ok(count as u64)
    }

    async fn scroll_page(
        &self,
        collection: &str,
        filter: &Filter,
        limit: usize,
        offset: Option<&str>,
    ) -> Result<ScrollPage> {
        let collections = self.collections.read().await;
        let Some(records) = collections.get(collection) else {
            return Ok(ScrollPage::default());
        };

        let start = offset.map_or(Bound::Unbounded, |id| Bound::Included(id.to_string()));
        let mut matching = records
            .range((start, Bound::Unbounded))
            .map(|(_, record)| record)
            .filter(|r| filter.matches(&r.id, &r.payload));

        let page: Vec<VectorRecord> = matching.by_ref().take(limit).cloned().collect();
        let next_offset = if page.len() == limit {
            matching.next().map(|r| r.id.clone())
        } else {
            None
        };
        Ok(ScrollPage { records: page, next_offset })
    }

    async fn patch_payload(
        &self,
        collection: &str,
        ids: &[String],
        condition: &Filter,
        payload: Payload,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        let Some(records) = collections.get_mut(collection) else {
            return Ok(());
        };

        for id in ids {
            if let Some(record) = records.get_mut(id) {
                if !condition.matches(&record.id, &record.payload) {
                    continue;
                }
                for (key, value) in &payload {
                    record.payload.insert(key.clone(), value.clone());
                }
                self.mutations.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &Filter,
        score_threshold: Option<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let collections = self.collections.read().await;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<ScoredRecord> = records
            .values()
            .filter(|r| filter.matches(&r.id, &r.payload))
            .filter_map(|r| {
                let stored = r.vector.as_ref()?;
                let score = Self::cosine_similarity(vector, stored);
                Some(ScoredRecord {
                    record: r.clone(),
                    score,
                })
            })
            .filter(|hit| score_threshold.map_or(true, |t| hit.score >= t))
            .collect();

        // Sort by similarity descending
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    async fn upsert(&self, collection: &str, id: &str, vector: Vec<f32>, payload: Payload) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.entry(collection.to_string()).or_default().insert(
            id.to_string(),
            VectorRecord {
                id: id.to_string(),
                payload,
                vector: Some(vector),
            },
        );
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Condition;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_conditional_patch_skips_non_matching_records() {
        let store = InMemoryVectorStore::new();
        store.upsert("chunks", "a", vec![1.0, 0.0], payload(json!({"pending_score": true}))).await.unwrap();
        store.upsert("chunks", "b", vec![0.0, 1.0], payload(json!({"pending_score": false}))).await.unwrap();
        let before = store.mutation_count();

        let condition = Filter::must([Condition::equals("pending_score", true)]);
        store
            .patch_payload(
                "chunks",
                &["a".to_string(), "b".to_string()],
                &condition,
                payload(json!({"quality_score": 5, "pending_score": false})),
            )
            .await
            .unwrap();

        assert_eq!(store.mutation_count() - before, 1);
        let a = store.get("chunks", "a").await.unwrap();
        assert_eq!(a.payload["quality_score"], 5);
        let b = store.get("chunks", "b").await.unwrap();
        assert!(b.payload.get("quality_score").is_none());
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let store = InMemoryVectorStore::new();
        store.upsert("r", "near", vec![1.0, 0.1], Payload::new()).await.unwrap();
        store.upsert("r", "far", vec![0.0, 1.0], Payload::new()).await.unwrap();

        let hits = store.search("r", &[1.0, 0.0], &Filter::new(), Some(0.5), 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "near");
    }

    #[tokio::test]
    async fn test_scroll_and_count_respect_filter() {
        let store = InMemoryVectorStore::new();
        for (id, score) in [("a", 9), ("b", 2), ("c", 8)] {
            store.upsert("chunks", id, vec![], payload(json!({"quality_score": score}))).await.unwrap();
        }

        let high = Filter::must([Condition::gte("quality_score", 7.0)]);
        assert_eq!(store.count("chunks", &high).await.unwrap(), 2);
        assert_eq!(store.scroll("chunks", &high, 1).await.unwrap().len(), 1);
        assert_eq!(store.count("missing", &high).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scroll_pages_cover_every_match_once() {
        let store = InMemoryVectorStore::new();
        for (id, score) in [("a", 9), ("b", 2), ("c", 8), ("d", 7), ("e", 10)] {
            store.upsert("chunks", id, vec![], payload(json!({"quality_score": score}))).await.unwrap();
        }
        let high = Filter::must([Condition::gte("quality_score", 7.0)]);

        let first = store.scroll_page("chunks", &high, 2, None).await.unwrap();
        let ids: Vec<&str> = first.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert_eq!(first.next_offset.as_deref(), Some("d"));

        let second = store.scroll_page("chunks", &high, 2, first.next_offset.as_deref()).await.unwrap();
        let ids: Vec<&str> = second.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["d", "e"]);
        assert!(second.next_offset.is_none());
    }
}

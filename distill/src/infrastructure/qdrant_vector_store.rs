// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Qdrant production implementation of the vector store
//!
//! Translates the store-agnostic [`Filter`](crate::domain::Filter) model into
//! native Qdrant conditions and JSON payloads into Qdrant values.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Chunk and reflection collections backed by Qdrant

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        self, point_id::PointIdOptions, value::Kind, Condition, CountPointsBuilder,
        CreateCollectionBuilder, Distance, ListValue, PointId, PointStruct, Range,
        ScrollPointsBuilder, SearchPointsBuilder, SetPayloadPointsBuilder, Struct,
        UpsertPointsBuilder, Value, VectorParamsBuilder,
    },
    Qdrant,
};
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::{self, FieldValue, Payload, ScoredRecord, VectorRecord};
use crate::infrastructure::repository::{ScrollPage, VectorStore};

pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    pub fn new(url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .timeout(timeout)
            .build()
            .context("Failed to create Qdrant client")?;

        Ok(Self { client })
    }

    /// Create the collection with cosine distance if it does not exist
    pub async fn ensure_collection(&self, name: &str, vector_dim: u64) -> Result<()> {
        let collection_exists = self
            .client
            .collection_exists(name)
            .await
            .context("Failed to check collection existence")?;

        if !collection_exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(name)
                        .vectors_config(VectorParamsBuilder::new(vector_dim, Distance::Cosine)),
                )
                .await
                .with_context(|| format!("Failed to create Qdrant collection {}", name))?;
        }

        Ok(())
    }

    /// Numeric ids become Qdrant integer ids; anything else must be a UUID
    fn point_id(id: &str) -> PointId {
        match id.parse::<u64>() {
            Ok(num) => PointId::from(num),
            Err(_) => PointId::from(id.to_string()),
        }
    }

    fn id_string(id: Option<&PointId>) -> Result<String> {
        match id.and_then(|p| p.point_id_options.as_ref()) {
            Some(PointIdOptions::Num(n)) => Ok(n.to_string()),
            Some(PointIdOptions::Uuid(u)) => Ok(u.clone()),
            None => anyhow::bail!("Qdrant point without id"),
        }
    }

    fn to_qdrant_value(value: &serde_json::Value) -> Value {
        let kind = match value {
            serde_json::Value::Null => Kind::NullValue(0),
            serde_json::Value::Bool(b) => Kind::BoolValue(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Kind::IntegerValue(i),
                None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Kind::StringValue(s.clone()),
            serde_json::Value::Array(items) => Kind::ListValue(ListValue {
                values: items.iter().map(Self::to_qdrant_value).collect(),
            }),
            serde_json::Value::Object(map) => Kind::StructValue(Struct {
                fields: map
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::to_qdrant_value(v)))
                    .collect(),
            }),
        };
        Value { kind: Some(kind) }
    }

    fn from_qdrant_value(value: &Value) -> serde_json::Value {
        match &value.kind {
            None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
            Some(Kind::BoolValue(b)) => (*b).into(),
            Some(Kind::IntegerValue(i)) => (*i).into(),
            Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Some(Kind::StringValue(s)) => s.clone().into(),
            Some(Kind::ListValue(list)) => {
                serde_json::Value::Array(list.values.iter().map(Self::from_qdrant_value).collect())
            }
            Some(Kind::StructValue(s)) => serde_json::Value::Object(
                s.fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_qdrant_value(v)))
                    .collect(),
            ),
        }
    }

    fn to_qdrant_payload(payload: &Payload) -> HashMap<String, Value> {
        payload
            .iter()
            .map(|(k, v)| (k.clone(), Self::to_qdrant_value(v)))
            .collect()
    }

    fn from_qdrant_payload(payload: &HashMap<String, Value>) -> Payload {
        payload
            .iter()
            .map(|(k, v)| (k.clone(), Self::from_qdrant_value(v)))
            .collect()
    }

    fn to_qdrant_condition(condition: &domain::Condition) -> Condition {
        match condition {
            domain::Condition::Equals { field, value } => match value {
                FieldValue::Bool(b) => Condition::matches(field.clone(), *b),
                FieldValue::Int(i) => Condition::matches(field.clone(), *i),
                FieldValue::Text(s) => Condition::matches(field.clone(), s.clone()),
            },
            domain::Condition::AnyOf { field, values } => {
                let ints: Vec<i64> = values
                    .iter()
                    .filter_map(|v| match v {
                        FieldValue::Int(i) => Some(*i),
                        _ => None,
                    })
                    .collect();
                if !ints.is_empty() && ints.len() == values.len() {
                    Condition::matches(field.clone(), ints)
                } else {
                    let keywords: Vec<String> = values
                        .iter()
                        .map(|v| match v {
                            FieldValue::Bool(b) => b.to_string(),
                            FieldValue::Int(i) => i.to_string(),
                            FieldValue::Text(s) => s.clone(),
                        })
                        .collect();
                    Condition::matches(field.clone(), keywords)
                }
            }
            domain::Condition::Range { field, bounds } => Condition::range(
                field.clone(),
                Range {
                    gt: bounds.gt,
                    gte: bounds.gte,
                    lt: bounds.lt,
                    lte: bounds.lte,
                },
            ),
            domain::Condition::HasId { ids } => {
                Condition::has_id(ids.iter().map(|id| Self::point_id(id)))
            }
            domain::Condition::Nested { filter } => Condition::from(Self::to_qdrant_filter(filter)),
        }
    }

    fn to_qdrant_filter(filter: &domain::Filter) -> qdrant::Filter {
        let mut native = qdrant::Filter::default();
        native.must = filter.must.iter().map(Self::to_qdrant_condition).collect();
        native.must_not = filter.must_not.iter().map(Self::to_qdrant_condition).collect();
        native
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn count(&self, collection: &str, filter: &domain::Filter) -> Result<u64> {
        let response = self
            .client
            .count(
                CountPointsBuilder::new(collection)
                    .filter(Self::to_qdrant_filter(filter))
                    .exact(true),
            )
            .await
            .with_context(|| format!("Failed to count points in {}", collection))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn scroll_page(
        &self,
        collection: &str,
        filter: &domain::Filter,
        limit: usize,
        offset: Option<&str>,
    ) -> Result<ScrollPage> {
        let mut request = ScrollPointsBuilder::new(collection)
            .filter(Self::to_qdrant_filter(filter))
            .with_payload(true)
            .limit(limit.min(u32::MAX as usize) as u32);
        if let Some(offset) = offset {
            request = request.offset(Self::point_id(offset));
        }

        let response = self
            .client
            .scroll(request)
            .await
            .with_context(|| format!("Failed to scroll {}", collection))?;

        let records = response
            .result
            .iter()
            .map(|point| {
                Ok(VectorRecord {
                    id: Self::id_string(point.id.as_ref())?,
                    payload: Self::from_qdrant_payload(&point.payload),
                    vector: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let next_offset = match response.next_page_offset.as_ref() {
            Some(id) => Some(Self::id_string(Some(id))?),
            None => None,
        };
        Ok(ScrollPage { records, next_offset })
    }

    async fn patch_payload(
        &self,
        collection: &str,
        ids: &[String],
        condition: &domain::Filter,
        payload: Payload,
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        // Identity and current-state conditions travel in one selector, so the
        // update applies only to points that still match.
        let mut selector = Self::to_qdrant_filter(condition);
        selector
            .must
            .push(Condition::has_id(ids.iter().map(|id| Self::point_id(id))));

        self.client
            .set_payload(
                SetPayloadPointsBuilder::new(collection, Self::to_qdrant_payload(&payload))
                    .points_selector(selector)
                    .wait(true),
            )
            .await
            .with_context(|| format!("Failed to patch payload in {}", collection))?;

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &domain::Filter,
        score_threshold: Option<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let mut builder = SearchPointsBuilder::new(collection, vector.to_vec(), limit as u64)
            .filter(Self::to_qdrant_filter(filter))
            .with_payload(true);
        if let Some(threshold) = score_threshold {
            builder = builder.score_threshold(threshold);
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .with_context(|| format!("Failed to search {}", collection))?;

        response
            .result
            .iter()
            .map(|point| {
                Ok(ScoredRecord {
                    record: VectorRecord {
                        id: Self::id_string(point.id.as_ref())?,
                        payload: Self::from_qdrant_payload(&point.payload),
                        vector: None,
                    },
                    score: point.score,
                })
            })
            .collect()
    }

    async fn upsert(&self, collection: &str, id: &str, vector: Vec<f32>, payload: Payload) -> Result<()> {
        let point = PointStruct::new(Self::point_id(id), vector, Self::to_qdrant_payload(&payload));

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, vec![point]).wait(true))
            .await
            .with_context(|| format!("Failed to upsert point {} into {}", id, collection))?;

        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.client
            .health_check()
            .await
            .context("Qdrant health check failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Condition as DomainCondition, Filter};
    use serde_json::json;

    #[test]
    fn test_payload_value_conversion_roundtrips_json_shapes() {
        let payload = json!({
            "session_id": "s1",
            "quality_score": 7,
            "pending_score": false,
            "weight": 0.5,
            "tags": ["a", "b"],
        });
        let payload = payload.as_object().cloned().unwrap();

        let native = QdrantVectorStore::to_qdrant_payload(&payload);
        assert!(matches!(native["quality_score"].kind, Some(Kind::IntegerValue(7))));
        assert!(matches!(native["pending_score"].kind, Some(Kind::BoolValue(false))));

        let back = QdrantVectorStore::from_qdrant_payload(&native);
        assert_eq!(back, payload);
    }

    #[test]
    fn test_filter_translation_keeps_clause_structure() {
        let filter = Filter::must([
            DomainCondition::equals("pending_score", true),
            DomainCondition::gte("quality_score", 7.0),
        ])
        .and_not(DomainCondition::any_of("session_id", ["s1", "s2"]));

        let native = QdrantVectorStore::to_qdrant_filter(&filter);
        assert_eq!(native.must.len(), 2);
        assert_eq!(native.must_not.len(), 1);
        assert!(native.should.is_empty());
    }

    #[test]
    fn test_point_id_mapping() {
        let numeric = QdrantVectorStore::point_id("42");
        assert_eq!(QdrantVectorStore::id_string(Some(&numeric)).unwrap(), "42");

        let uuid = "6d1c4a6e-93f1-4c55-8a9e-2b7d0c3e5f10";
        let point = QdrantVectorStore::point_id(uuid);
        assert_eq!(QdrantVectorStore::id_string(Some(&point)).unwrap(), uuid);
    }

    #[tokio::test]
    #[ignore] // Requires running Qdrant instance
    async fn test_conditional_patch_against_live_qdrant() {
        let store = QdrantVectorStore::new("http://localhost:6334", None, Duration::from_secs(5))
            .expect("Failed to create store");
        store.ensure_collection("distill_test_chunks", 4).await.expect("Failed to create collection");

        let id = uuid::Uuid::new_v4().to_string();
        let payload = json!({"pending_score": true, "session_id": "s1", "text": "t"});
        store
            .upsert("distill_test_chunks", &id, vec![0.1; 4], payload.as_object().cloned().unwrap())
            .await
            .expect("Failed to upsert");

        let pending = Filter::must([DomainCondition::equals("pending_score", true)]);
        let patch = json!({"quality_score": 8, "pending_score": false});
        store
            .patch_payload("distill_test_chunks", &[id.clone()], &pending, patch.as_object().cloned().unwrap())
            .await
            .expect("Failed to patch");

        let scored = Filter::must([DomainCondition::has_id([id.clone()])]);
        let records = store.scroll("distill_test_chunks", &scored, 10).await.expect("Failed to scroll");
        assert_eq!(records[0].payload["quality_score"], 8);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Store-agnostic record and filter model
//!
//! Records carry a JSON payload. Filters compose field equality, any-of,
//! numeric range and id conditions with `must` / `must_not`
//! clauses. The Qdrant adapter translates them to native conditions; the
//! in-memory store evaluates them with [`Filter::matches`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Payload = serde_json::Map<String, Value>;

/// A point in a vector collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

/// A search hit with its similarity score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl FieldValue {
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldValue::Bool(b), Value::Bool(v)) => b == v,
            (FieldValue::Int(i), Value::Number(n)) => n.as_i64() == Some(*i),
            (FieldValue::Text(s), Value::String(v)) => s == v,
            _ => false,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// Numeric range bounds (all optional, inclusive/exclusive as named)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    pub gt: Option<f64>,
    pub gte: Option<f64>,
    pub lt: Option<f64>,
    pub lte: Option<f64>,
}

impl RangeBounds {
    fn contains(&self, x: f64) -> bool {
        self.gt.map_or(true, |b| x > b)
            && self.gte.map_or(true, |b| x >= b)
            && self.lt.map_or(true, |b| x < b)
            && self.lte.map_or(true, |b| x <= b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Equals { field: String, value: FieldValue },
    AnyOf { field: String, values: Vec<FieldValue> },
    Range { field: String, bounds: RangeBounds },
    HasId { ids: Vec<String> },
    Nested { filter: Filter },
}

impl Condition {
    pub fn equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Condition::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn any_of<V: Into<FieldValue>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Condition::AnyOf {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn range(field: impl Into<String>, bounds: RangeBounds) -> Self {
        Condition::Range {
            field: field.into(),
            bounds,
        }
    }

    pub fn gte(field: impl Into<String>, value: f64) -> Self {
        Self::range(field, RangeBounds { gte: Some(value), ..Default::default() })
    }

    pub fn lte(field: impl Into<String>, value: f64) -> Self {
        Self::range(field, RangeBounds { lte: Some(value), ..Default::default() })
    }

    pub fn has_id<S: Into<String>>(ids: impl IntoIterator<Item = S>) -> Self {
        Condition::HasId {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    fn matches(&self, id: &str, payload: &Payload) -> bool {
        match self {
            Condition::Equals { field, value } => {
                payload.get(field).map_or(false, |v| value.matches(v))
            }
            Condition::AnyOf { field, values } => payload.get(field).map_or(false, |v| match v {
                // Array payloads match when any element matches, as Qdrant does.
                Value::Array(items) => items.iter().any(|item| values.iter().any(|c| c.matches(item))),
                other => values.iter().any(|c| c.matches(other)),
            }),
            Condition::Range { field, bounds } => payload
                .get(field)
                .and_then(Value::as_f64)
                .map_or(false, |x| bounds.contains(x)),
            Condition::HasId { ids } => ids.iter().any(|candidate| candidate == id),
            Condition::Nested { filter } => filter.matches(id, payload),
        }
    }
}

/// Boolean composition of conditions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub must: Vec<Condition>,
    #[serde(default)]
    pub must_not: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self {
            must: conditions.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.must.push(condition);
        self
    }

    pub fn and_not(mut self, condition: Condition) -> Self {
        self.must_not.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty()
    }

    pub fn matches(&self, id: &str, payload: &Payload) -> bool {
        self.must.iter().all(|c| c.matches(id, payload))
            && !self.must_not.iter().any(|c| c.matches(id, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_equality_and_range() {
        let p = payload(json!({"pending_score": false, "quality_score": 8}));
        let high = Filter::must([
            Condition::equals("pending_score", false),
            Condition::gte("quality_score", 7.0),
        ]);
        let low = Filter::must([Condition::lte("quality_score", 3.0)]);

        assert!(high.matches("a", &p));
        assert!(!low.matches("a", &p));
    }

    #[test]
    fn test_any_of_against_array_payload() {
        let p = payload(json!({"session_ids": ["s1", "s2"]}));
        assert!(Filter::must([Condition::any_of("session_ids", ["s2", "s9"])]).matches("a", &p));
        assert!(!Filter::must([Condition::any_of("session_ids", ["s9"])]).matches("a", &p));
    }

    #[test]
    fn test_must_not_and_has_id() {
        let p = payload(json!({"pending_score": true}));
        let filter = Filter::must([Condition::has_id(["a", "b"])])
            .and_not(Condition::equals("pending_score", false));

        assert!(filter.matches("a", &p));
        assert!(!filter.matches("c", &p));
    }

    #[test]
    fn test_missing_field_does_not_match() {
        let p = payload(json!({}));
        assert!(!Filter::must([Condition::equals("pending_score", true)]).matches("a", &p));
        assert!(Filter::new().matches("a", &p));
    }
}

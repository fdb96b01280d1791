//! Backend-agnostic filter predicate in Qdrant's `must / must_not / should` shape.
//!
//! Built from intent/scope detection or from a compact JSON expression, passed
//! to the vector store and text matcher, and evaluable in-process against a
//! payload.
//!
//! # JSON expression form
//!
//! | JSON Expression | Clause |
//! |-----------------|--------|
//! | `{"category": "git"}` | `must: category == "git"` |
//! | `{"lang": ["de", "en"]}` | `must: lang in [..]` |
//! | `{"score": {"$gt": 0.8}}` | `must: score > 0.8` |
//! | `{"count": {"$gte": 5, "$lt": 9}}` | `must: 5 <= count < 9` |
//! | `{"id": {"$ne": "deleted"}}` | `must_not: id == "deleted"` |
//! | `{"tag": {"$in": ["a", "b"]}}` | `must: tag in [..]` |
//! | `{"tag": {"$nin": ["x"]}}` | `must_not: tag in [..]` |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RetrievalError};
use crate::types::Payload;

/// Filter predicate. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QdrantFilter {
    /// Every condition must hold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Condition>,
    /// No condition may hold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<Condition>,
    /// At least one condition must hold, when any are present
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<Condition>,
}

/// One clause entry: a field test or a nested filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// Test on one payload field
    Field(FieldCondition),
    /// Nested boolean filter
    Filter(QdrantFilter),
}

/// Test on the payload field at `key` (dotted keys reach into objects).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    /// Payload key
    pub key: String,
    /// Value match
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_value: Option<MatchValue>,
    /// Numeric range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeCondition>,
}

/// Value match variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchValue {
    /// Equality with one value
    Value {
        /// Expected value
        value: Value,
    },
    /// Equality with any of several values
    Any {
        /// Accepted values
        any: Vec<Value>,
    },
    /// Case-insensitive substring of a string field
    Text {
        /// Substring
        text: String,
    },
}

/// Numeric bounds; unset bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeCondition {
    /// Exclusive lower bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    /// Inclusive lower bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    /// Exclusive upper bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    /// Inclusive upper bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
}

impl RangeCondition {
    fn contains(&self, value: f64) -> bool {
        self.gt.is_none_or(|bound| value > bound)
            && self.gte.is_none_or(|bound| value >= bound)
            && self.lt.is_none_or(|bound| value < bound)
            && self.lte.is_none_or(|bound| value <= bound)
    }
}

impl Condition {
    /// `key == value`
    #[must_use]
    pub fn field_match(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Field(FieldCondition {
            key: key.into(),
            match_value: Some(MatchValue::Value {
                value: value.into(),
            }),
            range: None,
        })
    }

    /// `key in values`
    #[must_use]
    pub fn field_any<V: Into<Value>>(
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::Field(FieldCondition {
            key: key.into(),
            match_value: Some(MatchValue::Any {
                any: values.into_iter().map(Into::into).collect(),
            }),
            range: None,
        })
    }

    /// `key` within `range`
    #[must_use]
    pub fn field_range(key: impl Into<String>, range: RangeCondition) -> Self {
        Self::Field(FieldCondition {
            key: key.into(),
            match_value: None,
            range: Some(range),
        })
    }

    fn matches(&self, payload: &Payload) -> bool {
        match self {
            Self::Filter(filter) => filter.matches(payload),
            Self::Field(field) => field.matches(payload),
        }
    }
}

impl FieldCondition {
    fn matches(&self, payload: &Payload) -> bool {
        let Some(found) = lookup(payload, &self.key) else {
            return false;
        };
        // Array fields match when any element does.
        let candidates: Vec<&Value> = match found {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        candidates.into_iter().any(|candidate| {
            self.match_value
                .as_ref()
                .is_none_or(|m| match_value(m, candidate))
                && self.range.as_ref().is_none_or(|range| {
                    candidate.as_f64().is_some_and(|number| range.contains(number))
                })
        })
    }
}

impl QdrantFilter {
    /// True when no clause is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty() && self.should.is_empty()
    }

    /// Builder: add `key == value` to `must`.
    #[must_use]
    pub fn must_match(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.must.push(Condition::field_match(key, value));
        self
    }

    /// Builder: add `key in values` to `must`.
    #[must_use]
    pub fn must_any<V: Into<Value>>(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.must.push(Condition::field_any(key, values));
        self
    }

    /// Builder: add `key in values` to `must_not`.
    #[must_use]
    pub fn must_not_any<V: Into<Value>>(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.must_not.push(Condition::field_any(key, values));
        self
    }

    /// Builder: add `key in values` to `should`.
    #[must_use]
    pub fn should_any<V: Into<Value>>(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.should.push(Condition::field_any(key, values));
        self
    }

    /// Builder: add a numeric range to `must`.
    #[must_use]
    pub fn must_range(mut self, key: impl Into<String>, range: RangeCondition) -> Self {
        self.must.push(Condition::field_range(key, range));
        self
    }

    /// Conjunction of `self` and `other`: the result matches a payload
    /// exactly when both inputs do.
    ///
    /// `must` and `must_not` are concatenated. A `should` list is already a
    /// hard at-least-one constraint, so when both sides carry one the second
    /// is nested under `must` rather than concatenated, which would widen both.
    #[must_use]
    pub fn merge(mut self, other: QdrantFilter) -> Self {
        self.must.extend(other.must);
        self.must_not.extend(other.must_not);
        if self.should.is_empty() {
            self.should = other.should;
        } else if !other.should.is_empty() {
            self.must.push(Condition::Filter(QdrantFilter {
                should: other.should,
                ..QdrantFilter::default()
            }));
        }
        self
    }

    /// Evaluate against a payload: all `must`, no `must_not`, and at least one
    /// `should` when any exist.
    #[must_use]
    pub fn matches(&self, payload: &Payload) -> bool {
        self.must.iter().all(|c| c.matches(payload))
            && !self.must_not.iter().any(|c| c.matches(payload))
            && (self.should.is_empty() || self.should.iter().any(|c| c.matches(payload)))
    }

    /// Convert a compact JSON expression (see module docs) into a filter.
    ///
    /// `null` and `{}` yield an empty filter.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidInput`] for non-object expressions,
    /// unknown operators, or operands of the wrong type.
    pub fn from_json_expr(expr: &Value) -> Result<Self> {
        let map = match expr {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(RetrievalError::invalid(format!(
                    "filter expression must be an object, got {other}"
                )));
            }
        };

        let mut filter = Self::default();
        for (key, value) in map {
            match value {
                Value::Array(items) => {
                    filter = filter.must_any(key.as_str(), items.iter().cloned());
                }
                Value::Object(operators) => {
                    filter = apply_operators(filter, key, operators)?;
                }
                scalar => filter = filter.must_match(key.as_str(), scalar.clone()),
            }
        }
        Ok(filter)
    }
}

fn apply_operators(
    mut filter: QdrantFilter,
    key: &str,
    operators: &serde_json::Map<String, Value>,
) -> Result<QdrantFilter> {
    let mut range = RangeCondition::default();
    let mut has_range = false;
    for (op, operand) in operators {
        match op.as_str() {
            "$gt" | ">" => (range.gt, has_range) = (Some(number(key, op, operand)?), true),
            "$gte" | ">=" => (range.gte, has_range) = (Some(number(key, op, operand)?), true),
            "$lt" | "<" => (range.lt, has_range) = (Some(number(key, op, operand)?), true),
            "$lte" | "<=" => (range.lte, has_range) = (Some(number(key, op, operand)?), true),
            "$eq" | "=" => filter = filter.must_match(key, operand.clone()),
            "$ne" | "!=" => filter
                .must_not
                .push(Condition::field_match(key, operand.clone())),
            "$in" => filter = filter.must_any(key, array(key, op, operand)?.iter().cloned()),
            "$nin" => filter = filter.must_not_any(key, array(key, op, operand)?.iter().cloned()),
            other => {
                return Err(RetrievalError::invalid(format!(
                    "unsupported filter operator {other} on {key}"
                )));
            }
        }
    }
    if has_range {
        filter = filter.must_range(key, range);
    }
    Ok(filter)
}

fn number(key: &str, op: &str, operand: &Value) -> Result<f64> {
    operand.as_f64().ok_or_else(|| {
        RetrievalError::invalid(format!("{op} on {key} needs a number, got {operand}"))
    })
}

fn array<'a>(key: &str, op: &str, operand: &'a Value) -> Result<&'a Vec<Value>> {
    operand.as_array().ok_or_else(|| {
        RetrievalError::invalid(format!("{op} on {key} needs an array, got {operand}"))
    })
}

fn lookup<'a>(payload: &'a Payload, key: &str) -> Option<&'a Value> {
    if let Some(value) = payload.get(key) {
        return Some(value);
    }
    let mut parts = key.split('.');
    let mut current = payload.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn match_value(expected: &MatchValue, actual: &Value) -> bool {
    match expected {
        MatchValue::Value { value } => values_equal(value, actual),
        MatchValue::Any { any } => any.iter().any(|value| values_equal(value, actual)),
        MatchValue::Text { text } => actual
            .as_str()
            .is_some_and(|s| s.to_lowercase().contains(&text.to_lowercase())),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_json_expr_scalars_and_operators() {
        let expr = json!({
            "category": "git",
            "score": {"$gt": 0.8, "$lte": 1.0},
            "id": {"$ne": "deleted"},
            "lang": {"$in": ["de", "en"]}
        });
        let filter = QdrantFilter::from_json_expr(&expr).unwrap();
        assert_eq!(filter.must.len(), 3);
        assert_eq!(filter.must_not.len(), 1);

        let hit = payload(json!({"category": "git", "score": 0.9, "id": "a", "lang": "de"}));
        let low = payload(json!({"category": "git", "score": 0.5, "id": "a", "lang": "de"}));
        let gone = payload(json!({"category": "git", "score": 0.9, "id": "deleted", "lang": "en"}));
        assert!(filter.matches(&hit));
        assert!(!filter.matches(&low));
        assert!(!filter.matches(&gone));
    }

    #[test]
    fn test_json_expr_rejects_unknown_operator() {
        let error = QdrantFilter::from_json_expr(&json!({"a": {"$regex": "x"}})).unwrap_err();
        assert_eq!(error.kind(), "InvalidInputError");
        assert!(QdrantFilter::from_json_expr(&json!("a = 1")).is_err());
        assert!(QdrantFilter::from_json_expr(&json!({"n": {"$gt": "high"}})).is_err());
    }

    #[test]
    fn test_null_expression_is_empty() {
        let filter = QdrantFilter::from_json_expr(&Value::Null).unwrap();
        assert!(filter.is_empty());
        assert!(filter.matches(&Payload::new()));
    }

    #[test]
    fn test_should_requires_one_match() {
        let filter = QdrantFilter::default().should_any("content_type", ["guide", "tutorial"]);
        assert!(filter.matches(&payload(json!({"content_type": "guide"}))));
        assert!(!filter.matches(&payload(json!({"content_type": "changelog"}))));
        assert!(!filter.matches(&payload(json!({}))));
    }

    #[test]
    fn test_dotted_keys_and_array_fields() {
        let filter = QdrantFilter::default()
            .must_match("meta.source", "handbook")
            .must_any("tags", ["energy"]);
        let doc = payload(json!({"meta": {"source": "handbook"}, "tags": ["climate", "energy"]}));
        assert!(filter.matches(&doc));
    }

    #[test]
    fn test_merge_keeps_both_should_groups() {
        let left = QdrantFilter::default().should_any("a", [1]);
        let right = QdrantFilter::default()
            .must_match("b", 2)
            .should_any("c", [3]);
        let merged = left.merge(right);
        assert_eq!(merged.should.len(), 1);
        assert_eq!(merged.must.len(), 2);
        assert!(merged.matches(&payload(json!({"a": 1, "b": 2, "c": 3}))));
        assert!(!merged.matches(&payload(json!({"a": 1, "b": 2}))));
    }

    #[test]
    fn test_merge_is_conjunction_of_both_sides() {
        let caller = QdrantFilter::default().should_any("lang", ["de", "en"]);
        let scoped = QdrantFilter::default()
            .must_match("document_title", "Klimaschutzgesetz")
            .must_not_any("content_type", ["navigation"]);
        let merged = caller.clone().merge(scoped.clone());
        assert_eq!(merged.should, caller.should);

        for body in [
            json!({"lang": "de", "document_title": "Klimaschutzgesetz"}),
            json!({"lang": "fr", "document_title": "Klimaschutzgesetz"}),
            json!({"lang": "en", "document_title": "Klimaschutzgesetz", "content_type": "navigation"}),
            json!({"lang": "en", "document_title": "Andere"}),
            json!({"document_title": "Klimaschutzgesetz"}),
        ] {
            let body = payload(body);
            assert_eq!(
                merged.matches(&body),
                caller.matches(&body) && scoped.matches(&body),
                "{body:?}"
            );
        }
    }

    #[test]
    fn test_serializes_to_qdrant_shape() {
        let filter = QdrantFilter::default()
            .must_match("document_title", "Klimaschutzgesetz")
            .must_not_any("content_type", ["navigation"]);
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({
                "must": [{"key": "document_title", "match": {"value": "Klimaschutzgesetz"}}],
                "must_not": [{"key": "content_type", "match": {"any": ["navigation"]}}]
            })
        );
    }
}

//! Quarry Document Filter - Filter Expressions
//!
//! Filter expressions in the operator form document stores accept. An
//! expression can be rendered as JSON for a store or evaluated directly
//! against a [`Document`].
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::Document;
use quarry_common::Value;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::cmp::Ordering;

// =============================================================================
// Filter Expression
// =============================================================================

/// One node of a document filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DocumentFilter {
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    Gt { field: String, value: Value },
    Gte { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Nin { field: String, values: Vec<Value> },
    Exists { field: String, exists: bool },
    Regex { field: String, pattern: String },
    Type { field: String, type_name: String },
    Size { field: String, size: i64 },
    All { field: String, values: Vec<Value> },
    ElemMatch { field: String, value: Value },
    /// Full-text search; any whitespace-separated term matches.
    Text { field: String, search: String },
    And(Vec<DocumentFilter>),
    Not(Box<DocumentFilter>),
}

impl DocumentFilter {
    /// Conjunction that collapses a single member to itself.
    pub fn and(mut filters: Vec<DocumentFilter>) -> Self {
        if filters.len() == 1 {
            if let Some(only) = filters.pop() {
                return only;
            }
        }
        DocumentFilter::And(filters)
    }

    /// Matches every document.
    pub fn match_all() -> Self {
        DocumentFilter::And(Vec::new())
    }

    /// Field the node tests, for leaf nodes.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Eq { field, .. }
            | Self::Ne { field, .. }
            | Self::Gt { field, .. }
            | Self::Gte { field, .. }
            | Self::Lt { field, .. }
            | Self::Lte { field, .. }
            | Self::In { field, .. }
            | Self::Nin { field, .. }
            | Self::Exists { field, .. }
            | Self::Regex { field, .. }
            | Self::Type { field, .. }
            | Self::Size { field, .. }
            | Self::All { field, .. }
            | Self::ElemMatch { field, .. }
            | Self::Text { field, .. } => Some(field),
            Self::And(_) | Self::Not(_) => None,
        }
    }

    // -------------------------------------------------------------------------
    // Evaluation
    // -------------------------------------------------------------------------

    /// Check if a document matches this filter. A missing field matches
    /// `$ne`, `$nin` and `$eq: null`, and nothing else.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Eq { field, value } => match doc.get(field) {
                Some(v) => v.loose_eq(value),
                None => value.is_null(),
            },
            Self::Ne { field, value } => match doc.get(field) {
                Some(v) => !v.loose_eq(value),
                None => !value.is_null(),
            },
            Self::Gt { field, value } => ordering(doc, field, value) == Some(Ordering::Greater),
            Self::Gte { field, value } => matches!(
                ordering(doc, field, value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Lt { field, value } => ordering(doc, field, value) == Some(Ordering::Less),
            Self::Lte { field, value } => matches!(
                ordering(doc, field, value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::In { field, values } => match doc.get(field) {
                Some(v) => values.iter().any(|c| v.loose_eq(c)),
                None => values.iter().any(Value::is_null),
            },
            Self::Nin { field, values } => match doc.get(field) {
                Some(v) => !values.iter().any(|c| v.loose_eq(c)),
                None => !values.iter().any(Value::is_null),
            },
            Self::Exists { field, exists } => doc.contains(field) == *exists,
            Self::Regex { field, pattern } => match doc.get(field).and_then(Value::as_str) {
                Some(s) => Regex::new(pattern).map(|re| re.is_match(s)).unwrap_or(false),
                None => false,
            },
            Self::Type { field, type_name } => match doc.get(field) {
                Some(v) if type_name == "number" => v.is_numeric(),
                Some(v) => v.type_name() == type_name,
                None => false,
            },
            Self::Size { field, size } => doc
                .get(field)
                .and_then(Value::as_array)
                .map(|items| items.len() as i64 == *size)
                .unwrap_or(false),
            Self::All { field, values } => match doc.get(field).and_then(Value::as_array) {
                Some(items) => values.iter().all(|w| items.iter().any(|i| i.loose_eq(w))),
                None => false,
            },
            Self::ElemMatch { field, value } => match doc.get(field).and_then(Value::as_array) {
                Some(items) => items.iter().any(|item| contains_all(item, value)),
                None => false,
            },
            Self::Text { field, search } => match doc.get(field).and_then(Value::as_str) {
                Some(text) => {
                    let text = text.to_lowercase();
                    search
                        .split_whitespace()
                        .any(|term| text.contains(&term.to_lowercase()))
                }
                None => false,
            },
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Self::Not(filter) => !filter.matches(doc),
        }
    }

    // -------------------------------------------------------------------------
    // JSON Rendering
    // -------------------------------------------------------------------------

    /// Render in `$`-operator form, e.g. `{"age": {"$gt": 21}}`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::And(filters) => json!({ "$and": filters.iter().map(Self::to_json).collect::<Vec<_>>() }),
            Self::Not(inner) => match inner.field_operator() {
                Some((field, op)) => json!({ field: { "$not": op } }),
                None => json!({ "$nor": [inner.to_json()] }),
            },
            Self::Text { search, .. } => json!({ "$text": { "$search": search } }),
            leaf => match leaf.field_operator() {
                Some((field, op)) => json!({ field: op }),
                None => JsonValue::Null,
            },
        }
    }

    /// Field and operator document of a leaf node.
    fn field_operator(&self) -> Option<(&str, JsonValue)> {
        let list = |values: &[Value]| JsonValue::Array(values.iter().map(Value::to_json).collect());
        let op = match self {
            Self::Eq { value, .. } => json!({ "$eq": value.to_json() }),
            Self::Ne { value, .. } => json!({ "$ne": value.to_json() }),
            Self::Gt { value, .. } => json!({ "$gt": value.to_json() }),
            Self::Gte { value, .. } => json!({ "$gte": value.to_json() }),
            Self::Lt { value, .. } => json!({ "$lt": value.to_json() }),
            Self::Lte { value, .. } => json!({ "$lte": value.to_json() }),
            Self::In { values, .. } => json!({ "$in": list(values) }),
            Self::Nin { values, .. } => json!({ "$nin": list(values) }),
            Self::Exists { exists, .. } => json!({ "$exists": exists }),
            Self::Regex { pattern, .. } => json!({ "$regex": pattern }),
            Self::Type { type_name, .. } => json!({ "$type": type_name }),
            Self::Size { size, .. } => json!({ "$size": size }),
            Self::All { values, .. } => json!({ "$all": list(values) }),
            Self::ElemMatch { value, .. } => match value {
                Value::Object(_) => json!({ "$elemMatch": value.to_json() }),
                scalar => json!({ "$elemMatch": { "$eq": scalar.to_json() } }),
            },
            Self::Text { search, .. } => json!({ "$text": { "$search": search } }),
            Self::And(_) | Self::Not(_) => return None,
        };
        self.field().map(|field| (field, op))
    }
}

fn ordering(doc: &Document, field: &str, value: &Value) -> Option<Ordering> {
    let v = doc.get(field)?;
    if v.is_null() || value.is_null() {
        return None;
    }
    v.compare(value)
}

/// Objects match when they contain every key of the pattern.
fn contains_all(item: &Value, pattern: &Value) -> bool {
    match (item, pattern) {
        (Value::Object(have), Value::Object(want)) => want
            .iter()
            .all(|(k, v)| have.get(k).map(|h| h.loose_eq(v)).unwrap_or(false)),
        _ => item.loose_eq(pattern),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::from_json(json!({
            "_id": "u1",
            "name": "Alice Smith",
            "age": 30,
            "email": "alice@example.com",
            "tags": ["admin", "ops"],
            "logins": [{"day": "mon", "ok": true}, {"day": "tue", "ok": false}],
            "address": {"city": "Oslo"}
        }))
        .unwrap()
    }

    fn eq(field: &str, value: impl Into<Value>) -> DocumentFilter {
        DocumentFilter::Eq {
            field: field.to_string(),
            value: value.into(),
        }
    }

    #[test]
    fn test_comparisons() {
        let d = doc();
        assert!(eq("age", 30.0).matches(&d));
        assert!(DocumentFilter::Gt { field: "age".into(), value: Value::from(25) }.matches(&d));
        assert!(!DocumentFilter::Lt { field: "age".into(), value: Value::from(25) }.matches(&d));
        assert!(!DocumentFilter::Gt { field: "name".into(), value: Value::from(1) }.matches(&d));
        assert!(eq("address.city", "Oslo").matches(&d));
    }

    #[test]
    fn test_missing_fields() {
        let d = doc();
        assert!(eq("phone", Value::Null).matches(&d));
        assert!(DocumentFilter::Ne { field: "phone".into(), value: Value::from("x") }.matches(&d));
        assert!(DocumentFilter::Nin { field: "phone".into(), values: vec![Value::from(1)] }.matches(&d));
        assert!(!DocumentFilter::In { field: "phone".into(), values: vec![Value::from(1)] }.matches(&d));
        assert!(DocumentFilter::Exists { field: "phone".into(), exists: false }.matches(&d));
    }

    #[test]
    fn test_array_operators() {
        let d = doc();
        assert!(DocumentFilter::Size { field: "tags".into(), size: 2 }.matches(&d));
        assert!(DocumentFilter::All {
            field: "tags".into(),
            values: vec![Value::from("ops"), Value::from("admin")]
        }
        .matches(&d));
        let pattern = Value::from_json(json!({"day": "tue", "ok": false}));
        assert!(DocumentFilter::ElemMatch { field: "logins".into(), value: pattern }.matches(&d));
        assert!(DocumentFilter::Type { field: "tags".into(), type_name: "array".into() }.matches(&d));
        assert!(DocumentFilter::Type { field: "age".into(), type_name: "number".into() }.matches(&d));
    }

    #[test]
    fn test_text_regex_and_not() {
        let d = doc();
        assert!(DocumentFilter::Text { field: "name".into(), search: "bob smith".into() }.matches(&d));
        let regex = DocumentFilter::Regex {
            field: "email".into(),
            pattern: "@example\\.com$".into(),
        };
        assert!(regex.matches(&d));
        assert!(!DocumentFilter::Not(Box::new(regex)).matches(&d));
        assert!(DocumentFilter::match_all().matches(&d));
    }

    #[test]
    fn test_json_rendering() {
        let filter = DocumentFilter::and(vec![
            DocumentFilter::Gte { field: "age".into(), value: Value::from(21) },
            DocumentFilter::Not(Box::new(DocumentFilter::Regex {
                field: "name".into(),
                pattern: "^A".into(),
            })),
            DocumentFilter::In {
                field: "tags".into(),
                values: vec![Value::from("a"), Value::from("b")],
            },
        ]);
        assert_eq!(
            filter.to_json(),
            json!({"$and": [
                {"age": {"$gte": 21}},
                {"name": {"$not": {"$regex": "^A"}}},
                {"tags": {"$in": ["a", "b"]}}
            ]})
        );
        assert_eq!(DocumentFilter::and(vec![eq("a", 1)]).to_json(), json!({"a": {"$eq": 1}}));
        assert_eq!(
            DocumentFilter::ElemMatch { field: "t".into(), value: Value::from("x") }.to_json(),
            json!({"t": {"$elemMatch": {"$eq": "x"}}})
        );
    }
}

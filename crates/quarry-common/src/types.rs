//! Quarry Types - Core Data Types
//!
//! Fundamental data types shared by the query model and every execution
//! backend. Provides the runtime value representation, its natural ordering,
//! declared column types and relational dialect identifiers.
//!
//! Key Features:
//! - Multi-paradigm value type (scalar, temporal, binary, array, object)
//! - Runtime value kinds used to key parameter resolvers
//! - Natural ordering where values are orderable, `None` where they are not
//! - Lossless conversion to and from serde_json values
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Value Types
// =============================================================================

/// Runtime value carried by filters, entities and result rows.
///
/// Objects use an ordered map so that serialization, and with it cache keys
/// and translated output, is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    #[serde(with = "serde_bytes")]
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

/// Runtime type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Boolean,
    Integer,
    Float,
    String,
    Bytes,
    Timestamp,
    Array,
    Object,
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::Timestamp => "timestamp",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    /// Returns the runtime kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Integer(_) => ValueKind::Integer,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    /// Returns the type name of this value.
    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Attempts to extract a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to extract an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Attempts to extract a float value, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Attempts to extract a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Natural ordering between two values.
    ///
    /// Integers and floats compare numerically with each other. Values of
    /// unrelated kinds, nulls, arrays and objects are not orderable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Equality that treats `1` and `1.0` as the same value.
    pub fn loose_eq(&self, other: &Value) -> bool {
        if self.is_numeric() && other.is_numeric() {
            return self.compare(other) == Some(Ordering::Equal);
        }
        self == other
    }

    /// Walks object keys and array indexes.
    pub fn get_path<S: AsRef<str>>(&self, segments: &[S]) -> Option<&Value> {
        let mut current = self;
        for segment in segments {
            let segment = segment.as_ref();
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Renders the value the way string aggregation concatenates it.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Timestamp(ts) => ts.to_rfc3339(),
            Value::Bytes(_) | Value::Array(_) | Value::Object(_) => self.to_json().to_string(),
        }
    }

    /// Canonical key used to bucket values by equality. Integers and
    /// integral floats share a key, as they compare equal.
    pub fn group_key(&self) -> String {
        let value = self.integral_form();
        let kind = if value.is_numeric() { "number" } else { value.type_name() };
        format!("{}:{}", kind, value.to_json())
    }

    fn integral_form(&self) -> Value {
        match self {
            // exact below 2^53
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::Integer(*f as i64),
            Value::Array(items) => Value::Array(items.iter().map(Value::integral_form).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.integral_form()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Convert from serde_json::Value.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else {
                    n.as_f64().map(Value::Float).unwrap_or(Value::Null)
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to serde_json::Value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(bytes) => {
                serde_json::Value::Array(bytes.iter().map(|b| serde_json::Value::from(*b)).collect())
            }
            Value::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::String(s) => write!(f, "'{}'", s),
            other => f.write_str(&other.to_display_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::from_json(v)
    }
}

// =============================================================================
// Data Type Definitions
// =============================================================================

/// Declared type of an entity field, as reported by the schema provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    Decimal { precision: u8, scale: u8 },
    Varchar(u16),
    Text,
    Blob,
    Date,
    Timestamp,
    Json,
    Jsonb,
    Uuid,
    Array(Box<DataType>),
}

impl DataType {
    /// Returns true if values of this type are stored as JSON documents.
    pub fn is_json(&self) -> bool {
        matches!(self, DataType::Json | DataType::Jsonb)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, DataType::Array(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::SmallInt
                | DataType::Integer
                | DataType::BigInt
                | DataType::Float
                | DataType::Double
                | DataType::Decimal { .. }
        )
    }
}

// =============================================================================
// Dialects
// =============================================================================

/// Relational backend a SQL translation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Postgres,
    MySql,
    Sqlite,
    H2,
}

impl DialectKind {
    pub fn name(&self) -> &'static str {
        match self {
            DialectKind::Postgres => "postgres",
            DialectKind::MySql => "mysql",
            DialectKind::Sqlite => "sqlite",
            DialectKind::H2 => "h2",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_ordering_crosses_kinds() {
        assert_eq!(Value::Integer(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Value::Float(3.0).compare(&Value::Integer(3)), Some(Ordering::Equal));
        assert!(Value::Integer(1).loose_eq(&Value::Float(1.0)));
    }

    #[test]
    fn test_unorderable_values() {
        assert_eq!(Value::String("a".into()).compare(&Value::Integer(1)), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
        assert_eq!(Value::Array(vec![]).compare(&Value::Array(vec![])), None);
    }

    #[test]
    fn test_get_path() {
        let json = serde_json::json!({"address": {"city": "Oslo", "zips": [10, 20]}});
        let value = Value::from_json(json);
        assert_eq!(value.get_path(&["address", "city"]), Some(&Value::from("Oslo")));
        assert_eq!(value.get_path(&["address", "zips", "1"]), Some(&Value::Integer(20)));
        assert_eq!(value.get_path(&["address", "street"]), None);
    }

    #[test]
    fn test_json_round_trip_keeps_key_order() {
        let json = serde_json::json!({"b": 1, "a": [true, null, 2.5]});
        let value = Value::from_json(json.clone());
        assert_eq!(value.to_json(), json);
        assert_eq!(value.to_json().to_string(), r#"{"a":[true,null,2.5],"b":1}"#);
    }

    #[test]
    fn test_group_key_distinguishes_kinds() {
        assert_ne!(Value::from("1").group_key(), Value::Integer(1).group_key());
        assert_eq!(Value::from("x").group_key(), Value::from("x").group_key());
    }

    #[test]
    fn test_group_key_merges_equal_numbers() {
        assert_eq!(Value::Integer(1).group_key(), Value::Float(1.0).group_key());
        assert_ne!(Value::Integer(1).group_key(), Value::Float(1.5).group_key());
        let ints = Value::Array(vec![Value::Integer(2), Value::Integer(3)]);
        let floats = Value::Array(vec![Value::Float(2.0), Value::Float(3.0)]);
        assert_eq!(ints.group_key(), floats.group_key());
    }

    #[test]
    fn test_data_type_classification() {
        assert!(DataType::Jsonb.is_json());
        assert!(!DataType::Text.is_json());
        assert!(DataType::Array(Box::new(DataType::Text)).is_array());
        assert!(DataType::Decimal { precision: 10, scale: 2 }.is_numeric());
    }
}

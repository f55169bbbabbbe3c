//! Quarry Document Types
//!
//! Documents as the filter language sees them: an identifier plus a tree of
//! values addressed by dotted keys.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use quarry_common::{QuarryError, Result, Value};
use quarry_query::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// Key the identifier is stored under in JSON form.
pub const ID_KEY: &str = "_id";

// =============================================================================
// Document ID
// =============================================================================

/// Unique identifier for a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Document
// =============================================================================

/// A document: identifier and top-level fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub data: BTreeMap<String, Value>,
}

impl Document {
    pub fn with_id(id: impl Into<DocumentId>) -> Self {
        Self {
            id: id.into(),
            data: BTreeMap::new(),
        }
    }

    /// Builder-style `set`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Parse a JSON object. The `_id` member becomes the identifier, as JSON
    /// text when it is not a string.
    pub fn from_json(json: JsonValue) -> Result<Self> {
        let JsonValue::Object(obj) = json else {
            return Err(QuarryError::TypeError("document must be a JSON object".to_string()));
        };
        let mut id = None;
        let mut data = BTreeMap::new();
        for (key, value) in obj {
            if key == ID_KEY {
                id = Some(match value {
                    JsonValue::String(s) => DocumentId(s),
                    other => DocumentId(other.to_string()),
                });
            } else {
                data.insert(key, Value::from_json(value));
            }
        }
        let id = id.ok_or_else(|| QuarryError::InvalidQuery(format!("document without {}", ID_KEY)))?;
        Ok(Self { id, data })
    }

    pub fn to_json(&self) -> JsonValue {
        let mut obj = serde_json::Map::new();
        obj.insert(ID_KEY.to_string(), JsonValue::String(self.id.0.clone()));
        for (k, v) in &self.data {
            obj.insert(k.clone(), v.to_json());
        }
        JsonValue::Object(obj)
    }

    /// Value at a dotted key such as `address.city` or `tags.0`. The
    /// identifier answers to `_id`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.');
        let head = parts.next()?;
        let rest: Vec<&str> = parts.collect();
        self.data.get(head)?.get_path(&rest)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        key == ID_KEY || self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Documents can be evaluated in memory like any other entity.
impl Entity for Document {
    fn get(&self, field: &str) -> Option<Value> {
        if field == ID_KEY {
            return Some(Value::String(self.id.0.clone()));
        }
        Document::get(self, field).cloned()
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        if field == ID_KEY {
            return Err(QuarryError::InvalidQuery("document id is immutable".to_string()));
        }
        Document::set(self, field, value);
        Ok(())
    }

    fn field_names(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Quarry Metadata - Entity Schemas
//!
//! Read-only schema information consulted by translators and binders:
//! entity to table mapping, field to column mapping, declared types and the
//! codec used to serialize structured JSON values.
//!
//! Key Features:
//! - SchemaProvider seam for external metadata sources
//! - In-memory Catalog implementation
//! - Pluggable field codecs with a JSON default
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use quarry_common::{DataType, QuarryError, Result, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Field Codecs
// =============================================================================

/// Serializes structured values into the text stored in a JSON column.
pub trait FieldCodec: Send + Sync + fmt::Debug {
    fn encode(&self, value: &Value) -> Result<String>;
    fn decode(&self, text: &str) -> Result<Value>;
}

/// Plain JSON text codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl FieldCodec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<String> {
        serde_json::to_string(&value.to_json()).map_err(|e| QuarryError::Codec(e.to_string()))
    }

    fn decode(&self, text: &str) -> Result<Value> {
        serde_json::from_str::<serde_json::Value>(text)
            .map(Value::from_json)
            .map_err(|e| QuarryError::Codec(e.to_string()))
    }
}

// =============================================================================
// Field Metadata
// =============================================================================

/// Metadata for one entity field.
#[derive(Debug, Clone)]
pub struct FieldMeta {
    pub name: String,
    pub column: String,
    pub data_type: DataType,
    pub primary_key: bool,
    pub nullable: bool,
    codec: Option<Arc<dyn FieldCodec>>,
}

impl FieldMeta {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            data_type,
            primary_key: false,
            nullable: true,
            codec: None,
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn FieldCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn is_json(&self) -> bool {
        self.data_type.is_json()
    }

    /// Codec for structured values; JSON text unless overridden.
    pub fn codec(&self) -> Arc<dyn FieldCodec> {
        match &self.codec {
            Some(codec) => Arc::clone(codec),
            None => Arc::new(JsonCodec),
        }
    }
}

// =============================================================================
// Entity Schema
// =============================================================================

/// Schema for an entity.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub name: String,
    pub table: String,
    fields: Vec<FieldMeta>,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldMeta) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn require_field(&self, name: &str) -> Result<&FieldMeta> {
        self.get_field(name).ok_or_else(|| QuarryError::FieldNotFound {
            entity: self.name.clone(),
            field: name.to_string(),
        })
    }

    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    pub fn primary_key(&self) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.primary_key)
    }
}

// =============================================================================
// Schema Provider
// =============================================================================

/// Source of entity metadata.
pub trait SchemaProvider: Send + Sync {
    fn entity(&self, name: &str) -> Option<&EntitySchema>;

    fn require_entity(&self, name: &str) -> Result<&EntitySchema> {
        self.entity(name)
            .ok_or_else(|| QuarryError::EntityNotFound(name.to_string()))
    }
}

/// In-memory schema catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entities: HashMap<String, EntitySchema>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&mut self, schema: EntitySchema) {
        self.entities.insert(schema.name.clone(), schema);
    }

    pub fn with_entity(mut self, schema: EntitySchema) -> Self {
        self.add_entity(schema);
        self
    }

    pub fn entity_exists(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }
}

impl SchemaProvider for Catalog {
    fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.get(name)
    }
}

// =============================================================================
// Tests
// =============================================================================

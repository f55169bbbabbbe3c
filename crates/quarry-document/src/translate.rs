//! Quarry Document Translator
//!
//! Converts query filters into [`DocumentFilter`] expressions. Each filter
//! becomes one node; several filters are joined under `$and`.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::filter::DocumentFilter;
use quarry_common::utils::like_to_regex;
use quarry_common::{QuarryError, Result, Value};
use quarry_query::json_path::{self, ValueBinding};
use quarry_query::{EntitySchema, FieldMeta, FilterOption, FilterValue, Operator, Query, SchemaProvider};
use regex::Regex;

const BACKEND: &str = "document";

fn unsupported(what: impl Into<String>) -> QuarryError {
    QuarryError::UnsupportedOperator {
        operator: what.into(),
        backend: BACKEND.to_string(),
    }
}

// =============================================================================
// Translator
// =============================================================================

/// Document filter translator backed by entity metadata.
pub struct DocumentFilterTranslator<'a> {
    schema: &'a dyn SchemaProvider,
}

impl<'a> DocumentFilterTranslator<'a> {
    pub fn new(schema: &'a dyn SchemaProvider) -> Self {
        Self { schema }
    }

    /// Translate an AND-combined filter list. No filters match everything.
    pub fn translate(&self, entity: &str, filters: &[FilterOption]) -> Result<DocumentFilter> {
        let schema = self.schema.require_entity(entity)?;
        let nodes = filters
            .iter()
            .map(|f| self.filter(schema, f))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(entity, filters = nodes.len(), "Translated document filter");
        Ok(DocumentFilter::and(nodes))
    }

    /// Translate the filters of a select, update or delete.
    pub fn translate_query(&self, entity: &str, query: &Query) -> Result<DocumentFilter> {
        match query {
            // join hints only steer SQL fetching
            Query::Select(_) | Query::Update(_) | Query::Delete(_) => {
                self.translate(entity, query.where_filters())
            }
            Query::Aggregate(_) | Query::Window(_) => Err(unsupported(query.kind_name())),
        }
    }

    fn filter(&self, schema: &EntitySchema, filter: &FilterOption) -> Result<DocumentFilter> {
        match filter {
            FilterOption::Plain { .. } if filter.is_sub_query_existence() => {
                Err(unsupported(format!("{} (sub-query)", filter.operator())))
            }
            FilterOption::Plain {
                field,
                operator,
                value,
            } => {
                let meta = schema.require_field(field)?;
                let binding = json_path::binding_for(Some(meta), None, value)?;
                Node::new(meta.column.clone(), meta, binding).build(*operator, value)
            }
            FilterOption::JsonPath {
                field,
                json_path: path,
                operator,
                value,
            } => {
                let meta = schema.require_field(field)?;
                let binding = json_path::binding_for(Some(meta), Some(path), value)?;
                let key = json_path::document_key(&meta.column, Some(path))?;
                Node::new(key, meta, binding).build(*operator, value)
            }
            FilterOption::AggregateComparison { .. } => Err(unsupported("HAVING")),
        }
    }
}

// =============================================================================
// Node Construction
// =============================================================================

/// One filter being converted: its dotted key and how its operand binds.
struct Node<'m> {
    key: String,
    meta: &'m FieldMeta,
    binding: ValueBinding,
}

impl<'m> Node<'m> {
    fn new(key: String, meta: &'m FieldMeta, binding: ValueBinding) -> Self {
        Self { key, meta, binding }
    }

    /// Native document value of an operand. Whole-document operands pass
    /// through the field codec first so they compare as stored.
    fn native(&self, value: &Value) -> Result<Value> {
        if self.binding == ValueBinding::WholeDocument {
            let codec = self.meta.codec();
            return codec.decode(&codec.encode(value)?);
        }
        Ok(value.clone())
    }

    fn scalar(&self, operator: Operator, value: &FilterValue) -> Result<Value> {
        match value {
            FilterValue::Scalar(v) => self.native(v),
            FilterValue::Outer(_) => Err(unsupported(format!("{} (outer reference)", operator))),
            FilterValue::SubQuery(_) => Err(unsupported(format!("{} (sub-query)", operator))),
            other => Err(QuarryError::InvalidQuery(format!(
                "operator {} cannot take operand {:?}",
                operator, other
            ))),
        }
    }

    fn list(&self, operator: Operator, value: &FilterValue) -> Result<Vec<Value>> {
        match value {
            FilterValue::List(items) => items.iter().map(|v| self.native(v)).collect(),
            FilterValue::SubQuery(_) => Err(unsupported(format!("{} (sub-query)", operator))),
            _ => Err(QuarryError::NotACollection(operator.to_string())),
        }
    }

    fn text(&self, operator: Operator, value: &FilterValue) -> Result<String> {
        match self.scalar(operator, value)? {
            Value::String(s) => Ok(s),
            other => Err(QuarryError::TypeError(format!(
                "operator {} needs a string, got {}",
                operator,
                other.type_name()
            ))),
        }
    }

    fn build(self, operator: Operator, value: &FilterValue) -> Result<DocumentFilter> {
        let field = self.key.clone();
        Ok(match operator {
            Operator::Eq => DocumentFilter::Eq {
                field,
                value: self.scalar(operator, value)?,
            },
            Operator::Ne => DocumentFilter::Ne {
                field,
                value: self.scalar(operator, value)?,
            },
            Operator::Gt => DocumentFilter::Gt {
                field,
                value: self.scalar(operator, value)?,
            },
            Operator::Gte => DocumentFilter::Gte {
                field,
                value: self.scalar(operator, value)?,
            },
            Operator::Lt => DocumentFilter::Lt {
                field,
                value: self.scalar(operator, value)?,
            },
            Operator::Lte => DocumentFilter::Lte {
                field,
                value: self.scalar(operator, value)?,
            },
            Operator::In => DocumentFilter::In {
                field,
                values: self.list(operator, value)?,
            },
            Operator::NotIn => DocumentFilter::Nin {
                field,
                values: self.list(operator, value)?,
            },
            Operator::All => DocumentFilter::All {
                field,
                values: self.list(operator, value)?,
            },
            Operator::Like | Operator::NotLike => {
                let regex = DocumentFilter::Regex {
                    field,
                    pattern: like_to_regex(&self.text(operator, value)?),
                };
                if operator == Operator::Like {
                    regex
                } else {
                    DocumentFilter::Not(Box::new(regex))
                }
            }
            Operator::Regex => {
                let pattern = self.text(operator, value)?;
                Regex::new(&pattern).map_err(|e| QuarryError::InvalidQuery(format!("bad regex: {}", e)))?;
                DocumentFilter::Regex { field, pattern }
            }
            Operator::IsNull => DocumentFilter::Eq {
                field,
                value: Value::Null,
            },
            Operator::IsNotNull => DocumentFilter::Ne {
                field,
                value: Value::Null,
            },
            Operator::Between => match value {
                FilterValue::Range(low, high) => DocumentFilter::And(vec![
                    DocumentFilter::Gte {
                        field: field.clone(),
                        value: self.native(low)?,
                    },
                    DocumentFilter::Lte {
                        field,
                        value: self.native(high)?,
                    },
                ]),
                _ => return Err(QuarryError::InvalidQuery("BETWEEN requires a range".to_string())),
            },
            Operator::Exists | Operator::NotExists => {
                // null and true ask for presence
                let present = matches!(
                    value,
                    FilterValue::Empty | FilterValue::Scalar(Value::Null) | FilterValue::Scalar(Value::Boolean(true))
                );
                DocumentFilter::Exists {
                    field,
                    exists: present == (operator == Operator::Exists),
                }
            }
            Operator::Type => DocumentFilter::Type {
                field,
                type_name: self.text(operator, value)?,
            },
            Operator::Size => match self.scalar(operator, value)?.as_i64() {
                Some(size) => DocumentFilter::Size { field, size },
                None => return Err(QuarryError::TypeError("SIZE needs an integer".to_string())),
            },
            Operator::ElemMatch => DocumentFilter::ElemMatch {
                field,
                value: self.scalar(operator, value)?,
            },
            Operator::Text => DocumentFilter::Text {
                field,
                search: self.text(operator, value)?,
            },
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_common::DataType;
    use quarry_query::prelude::*;
    use serde_json::json;

    fn catalog() -> Catalog {
        Catalog::new().with_entity(
            EntitySchema::new("User", "users")
                .field(FieldMeta::new("id", DataType::BigInt).primary_key())
                .field(FieldMeta::new("name", DataType::Text))
                .field(FieldMeta::new("age", DataType::Integer))
                .field(FieldMeta::new("fullName", DataType::Text).with_column("full_name"))
                .field(FieldMeta::new("tags", DataType::Json))
                .field(FieldMeta::new("meta", DataType::Jsonb)),
        )
    }

    fn translate(builder: SelectBuilder) -> Result<DocumentFilter> {
        let catalog = catalog();
        let query = builder.build()?;
        DocumentFilterTranslator::new(&catalog).translate_query("User", &query)
    }

    #[test]
    fn test_single_and_conjunction() {
        let one = translate(select().where_("age").gt(21)).unwrap();
        assert_eq!(one.to_json(), json!({"age": {"$gt": 21}}));

        let many = translate(select().where_("age").gte(21).where_("fullName").eq("Al")).unwrap();
        assert_eq!(
            many.to_json(),
            json!({"$and": [{"age": {"$gte": 21}}, {"full_name": {"$eq": "Al"}}]})
        );
        assert_eq!(translate(select()).unwrap(), DocumentFilter::match_all());
    }

    #[test]
    fn test_json_path_keys() {
        let f = translate(select().where_json("meta", "$.address.city").eq("Oslo")).unwrap();
        assert_eq!(f.to_json(), json!({"meta.address.city": {"$eq": "Oslo"}}));
        let f = translate(select().where_json("meta", "$.items[0]").exists()).unwrap();
        assert_eq!(f.to_json(), json!({"meta.items.0": {"$exists": true}}));
    }

    #[test]
    fn test_exists_presence() {
        let f = translate(select().where_("name").not_exists()).unwrap();
        assert_eq!(f.to_json(), json!({"name": {"$exists": false}}));
        let catalog = catalog();
        let filter = FilterOption::plain("name", Operator::Exists, FilterValue::scalar(false)).unwrap();
        let f = DocumentFilterTranslator::new(&catalog).translate("User", &[filter]).unwrap();
        assert_eq!(f, DocumentFilter::Exists { field: "name".into(), exists: false });
    }

    #[test]
    fn test_like_between_and_nulls() {
        let f = translate(select().where_("name").like("Al%")).unwrap();
        assert_eq!(f.to_json(), json!({"name": {"$regex": "(?s)^Al.*$"}}));
        let f = translate(select().where_("age").between(18, 65)).unwrap();
        assert_eq!(
            f.to_json(),
            json!({"$and": [{"age": {"$gte": 18}}, {"age": {"$lte": 65}}]})
        );
        let f = translate(select().where_("name").is_null()).unwrap();
        assert_eq!(f.to_json(), json!({"name": {"$eq": null}}));
    }

    #[test]
    fn test_structured_values_pass_through_codec() {
        let mut attrs = std::collections::BTreeMap::new();
        attrs.insert("plan".to_string(), Value::from("pro"));
        let f = translate(select().where_("meta").eq(Value::Object(attrs.clone()))).unwrap();
        assert_eq!(
            f,
            DocumentFilter::Eq {
                field: "meta".into(),
                value: Value::Object(attrs)
            }
        );
    }

    #[test]
    fn test_collection_operators() {
        let f = translate(select().where_("tags").contains_all(["a", "b"])).unwrap();
        assert_eq!(f.to_json(), json!({"tags": {"$all": ["a", "b"]}}));
        let f = translate(select().where_("age").not_in([1, 2])).unwrap();
        assert_eq!(f.to_json(), json!({"age": {"$nin": [1, 2]}}));

        let catalog = catalog();
        let bad = FilterOption::Plain {
            field: "age".into(),
            operator: Operator::In,
            value: FilterValue::scalar(1),
        };
        assert!(matches!(
            DocumentFilterTranslator::new(&catalog).translate("User", &[bad]),
            Err(QuarryError::NotACollection(_))
        ));
    }

    #[test]
    fn test_unsupported_shapes_fail() {
        let err = translate(select().where_("id").in_sub_query(sub_query("User").select_field("id"))).unwrap_err();
        assert!(matches!(err, QuarryError::UnsupportedOperator { ref backend, .. } if backend == "document"));

        let catalog = catalog();
        let q = aggregate().select(field("age").sum().as_("s")).build().unwrap();
        assert!(DocumentFilterTranslator::new(&catalog).translate_query("User", &q).is_err());

        let err = translate(select().where_("nickname").eq("x")).unwrap_err();
        assert!(matches!(err, QuarryError::FieldNotFound { .. }));
        let err = translate(select().where_("name").regex("(")).unwrap_err();
        assert!(matches!(err, QuarryError::InvalidQuery(_)));
    }
}

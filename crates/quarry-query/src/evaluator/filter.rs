//! Quarry Evaluator Filters - Predicate Matching
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use super::{InMemoryEvaluator, Row};
use crate::ast::*;
use crate::json_path;
use quarry_common::utils::compile_like;
use quarry_common::{QuarryError, Result, Value};
use regex::Regex;
use std::cmp::Ordering;

/// Ordering of two non-null, mutually orderable values.
fn ordered(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    if lhs.is_null() || rhs.is_null() {
        return None;
    }
    lhs.compare(rhs)
}

/// Object elements match when they contain every key of the pattern.
fn element_matches(element: &Value, pattern: &Value) -> bool {
    match (element, pattern) {
        (Value::Object(have), Value::Object(want)) => want
            .iter()
            .all(|(k, v)| have.get(k).map(|h| h.loose_eq(v)).unwrap_or(false)),
        _ => element.loose_eq(pattern),
    }
}

impl InMemoryEvaluator<'_> {
    /// AND of every filter.
    pub(crate) fn row_matches(&self, row: &Row<'_>, filters: &[FilterOption]) -> Result<bool> {
        for filter in filters {
            if !self.filter_matches(row, filter)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) fn filter_matches(&self, row: &Row<'_>, filter: &FilterOption) -> Result<bool> {
        match filter {
            FilterOption::Plain {
                field,
                operator,
                value,
            } => {
                if let (Operator::Exists | Operator::NotExists, FilterValue::SubQuery(sq)) = (operator, value) {
                    let found = !self.run_sub_query(sq, row)?.is_empty();
                    return Ok(found == (*operator == Operator::Exists));
                }
                let structured = matches!(
                    value,
                    FilterValue::Scalar(Value::Object(_)) | FilterValue::Scalar(Value::Array(_))
                );
                let lhs = if structured {
                    row.document(field)?
                } else {
                    row.value(field)
                };
                self.test(row, *operator, &lhs, value)
            }
            FilterOption::JsonPath {
                field,
                json_path,
                operator,
                value,
            } => {
                let segments = json_path::segments(json_path)?;
                let document = row.document(field)?;
                let lhs = document.get_path(&segments).cloned().unwrap_or(Value::Null);
                self.test(row, *operator, &lhs, value)
            }
            FilterOption::AggregateComparison { expr, .. } => Err(QuarryError::InvalidQuery(format!(
                "aggregate comparison on {} outside HAVING",
                expr.label()
            ))),
        }
    }

    /// Single value an operand stands for in `row`.
    fn operand(&self, row: &Row<'_>, value: &FilterValue) -> Result<Value> {
        match value {
            FilterValue::Scalar(v) => Ok(v.clone()),
            FilterValue::Outer(reference) => row.outer_value(&reference.name),
            FilterValue::SubQuery(sq) => self.scalar_sub_query(sq, row),
            FilterValue::Empty => Ok(Value::Null),
            FilterValue::List(_) | FilterValue::Range(_, _) => Err(QuarryError::InvalidQuery(format!(
                "operand {:?} is not a single value",
                value
            ))),
        }
    }

    fn collection(&self, row: &Row<'_>, operator: Operator, value: &FilterValue) -> Result<Vec<Value>> {
        match value {
            FilterValue::List(items) => Ok(items.clone()),
            FilterValue::SubQuery(sq) => Ok(self
                .run_sub_query(sq, row)?
                .iter()
                .map(|r| r.first_value())
                .collect()),
            _ => Err(QuarryError::NotACollection(operator.to_string())),
        }
    }

    /// Apply `operator` to a resolved left-hand side. Comparisons involving
    /// NULL or unorderable values are false.
    pub(crate) fn test(&self, row: &Row<'_>, operator: Operator, lhs: &Value, value: &FilterValue) -> Result<bool> {
        match operator {
            Operator::Eq => {
                let rhs = self.operand(row, value)?;
                Ok(!lhs.is_null() && !rhs.is_null() && lhs.loose_eq(&rhs))
            }
            Operator::Ne => {
                let rhs = self.operand(row, value)?;
                Ok(!lhs.is_null() && !rhs.is_null() && !lhs.loose_eq(&rhs))
            }
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                let rhs = self.operand(row, value)?;
                Ok(match ordered(lhs, &rhs) {
                    Some(ord) => match operator {
                        Operator::Gt => ord == Ordering::Greater,
                        Operator::Gte => ord != Ordering::Less,
                        Operator::Lt => ord == Ordering::Less,
                        _ => ord != Ordering::Greater,
                    },
                    None => false,
                })
            }
            Operator::In | Operator::NotIn => {
                let candidates = self.collection(row, operator, value)?;
                if candidates.is_empty() {
                    return Ok(operator == Operator::NotIn);
                }
                if lhs.is_null() {
                    return Ok(false);
                }
                let found = candidates.iter().any(|c| !c.is_null() && lhs.loose_eq(c));
                Ok(match operator {
                    Operator::In => found,
                    _ => !found && !candidates.iter().any(Value::is_null),
                })
            }
            Operator::Like | Operator::NotLike => {
                let pattern = self.operand(row, value)?;
                match (lhs.as_str(), pattern.as_str()) {
                    (Some(text), Some(pattern)) => {
                        let hit = compile_like(pattern)?.is_match(text);
                        Ok(hit == (operator == Operator::Like))
                    }
                    _ => Ok(false),
                }
            }
            Operator::IsNull => Ok(lhs.is_null()),
            Operator::IsNotNull => Ok(!lhs.is_null()),
            Operator::Between => match value {
                FilterValue::Range(low, high) => Ok(matches!(
                    (ordered(lhs, low), ordered(lhs, high)),
                    (Some(Ordering::Greater | Ordering::Equal), Some(Ordering::Less | Ordering::Equal))
                )),
                _ => Err(QuarryError::InvalidQuery("BETWEEN requires a range".to_string())),
            },
            Operator::Exists | Operator::NotExists => {
                let wanted = !matches!(value, FilterValue::Scalar(Value::Boolean(false)));
                let present = !lhs.is_null();
                Ok(present == (wanted == (operator == Operator::Exists)))
            }
            Operator::Regex => {
                let pattern = self.operand(row, value)?;
                match (lhs.as_str(), pattern.as_str()) {
                    (Some(text), Some(pattern)) => {
                        let regex = Regex::new(pattern)
                            .map_err(|e| QuarryError::InvalidQuery(format!("bad regex: {}", e)))?;
                        Ok(regex.is_match(text))
                    }
                    _ => Ok(false),
                }
            }
            Operator::Size => {
                let expected = self.operand(row, value)?;
                Ok(match (lhs.as_array(), expected.as_i64()) {
                    (Some(items), Some(n)) => items.len() as i64 == n,
                    _ => false,
                })
            }
            Operator::Type => {
                let expected = self.operand(row, value)?;
                Ok(match expected.as_str() {
                    Some("number") => lhs.is_numeric(),
                    Some(name) => lhs.type_name() == name,
                    None => false,
                })
            }
            Operator::All => {
                let wanted = self.collection(row, operator, value)?;
                Ok(match lhs.as_array() {
                    Some(items) => wanted.iter().all(|w| items.iter().any(|i| i.loose_eq(w))),
                    None => false,
                })
            }
            Operator::ElemMatch => {
                let pattern = self.operand(row, value)?;
                Ok(match lhs.as_array() {
                    Some(items) => items.iter().any(|i| element_matches(i, &pattern)),
                    None => false,
                })
            }
            Operator::Text => {
                let search = self.operand(row, value)?;
                Ok(match (lhs.as_str(), search.as_str()) {
                    (Some(text), Some(search)) => {
                        let text = text.to_lowercase();
                        search
                            .split_whitespace()
                            .any(|term| text.contains(&term.to_lowercase()))
                    }
                    _ => false,
                })
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::ast::FilterOption;
    use crate::builder::*;
    use crate::evaluator::{AdapterRegistry, InMemoryEvaluator, Record};
    use crate::metadata::{Catalog, EntitySchema, FieldMeta};
    use quarry_common::{DataType, Value};
    use std::collections::BTreeMap;

    fn catalog() -> Catalog {
        Catalog::new().with_entity(
            EntitySchema::new("Item", "items")
                .field(FieldMeta::new("id", DataType::BigInt).primary_key())
                .field(FieldMeta::new("name", DataType::Text))
                .field(FieldMeta::new("qty", DataType::Integer))
                .field(FieldMeta::new("tags", DataType::Json))
                .field(FieldMeta::new("attrs", DataType::Jsonb)),
        )
    }

    fn item() -> Record {
        let mut attrs = BTreeMap::new();
        attrs.insert("color".to_string(), Value::from("red"));
        attrs.insert("weight".to_string(), Value::from(2.5));
        Record::new()
            .with("id", 1)
            .with("name", "Red Widget")
            .with("qty", Value::Null)
            .with("tags", Value::Array(vec![Value::from("a"), Value::from("b")]))
            // stored as text, decoded through the field codec
            .with("attrs", serde_json::to_string(&Value::Object(attrs).to_json()).unwrap())
    }

    fn filters(sink: SelectBuilder) -> Vec<FilterOption> {
        match sink.build().unwrap() {
            crate::ast::Query::Select(q) => q.filters,
            _ => unreachable!(),
        }
    }

    fn check(filters: Vec<FilterOption>) -> bool {
        let catalog = catalog();
        let adapters = AdapterRegistry::new();
        InMemoryEvaluator::new(&catalog, &adapters)
            .matches("Item", &filters, &item())
            .unwrap()
    }

    #[test]
    fn test_null_comparisons_are_false() {
        assert!(!check(filters(select().where_("qty").eq(Value::Null))));
        assert!(!check(filters(select().where_("qty").ne(5))));
        assert!(!check(filters(select().where_("qty").gt(0))));
        assert!(!check(filters(select().where_("qty").not_in([1, 2]))));
        assert!(check(filters(select().where_("qty").is_null())));
    }

    #[test]
    fn test_empty_lists() {
        assert!(!check(filters(select().where_("id").in_list(Vec::<i64>::new()))));
        assert!(check(filters(select().where_("id").not_in(Vec::<i64>::new()))));
    }

    #[test]
    fn test_like_and_regex() {
        assert!(check(filters(select().where_("name").like("Red%"))));
        assert!(!check(filters(select().where_("name").like("red%"))));
        assert!(check(filters(select().where_("name").regex("(?i)widget$"))));
        assert!(check(filters(select().where_("name").text("blue widget"))));
    }

    #[test]
    fn test_json_path_reads_decoded_document() {
        assert!(check(filters(select().where_json("attrs", "$.color").eq("red"))));
        assert!(check(filters(select().where_json("attrs", "$.weight").between(2, 3))));
        assert!(!check(filters(select().where_json("attrs", "$.missing").exists())));
    }

    #[test]
    fn test_array_operators() {
        assert!(check(filters(select().where_("tags").size(2))));
        assert!(check(filters(select().where_("tags").contains_all(["b", "a"]))));
        assert!(!check(filters(select().where_("tags").contains_all(["a", "z"]))));
        assert!(check(filters(select().where_("tags").elem_match("b"))));
        assert!(check(filters(select().where_("tags").has_type("array"))));
    }
}

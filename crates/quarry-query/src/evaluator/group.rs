//! Quarry Evaluator Grouping - Partitions and Aggregation
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use super::sort::compare_values;
use super::{InMemoryEvaluator, ResultRow, Row};
use crate::ast::*;
use crate::json_path;
use quarry_common::{QuarryError, Result, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Indexes of `rows` bucketed by the tuple of `fields`, in first-seen
/// order. No fields yields one bucket holding every row, even when empty.
pub(crate) fn partition(rows: &[Row<'_>], fields: &[String]) -> Vec<Vec<usize>> {
    if fields.is_empty() {
        return vec![(0..rows.len()).collect()];
    }
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<Vec<usize>> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let key = fields
            .iter()
            .map(|f| row.value(f).group_key())
            .collect::<Vec<_>>()
            .join("\u{1f}");
        match index.get(&key) {
            Some(&bucket) => buckets[bucket].push(i),
            None => {
                index.insert(key, buckets.len());
                buckets.push(vec![i]);
            }
        }
    }
    buckets
}

// =============================================================================
// Accumulator
// =============================================================================

/// Running COUNT/SUM/AVG/MIN/MAX state. NULL inputs are skipped.
#[derive(Debug, Clone)]
pub(crate) struct Accumulator {
    count: i64,
    numeric: i64,
    /// Exact integer sum; `None` once a float or an overflow is seen.
    int_sum: Option<i64>,
    float_sum: f64,
    min: Option<Value>,
    max: Option<Value>,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            count: 0,
            numeric: 0,
            int_sum: Some(0),
            float_sum: 0.0,
            min: None,
            max: None,
        }
    }
}

impl Accumulator {
    pub fn push(&mut self, value: &Value) {
        if value.is_null() {
            return;
        }
        self.count += 1;
        match value {
            Value::Integer(i) => {
                self.numeric += 1;
                self.int_sum = self.int_sum.and_then(|s| s.checked_add(*i));
                self.float_sum += *i as f64;
            }
            Value::Float(f) => {
                self.numeric += 1;
                self.int_sum = None;
                self.float_sum += f;
            }
            _ => {}
        }
        if self
            .min
            .as_ref()
            .map(|m| compare_values(value, m) == Ordering::Less)
            .unwrap_or(true)
        {
            self.min = Some(value.clone());
        }
        if self
            .max
            .as_ref()
            .map(|m| compare_values(value, m) == Ordering::Greater)
            .unwrap_or(true)
        {
            self.max = Some(value.clone());
        }
    }

    pub fn count(&self) -> Value {
        Value::Integer(self.count)
    }

    /// Integer when every input was an integer, NULL without numeric input.
    pub fn sum(&self) -> Value {
        if self.numeric == 0 {
            return Value::Null;
        }
        match self.int_sum {
            Some(sum) => Value::Integer(sum),
            None => Value::Float(self.float_sum),
        }
    }

    pub fn avg(&self) -> Value {
        if self.numeric == 0 {
            return Value::Null;
        }
        Value::Float(self.float_sum / self.numeric as f64)
    }

    pub fn min(&self) -> Value {
        self.min.clone().unwrap_or(Value::Null)
    }

    pub fn max(&self) -> Value {
        self.max.clone().unwrap_or(Value::Null)
    }
}

fn accumulate(inputs: &[Value]) -> Accumulator {
    let mut acc = Accumulator::default();
    inputs.iter().for_each(|v| acc.push(v));
    acc
}

/// Sample variance; NULL below two numeric inputs.
fn sample_variance(values: &[Value]) -> Option<f64> {
    let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
    if numbers.len() < 2 {
        return None;
    }
    let n = numbers.len() as f64;
    let mean = numbers.iter().sum::<f64>() / n;
    Some(numbers.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0))
}

// =============================================================================
// Aggregation
// =============================================================================

impl InMemoryEvaluator<'_> {
    /// Value an aggregate reads from one row.
    fn aggregate_input(&self, row: &Row<'_>, expr: &AggregateExpr) -> Result<Value> {
        match &expr.json_path {
            Some(path) => {
                let segments = json_path::segments(path)?;
                let document = row.document(&expr.field)?;
                Ok(document.get_path(&segments).cloned().unwrap_or(Value::Null))
            }
            None => Ok(row.value(&expr.field)),
        }
    }

    fn condition_holds(&self, row: &Row<'_>, expr: &AggregateExpr) -> Result<bool> {
        let condition = expr
            .condition
            .as_ref()
            .ok_or_else(|| QuarryError::MissingCondition(expr.agg_type.to_string()))?;
        let lhs = match &condition.field {
            Some(field) => row.value(field),
            None => self.aggregate_input(row, expr)?,
        };
        self.test(row, condition.operator, &lhs, &condition.value)
    }

    /// Compute `expr` over a group of rows.
    pub(crate) fn aggregate(&self, expr: &AggregateExpr, members: &[&Row<'_>]) -> Result<Value> {
        expr.check()?;
        if expr.field == "*" {
            return Ok(Value::Integer(members.len() as i64));
        }
        let inputs = members
            .iter()
            .map(|row| self.aggregate_input(row, expr))
            .collect::<Result<Vec<_>>>()?;

        Ok(match expr.agg_type {
            AggregationType::Count => accumulate(&inputs).count(),
            AggregationType::CountDistinct => {
                let distinct: HashSet<String> = inputs
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(Value::group_key)
                    .collect();
                Value::Integer(distinct.len() as i64)
            }
            AggregationType::Sum => accumulate(&inputs).sum(),
            AggregationType::Avg => accumulate(&inputs).avg(),
            AggregationType::Min => accumulate(&inputs).min(),
            AggregationType::Max => accumulate(&inputs).max(),
            AggregationType::CountIf => {
                let mut n = 0;
                for row in members {
                    if self.condition_holds(row, expr)? {
                        n += 1;
                    }
                }
                Value::Integer(n)
            }
            AggregationType::SumIf => {
                // Rows failing the condition contribute 0, as in CASE ... ELSE 0.
                let mut acc = Accumulator::default();
                for (row, input) in members.iter().zip(&inputs) {
                    if self.condition_holds(row, expr)? {
                        acc.push(input);
                    } else {
                        acc.push(&Value::Integer(0));
                    }
                }
                acc.sum()
            }
            AggregationType::StringAgg => {
                let parts: Vec<String> = inputs
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(Value::to_display_string)
                    .collect();
                if parts.is_empty() {
                    Value::Null
                } else {
                    Value::String(parts.join(&self.separator))
                }
            }
            AggregationType::ArrayLength => match inputs.first() {
                Some(Value::Array(items)) => Value::Integer(items.len() as i64),
                _ => Value::Null,
            },
            AggregationType::JsonArrayAgg => {
                if inputs.is_empty() {
                    Value::Null
                } else {
                    Value::Array(inputs)
                }
            }
            AggregationType::JsonObjectAgg => {
                if members.is_empty() {
                    return Ok(Value::Null);
                }
                let key_field = expr.key_field.as_deref().unwrap_or_default();
                let mut object = BTreeMap::new();
                for (row, input) in members.iter().zip(inputs) {
                    object.insert(row.value(key_field).to_display_string(), input);
                }
                Value::Object(object)
            }
            AggregationType::Stddev => sample_variance(&inputs)
                .map(|v| Value::Float(v.sqrt()))
                .unwrap_or(Value::Null),
            AggregationType::Variance => sample_variance(&inputs).map(Value::Float).unwrap_or(Value::Null),
            AggregationType::First => inputs.first().cloned().unwrap_or(Value::Null),
            AggregationType::Last => inputs.last().cloned().unwrap_or(Value::Null),
        })
    }

    /// One output row for a group.
    pub(crate) fn group_output(&self, fields: &[FieldDefinition], members: &[&Row<'_>]) -> Result<ResultRow> {
        let mut out = ResultRow::new();
        for def in fields {
            let value = match def {
                FieldDefinition::Simple { field, .. } => {
                    members.first().map(|r| r.value(field)).unwrap_or(Value::Null)
                }
                FieldDefinition::Aggregate { expr, .. } => self.aggregate(expr, members)?,
                FieldDefinition::SubQuery { sub_query, .. } => match members.first() {
                    Some(row) => self.scalar_sub_query(sub_query, row)?,
                    None => Value::Null,
                },
                FieldDefinition::Window(window) => {
                    return Err(QuarryError::InvalidQuery(format!(
                        "window function {} in a grouped query",
                        window.function
                    )))
                }
            };
            out.push(def.output_name(), value);
        }
        Ok(out)
    }

    /// HAVING over one group. A comparison naming a produced alias reads
    /// it; otherwise the aggregate is recomputed over the same members.
    pub(crate) fn having_holds(&self, output: &ResultRow, members: &[&Row<'_>], having: &[FilterOption]) -> Result<bool> {
        let empty = self.empty_row();
        let representative = members.first().copied().unwrap_or(&empty);
        for filter in having {
            let holds = match filter {
                FilterOption::AggregateComparison {
                    expr,
                    operator,
                    value,
                    alias,
                } => {
                    let lhs = match alias.as_deref().and_then(|a| output.value(a)) {
                        Some(produced) => produced.clone(),
                        None => self.aggregate(expr, members)?,
                    };
                    self.test(representative, *operator, &lhs, value)?
                }
                other => self.filter_matches(representative, other)?,
            };
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::*;
    use crate::evaluator::{AdapterRegistry, Record};
    use crate::metadata::{Catalog, EntitySchema, FieldMeta};
    use quarry_common::DataType;

    fn catalog() -> Catalog {
        Catalog::new().with_entity(
            EntitySchema::new("Employee", "employees")
                .field(FieldMeta::new("id", DataType::BigInt).primary_key())
                .field(FieldMeta::new("dept", DataType::Text))
                .field(FieldMeta::new("sal", DataType::Integer))
                .field(FieldMeta::new("status", DataType::Text)),
        )
    }

    fn staff() -> Vec<Record> {
        vec![
            Record::new().with("id", 1).with("dept", "A").with("sal", 10).with("status", "active"),
            Record::new().with("id", 2).with("dept", "A").with("sal", 20).with("status", "left"),
            Record::new().with("id", 3).with("dept", "B").with("sal", 5).with("status", "active"),
        ]
    }

    fn run(query: Query) -> Vec<ResultRow> {
        let catalog = catalog();
        let adapters = AdapterRegistry::new();
        InMemoryEvaluator::new(&catalog, &adapters)
            .evaluate("Employee", &query, &staff())
            .unwrap()
            .into_rows()
            .unwrap()
    }

    #[test]
    fn test_accumulator_sum_types() {
        let mut ints = Accumulator::default();
        ints.push(&Value::from(2));
        ints.push(&Value::Null);
        ints.push(&Value::from(3));
        assert_eq!(ints.sum(), Value::Integer(5));
        assert_eq!(ints.count(), Value::Integer(2));
        assert_eq!(ints.avg(), Value::Float(2.5));

        let mut mixed = Accumulator::default();
        mixed.push(&Value::from(2));
        mixed.push(&Value::from(0.5));
        assert_eq!(mixed.sum(), Value::Float(2.5));
        assert_eq!(Accumulator::default().sum(), Value::Null);
    }

    #[test]
    fn test_partition_first_seen_order() {
        let records = vec![
            Record::new().with("k", "b"),
            Record::new().with("k", "a"),
            Record::new().with("k", "b"),
        ];
        let rows: Vec<Row<'_>> = records
            .iter()
            .map(|r| Row {
                entity: r,
                schema: None,
                outer: None,
                depth: 0,
            })
            .collect();
        assert_eq!(partition(&rows, &["k".to_string()]), vec![vec![0, 2], vec![1]]);
        assert_eq!(partition(&rows[..0], &[]), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn test_having_alias_and_recompute_agree() {
        let by_alias = aggregate()
            .select(field("dept").into_definition())
            .select(field("sal").sum().as_("total"))
            .group_by("dept")
            .having()
            .field("sal")
            .sum()
            .referencing("total")
            .gt(10)
            .end()
            .build()
            .unwrap();
        let recomputed = aggregate()
            .select(field("dept").into_definition())
            .select(field("sal").sum().as_("total"))
            .group_by("dept")
            .having()
            .field("sal")
            .sum()
            .gt(10)
            .end()
            .build()
            .unwrap();
        let a = run(by_alias);
        assert_eq!(a, run(recomputed));
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].value("dept"), Some(&Value::from("A")));
    }

    #[test]
    fn test_sum_if_and_string_agg() {
        let q = aggregate()
            .select(field("dept").into_definition())
            .select(
                field("sal")
                    .sum_if(crate::ast::Condition::on("status").eq("active"))
                    .as_("active_sal"),
            )
            .select(field("status").string_agg().as_("statuses"))
            .group_by("dept")
            .build()
            .unwrap();
        let rows = run(q);
        assert_eq!(rows[0].value("active_sal"), Some(&Value::Integer(10)));
        assert_eq!(rows[0].value("statuses"), Some(&Value::from("active,left")));
    }

    #[test]
    fn test_global_aggregate_over_no_rows() {
        let q = aggregate()
            .select(count_all().as_("n"))
            .select(field("sal").sum().as_("total"))
            .where_("dept")
            .eq("Z")
            .build()
            .unwrap();
        let rows = run(q);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value("n"), Some(&Value::Integer(0)));
        assert_eq!(rows[0].value("total"), Some(&Value::Null));
    }

    #[test]
    fn test_integer_and_integral_float_share_a_group() {
        let items = vec![
            Record::new().with("id", 1).with("sal", 1),
            Record::new().with("id", 2).with("sal", 1.0),
            Record::new().with("id", 3).with("sal", 2.5),
        ];
        let q = aggregate()
            .select(field("sal").into_definition())
            .select(count_all().as_("n"))
            .select(field("sal").count_distinct().as_("d"))
            .group_by("sal")
            .build()
            .unwrap();
        let catalog = catalog();
        let adapters = AdapterRegistry::new();
        let rows = InMemoryEvaluator::new(&catalog, &adapters)
            .evaluate("Employee", &q, &items)
            .unwrap()
            .into_rows()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value("n"), Some(&Value::Integer(2)));
        assert_eq!(rows[0].value("d"), Some(&Value::Integer(1)));
        assert_eq!(rows[1].value("n"), Some(&Value::Integer(1)));
    }
}

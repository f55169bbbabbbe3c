//! Quarry Evaluator Windows - Window Function Computation
//!
//! Rows are partitioned by the window's partition fields, each partition
//! is sorted by the window's own ordering, and values are computed in one
//! forward pass. Ties are rows with equal order-by tuples.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use super::group::{partition, Accumulator};
use super::sort::{same_key, sort_by_key};
use super::{InMemoryEvaluator, Row};
use crate::ast::*;
use quarry_common::{QuarryError, Result, Value};

const BACKEND: &str = "memory";

/// Inclusive frame `[start, end]` around `pos`, or `None` when empty.
fn frame_range(start: FrameBound, end: FrameBound, pos: usize, len: usize) -> Option<(usize, usize)> {
    let resolve = |bound: FrameBound| -> i64 {
        match bound {
            FrameBound::UnboundedPreceding => 0,
            FrameBound::UnboundedFollowing => len as i64 - 1,
            other => pos as i64 + other.offset(),
        }
    };
    let lo = resolve(start).max(0);
    let hi = resolve(end).min(len as i64 - 1);
    if lo > hi {
        None
    } else {
        Some((lo as usize, hi as usize))
    }
}

fn finish(function: WindowFunction, acc: &Accumulator) -> Value {
    match function {
        WindowFunction::Count => acc.count(),
        WindowFunction::Sum => acc.sum(),
        WindowFunction::Avg => acc.avg(),
        WindowFunction::Min => acc.min(),
        _ => acc.max(),
    }
}

impl InMemoryEvaluator<'_> {
    /// One value per row of `rows`, in input order.
    pub(crate) fn window_column(&self, window: &WindowField, rows: &[Row<'_>]) -> Result<Vec<Value>> {
        window.check()?;
        if matches!(
            window.function,
            WindowFunction::Ntile(_) | WindowFunction::Lag(_) | WindowFunction::Lead(_) | WindowFunction::NthValue(_)
        ) {
            return Err(QuarryError::UnsupportedWindowFunction {
                function: window.function.name().to_string(),
                backend: BACKEND.to_string(),
            });
        }

        let mut out = vec![Value::Null; rows.len()];
        for mut part in partition(rows, &window.partition_by) {
            sort_by_key(&mut part, &window.order_by, |&i, field| rows[i].value(field));
            let keys: Vec<Vec<Value>> = part
                .iter()
                .map(|&i| window.order_by.iter().map(|s| rows[i].value(&s.field)).collect())
                .collect();
            // COUNT without a field counts rows.
            let inputs: Vec<Value> = part
                .iter()
                .map(|&i| match &window.field {
                    Some(field) => rows[i].value(field),
                    None => Value::Integer(1),
                })
                .collect();

            match window.function {
                WindowFunction::RowNumber => {
                    for (pos, &i) in part.iter().enumerate() {
                        out[i] = Value::Integer(pos as i64 + 1);
                    }
                }
                WindowFunction::Rank | WindowFunction::DenseRank => {
                    let dense = window.function == WindowFunction::DenseRank;
                    let mut rank = 0i64;
                    for (pos, &i) in part.iter().enumerate() {
                        if pos == 0 {
                            rank = 1;
                        } else if !same_key(&keys[pos], &keys[pos - 1]) {
                            rank = if dense { rank + 1 } else { pos as i64 + 1 };
                        }
                        out[i] = Value::Integer(rank);
                    }
                }
                _ => {
                    let values = self.framed(window, &inputs);
                    for (pos, &i) in part.iter().enumerate() {
                        out[i] = values[pos].clone();
                    }
                }
            }
        }
        Ok(out)
    }

    /// Aggregate and value functions over each row's frame. Without an
    /// explicit frame an ordered window runs from the partition start to the
    /// current row, and an unordered one spans the partition.
    fn framed(&self, window: &WindowField, inputs: &[Value]) -> Vec<Value> {
        let len = inputs.len();
        let function = window.function;
        let frame = window.frame().or(if window.order_by.is_empty() {
            Some((FrameBound::UnboundedPreceding, FrameBound::UnboundedFollowing))
        } else {
            None
        });

        match frame {
            None => {
                let mut acc = Accumulator::default();
                let mut out = Vec::with_capacity(len);
                for (pos, input) in inputs.iter().enumerate() {
                    acc.push(input);
                    out.push(match function {
                        WindowFunction::FirstValue => inputs[0].clone(),
                        WindowFunction::LastValue => inputs[pos].clone(),
                        _ => finish(function, &acc),
                    });
                }
                out
            }
            Some((start, end)) => (0..len)
                .map(|pos| match frame_range(start, end, pos, len) {
                    None if function == WindowFunction::Count => Value::Integer(0),
                    None => Value::Null,
                    Some((lo, hi)) => match function {
                        WindowFunction::FirstValue => inputs[lo].clone(),
                        WindowFunction::LastValue => inputs[hi].clone(),
                        _ => {
                            let mut acc = Accumulator::default();
                            inputs[lo..=hi].iter().for_each(|v| acc.push(v));
                            finish(function, &acc)
                        }
                    },
                })
                .collect(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::*;
    use crate::evaluator::{AdapterRegistry, Record, ResultRow};
    use crate::metadata::{Catalog, EntitySchema, FieldMeta};
    use quarry_common::DataType;

    fn catalog() -> Catalog {
        Catalog::new().with_entity(
            EntitySchema::new("Employee", "employees")
                .field(FieldMeta::new("id", DataType::BigInt).primary_key())
                .field(FieldMeta::new("dept", DataType::Text))
                .field(FieldMeta::new("sal", DataType::Integer)),
        )
    }

    fn staff() -> Vec<Record> {
        vec![
            Record::new().with("id", 1).with("dept", "A").with("sal", 200),
            Record::new().with("id", 2).with("dept", "A").with("sal", 300),
            Record::new().with("id", 3).with("dept", "B").with("sal", 100),
            Record::new().with("id", 4).with("dept", "A").with("sal", 200),
        ]
    }

    fn run(query: Query) -> Result<Vec<ResultRow>> {
        let catalog = catalog();
        let adapters = AdapterRegistry::new();
        InMemoryEvaluator::new(&catalog, &adapters)
            .evaluate("Employee", &query, &staff())?
            .into_rows()
    }

    fn column(rows: &[ResultRow], name: &str) -> Vec<Value> {
        rows.iter().map(|r| r.value(name).cloned().unwrap_or(Value::Null)).collect()
    }

    #[test]
    fn test_frame_range_clamps() {
        assert_eq!(
            frame_range(FrameBound::Preceding(2), FrameBound::CurrentRow, 1, 5),
            Some((0, 1))
        );
        assert_eq!(
            frame_range(FrameBound::Following(1), FrameBound::Following(3), 4, 5),
            None
        );
        assert_eq!(
            frame_range(FrameBound::UnboundedPreceding, FrameBound::UnboundedFollowing, 2, 5),
            Some((0, 4))
        );
    }

    #[test]
    fn test_partitioned_rank_keeps_input_order() {
        let q = window()
            .select_field("id")
            .select(rank().partition_by("dept").order_by_desc("sal").as_("r"))
            .build()
            .unwrap();
        let rows = run(q).unwrap();
        assert_eq!(
            column(&rows, "r"),
            vec![Value::from(2), Value::from(1), Value::from(1), Value::from(2)]
        );
    }

    #[test]
    fn test_running_and_framed_sums() {
        let q = window()
            .select_field("id")
            .select(field("sal").over(WindowFunction::Sum).order_by_asc("id").as_("running"))
            .select(
                field("sal")
                    .over(WindowFunction::Sum)
                    .order_by_asc("id")
                    .rows_between(FrameBound::Preceding(1), FrameBound::CurrentRow)
                    .as_("pair"),
            )
            .select(field("sal").over(WindowFunction::Max).as_("top"))
            .build()
            .unwrap();
        let rows = run(q).unwrap();
        assert_eq!(
            column(&rows, "running"),
            vec![Value::from(200), Value::from(500), Value::from(600), Value::from(800)]
        );
        assert_eq!(
            column(&rows, "pair"),
            vec![Value::from(200), Value::from(500), Value::from(400), Value::from(300)]
        );
        assert_eq!(column(&rows, "top"), vec![Value::from(300); 4]);
    }

    #[test]
    fn test_first_and_last_value() {
        let q = window()
            .select(field("sal").first_value().partition_by("dept").order_by_asc("id").as_("first"))
            .select(field("sal").last_value().partition_by("dept").order_by_asc("id").as_("last"))
            .build()
            .unwrap();
        let rows = run(q).unwrap();
        assert_eq!(column(&rows, "first")[3], Value::from(200));
        // default frame ends at the current row
        assert_eq!(column(&rows, "last")[1], Value::from(300));
    }

    #[test]
    fn test_unsupported_functions_rejected() {
        let q = window()
            .select(field("sal").lag(1).order_by_asc("id").as_("prev"))
            .build()
            .unwrap();
        let err = run(q).unwrap_err();
        assert!(matches!(
            err,
            QuarryError::UnsupportedWindowFunction { ref function, ref backend }
                if function == "LAG" && backend == "memory"
        ));
    }
}

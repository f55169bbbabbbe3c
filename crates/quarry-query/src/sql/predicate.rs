//! Quarry SQL Predicates - Filter Rendering
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use super::Render;
use crate::ast::*;
use crate::dialect::Dialect;
use crate::json_path::{self, ValueBinding};
use quarry_common::{DialectKind, QuarryError, Result};

/// Left-hand side of a predicate.
pub(super) enum Lhs<'a> {
    Text(String),
    Aggregate(&'a AggregateExpr),
}

/// False when the predicate collapses to a constant and never renders
/// its left-hand side (empty IN lists, EXISTS over a sub-query).
pub(crate) fn predicate_reads_lhs(operator: Operator, value: &FilterValue) -> bool {
    match (operator, value) {
        (Operator::In | Operator::NotIn, FilterValue::List(items)) => !items.is_empty(),
        (Operator::Exists | Operator::NotExists, FilterValue::SubQuery(_)) => false,
        _ => true,
    }
}

/// Select-list alias a HAVING comparison may name directly.
pub(crate) fn having_alias<'a>(dialect: &Dialect, alias: &'a Option<String>) -> Option<&'a str> {
    if dialect.having_alias_reference {
        alias.as_deref()
    } else {
        None
    }
}

fn unsupported(dialect: &Dialect, operator: Operator) -> QuarryError {
    QuarryError::UnsupportedOperator {
        operator: operator.to_string(),
        backend: format!("sql/{}", dialect.name()),
    }
}

impl<'s> Render<'s> {
    pub(super) fn filter(&mut self, filter: &FilterOption) -> Result<()> {
        match filter {
            FilterOption::Plain {
                field,
                operator,
                value,
            } => {
                if !predicate_reads_lhs(*operator, value) {
                    return self.predicate(Lhs::Text(String::new()), *operator, value);
                }
                self.bound_predicate(field, None, *operator, value)
            }
            FilterOption::JsonPath {
                field,
                json_path,
                operator,
                value,
            } => self.bound_predicate(field, Some(json_path), *operator, value),
            FilterOption::AggregateComparison {
                expr,
                operator,
                value,
                alias,
            } => {
                let lhs = match having_alias(self.dialect, alias) {
                    Some(alias) => Lhs::Text(self.dialect.quote_identifier(alias)),
                    None => Lhs::Aggregate(expr),
                };
                self.predicate(lhs, *operator, value)
            }
        }
    }

    /// Column or JSON filter, resolved through the shared JSON target rules.
    fn bound_predicate(
        &mut self,
        field: &str,
        path: Option<&str>,
        operator: Operator,
        value: &FilterValue,
    ) -> Result<()> {
        let column = self.scopes.column(self.dialect, field)?;
        let meta = self.scopes.field_meta(field);
        let binding = json_path::binding_for(meta, path, value)?;
        let target = json_path::filter_target(self.dialect, &column, &binding, operator, value)?;
        let operand = json_path::encode_operand(&binding, meta, value)?;

        if binding == ValueBinding::WholeDocument {
            if let FilterValue::Scalar(encoded) = &operand {
                if !matches!(operator, Operator::Eq | Operator::Ne) {
                    return Err(unsupported(self.dialect, operator));
                }
                self.w.push(&target);
                self.w.push(if operator == Operator::Eq { " = " } else { " != " });
                let placeholder = self.w.param_text(encoded.clone());
                let wrapped = json_path::document_param(self.dialect, &placeholder, meta)?;
                self.w.push(&wrapped);
                return Ok(());
            }
        }
        self.predicate(Lhs::Text(target), operator, &operand)
    }

    fn lhs(&mut self, lhs: &Lhs<'_>) -> Result<()> {
        match lhs {
            Lhs::Text(text) => {
                self.w.push(text);
                Ok(())
            }
            Lhs::Aggregate(expr) => self.aggregate_expr(expr),
        }
    }

    pub(super) fn predicate(&mut self, lhs: Lhs<'_>, operator: Operator, value: &FilterValue) -> Result<()> {
        match operator {
            Operator::Eq | Operator::Ne | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                self.lhs(&lhs)?;
                self.w.push(&format!(" {} ", operator.symbol()));
                self.operand(value)
            }
            Operator::In | Operator::NotIn => {
                let keyword = if operator == Operator::In { " IN (" } else { " NOT IN (" };
                match value {
                    FilterValue::List(items) if items.is_empty() => {
                        self.w.push(if operator == Operator::In { "1 = 0" } else { "1 = 1" });
                        Ok(())
                    }
                    FilterValue::List(items) => {
                        self.lhs(&lhs)?;
                        self.w.push(keyword);
                        self.w.push_params(items);
                        self.w.push(")");
                        Ok(())
                    }
                    FilterValue::SubQuery(sq) => {
                        self.lhs(&lhs)?;
                        self.w.push(keyword);
                        self.sub_query(sq)?;
                        self.w.push(")");
                        Ok(())
                    }
                    _ => Err(QuarryError::NotACollection(operator.to_string())),
                }
            }
            Operator::Like | Operator::NotLike => {
                self.lhs(&lhs)?;
                self.w.push(&format!(" {} ", operator.symbol()));
                self.operand(value)
            }
            Operator::IsNull | Operator::IsNotNull => {
                self.lhs(&lhs)?;
                self.w.push(&format!(" {}", operator.symbol()));
                Ok(())
            }
            Operator::Between => match value {
                FilterValue::Range(low, high) => {
                    self.lhs(&lhs)?;
                    self.w.push(" BETWEEN ");
                    self.w.push_param(low.clone());
                    self.w.push(" AND ");
                    self.w.push_param(high.clone());
                    Ok(())
                }
                _ => Err(QuarryError::InvalidQuery("BETWEEN requires a range".to_string())),
            },
            Operator::Exists | Operator::NotExists => {
                if let FilterValue::SubQuery(sq) = value {
                    self.w.push(if operator == Operator::Exists { "EXISTS (" } else { "NOT EXISTS (" });
                    self.sub_query(sq)?;
                    self.w.push(")");
                    return Ok(());
                }
                let wanted = !matches!(value, FilterValue::Scalar(quarry_common::Value::Boolean(false)));
                let present = wanted == (operator == Operator::Exists);
                self.lhs(&lhs)?;
                self.w.push(if present { " IS NOT NULL" } else { " IS NULL" });
                Ok(())
            }
            Operator::Regex => match self.dialect.kind {
                DialectKind::Postgres => {
                    self.lhs(&lhs)?;
                    self.w.push(" ~ ");
                    self.operand(value)
                }
                DialectKind::MySql | DialectKind::Sqlite => {
                    self.lhs(&lhs)?;
                    self.w.push(" REGEXP ");
                    self.operand(value)
                }
                DialectKind::H2 => {
                    self.w.push("REGEXP_LIKE(");
                    self.lhs(&lhs)?;
                    self.w.push(", ");
                    self.operand(value)?;
                    self.w.push(")");
                    Ok(())
                }
            },
            Operator::Size => {
                let function = match self.dialect.kind {
                    DialectKind::Postgres => "jsonb_array_length(",
                    DialectKind::MySql => "JSON_LENGTH(",
                    DialectKind::Sqlite => "json_array_length(",
                    DialectKind::H2 => "CARDINALITY(",
                };
                self.w.push(function);
                self.lhs(&lhs)?;
                self.w.push(") = ");
                self.operand(value)
            }
            Operator::Type | Operator::All | Operator::ElemMatch | Operator::Text => {
                Err(unsupported(self.dialect, operator))
            }
        }
    }

    fn operand(&mut self, value: &FilterValue) -> Result<()> {
        match value {
            FilterValue::Scalar(v) => {
                self.w.push_param(v.clone());
                Ok(())
            }
            FilterValue::SubQuery(sq) => {
                self.w.push("(");
                self.sub_query(sq)?;
                self.w.push(")");
                Ok(())
            }
            FilterValue::Outer(reference) => {
                let column = self.scopes.outer_column(self.dialect, &reference.name)?;
                self.w.push(&column);
                Ok(())
            }
            FilterValue::Empty | FilterValue::List(_) | FilterValue::Range(_, _) => Err(
                QuarryError::InvalidQuery(format!("operand {:?} is not a single value", value)),
            ),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

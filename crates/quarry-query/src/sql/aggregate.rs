//! Quarry SQL Aggregates - Aggregation Templates
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use super::predicate::Lhs;
use super::scope::ScopeStack;
use super::Render;
use crate::ast::*;
use crate::dialect::Dialect;
use crate::json_path;
use crate::metadata::EntitySchema;
use quarry_common::utils::quote_sql_string;
use quarry_common::{DialectKind, QuarryError, Result};

impl<'s> Render<'s> {
    pub(super) fn aggregate_query(
        &mut self,
        schema: &'s EntitySchema,
        alias: Option<String>,
        q: &AggregateQuery,
    ) -> Result<()> {
        if q.select_fields.is_empty() {
            return Err(QuarryError::InvalidQuery(
                "aggregate query requires select fields".to_string(),
            ));
        }
        self.w.push("SELECT ");
        self.field_list(&q.select_fields)?;
        self.w.push(" FROM ");
        let table = q.from_table.as_deref().unwrap_or(&schema.table);
        self.push_table(table, alias.as_deref());
        self.where_clause(&q.where_filters)?;
        self.group_by_clause(&q.group_by)?;
        self.having_clause(&q.having)?;
        self.order_by_clause(&q.order_by, &q.select_fields)?;
        self.limit_clause(q.limit);
        Ok(())
    }

    /// Render one aggregate expression (no alias).
    pub(super) fn aggregate_expr(&mut self, expr: &AggregateExpr) -> Result<()> {
        expr.check()?;
        let segments = match &expr.json_path {
            Some(path) => json_path::segments(path)?,
            None => Vec::new(),
        };
        let column = if expr.field == "*" {
            "*".to_string()
        } else {
            self.scopes.column(self.dialect, &expr.field)?
        };
        let target = if segments.is_empty() {
            column.clone()
        } else if expr.agg_type == AggregationType::ArrayLength {
            json_path::json_extract(self.dialect, &column, &segments)?
        } else {
            json_path::scalar_extract(self.dialect, &column, &segments, expr.agg_type.is_numeric())?
        };
        let kind = self.dialect.kind;

        match expr.agg_type {
            AggregationType::Count => self.w.push(&format!("COUNT({})", target)),
            AggregationType::CountDistinct => self.w.push(&format!("COUNT(DISTINCT {})", target)),
            AggregationType::Sum => self.w.push(&format!("SUM({})", target)),
            AggregationType::Avg => self.w.push(&format!("AVG({})", target)),
            AggregationType::Min => self.w.push(&format!("MIN({})", target)),
            AggregationType::Max => self.w.push(&format!("MAX({})", target)),
            AggregationType::CountIf => {
                self.w.push("COUNT(CASE WHEN ");
                self.condition(expr)?;
                self.w.push(" THEN 1 END)");
            }
            AggregationType::SumIf => {
                self.w.push("SUM(CASE WHEN ");
                self.condition(expr)?;
                self.w.push(&format!(" THEN {} ELSE 0 END)", target));
            }
            AggregationType::StringAgg => {
                let separator = quote_sql_string(self.separator);
                let sql = match kind {
                    DialectKind::Postgres => {
                        format!("STRING_AGG(CAST({} AS TEXT), {})", target, separator)
                    }
                    DialectKind::MySql => format!("GROUP_CONCAT({} SEPARATOR {})", target, separator),
                    DialectKind::Sqlite => format!("GROUP_CONCAT({}, {})", target, separator),
                    DialectKind::H2 => format!("LISTAGG({}, {})", target, separator),
                };
                self.w.push(&sql);
            }
            AggregationType::ArrayLength => {
                let is_array_column = segments.is_empty()
                    && self
                        .scopes
                        .field_meta(&expr.field)
                        .map(|m| m.data_type.is_array())
                        .unwrap_or(false);
                let sql = if is_array_column {
                    self.dialect.require_arrays("ARRAY_LENGTH on array columns")?;
                    format!("CARDINALITY({})", target)
                } else {
                    self.dialect.require_json("ARRAY_LENGTH on JSON values")?;
                    match kind {
                        DialectKind::Postgres => format!("jsonb_array_length({})", target),
                        DialectKind::MySql => format!("JSON_LENGTH({})", target),
                        _ => format!("json_array_length({})", target),
                    }
                };
                self.w.push(&sql);
            }
            AggregationType::JsonArrayAgg => {
                let sql = match kind {
                    DialectKind::Postgres => format!("jsonb_agg({})", target),
                    DialectKind::Sqlite => format!("json_group_array({})", target),
                    DialectKind::MySql | DialectKind::H2 => format!("JSON_ARRAYAGG({})", target),
                };
                self.w.push(&sql);
            }
            AggregationType::JsonObjectAgg => {
                let key_field = expr.key_field.as_deref().unwrap_or_default();
                let key = self.scopes.column(self.dialect, key_field)?;
                let sql = match kind {
                    DialectKind::Postgres => format!("jsonb_object_agg({}, {})", key, target),
                    DialectKind::MySql => format!("JSON_OBJECTAGG({}, {})", key, target),
                    DialectKind::Sqlite => format!("json_group_object({}, {})", key, target),
                    DialectKind::H2 => format!("JSON_OBJECTAGG({} VALUE {})", key, target),
                };
                self.w.push(&sql);
            }
            AggregationType::Stddev | AggregationType::Variance => {
                if kind == DialectKind::Sqlite {
                    return Err(self.dialect.unsupported(expr.agg_type.name()));
                }
                let function = if expr.agg_type == AggregationType::Stddev {
                    "STDDEV_SAMP"
                } else {
                    "VAR_SAMP"
                };
                self.w.push(&format!("{}({})", function, target));
            }
            AggregationType::First => {
                self.dialect.require_arrays("FIRST aggregation")?;
                self.w.push(&format!("(ARRAY_AGG({}))[1]", target));
            }
            AggregationType::Last => {
                self.dialect.require_arrays("LAST aggregation")?;
                self.w.push(&format!("(ARRAY_AGG({}))[COUNT(*)]", target));
            }
        }
        Ok(())
    }

    /// Embedded condition of `COUNT_IF` / `SUM_IF`.
    fn condition(&mut self, expr: &AggregateExpr) -> Result<()> {
        let (target, condition) = condition_target(self.dialect, &self.scopes, expr)?;
        self.predicate(Lhs::Text(target), condition.operator, &condition.value)
    }
}

/// Left-hand side of a conditional aggregate's condition. The condition
/// tests its own field when it names one, else the aggregated value.
pub(crate) fn condition_target<'e>(
    dialect: &Dialect,
    scopes: &ScopeStack<'_>,
    expr: &'e AggregateExpr,
) -> Result<(String, &'e Condition)> {
    let condition = expr
        .condition
        .as_ref()
        .ok_or_else(|| QuarryError::MissingCondition(expr.agg_type.to_string()))?;
    if let Some(field) = &condition.field {
        return Ok((scopes.column(dialect, field)?, condition));
    }
    let column = scopes.column(dialect, &expr.field)?;
    let target = match &expr.json_path {
        Some(path) => {
            let segments = json_path::segments(path)?;
            if segments.is_empty() {
                column
            } else {
                json_path::scalar_extract(dialect, &column, &segments, condition.value.is_numeric())?
            }
        }
        None => column,
    };
    Ok((target, condition))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::ast::{Condition, Query};
    use crate::builder::*;
    use crate::dialect::Dialect;
    use crate::metadata::{Catalog, EntitySchema, FieldMeta};
    use crate::sql::SqlTranslator;
    use quarry_common::{DataType, QuarryError, Value};

    fn catalog() -> Catalog {
        Catalog::new().with_entity(
            EntitySchema::new("Employee", "employees")
                .field(FieldMeta::new("id", DataType::BigInt).primary_key())
                .field(FieldMeta::new("name", DataType::Text))
                .field(FieldMeta::new("dept", DataType::Text))
                .field(FieldMeta::new("sal", DataType::Integer))
                .field(FieldMeta::new("status", DataType::Text))
                .field(FieldMeta::new("meta", DataType::Jsonb)),
        )
    }

    fn translate(dialect: Dialect, query: crate::ast::Query) -> crate::sql::SqlStatement {
        let catalog = catalog();
        SqlTranslator::new(dialect, &catalog)
            .translate("Employee", &query)
            .unwrap()
    }

    #[test]
    fn test_group_by_having() {
        let q = aggregate()
            .select(field("dept").into_definition())
            .select(field("sal").sum().as_("total"))
            .group_by("dept")
            .having()
            .field("sal")
            .sum()
            .gt(100)
            .end()
            .order_by_desc("total")
            .build()
            .unwrap();
        let stmt = translate(Dialect::POSTGRES, q);
        assert_eq!(
            stmt.sql,
            "SELECT \"dept\", SUM(\"sal\") AS \"total\" FROM \"employees\" GROUP BY \"dept\" HAVING SUM(\"sal\") > $1 ORDER BY \"total\" DESC"
        );
        assert_eq!(stmt.params, vec![Value::from(100)]);
    }

    #[test]
    fn test_having_alias_reference_on_mysql() {
        let q = aggregate()
            .select(field("dept").into_definition())
            .select(field("sal").sum().as_("total"))
            .group_by("dept")
            .having()
            .field("sal")
            .sum()
            .referencing("total")
            .gt(100)
            .end()
            .build()
            .unwrap();
        let mysql = translate(Dialect::MYSQL, q.clone());
        assert!(mysql.sql.ends_with("HAVING `total` > ?"));
        let pg = translate(Dialect::POSTGRES, q);
        assert!(pg.sql.ends_with("HAVING SUM(\"sal\") > $1"));
    }

    #[test]
    fn test_count_if_template() {
        let q = aggregate()
            .select(field("status").count_if(Condition::eq("active")).as_("active"))
            .build()
            .unwrap();
        let stmt = translate(Dialect::SQLITE, q);
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(CASE WHEN \"status\" = ? THEN 1 END) AS \"active\" FROM \"employees\""
        );
        assert_eq!(stmt.params, vec![Value::from("active")]);
    }

    #[test]
    fn test_sum_if_on_other_field() {
        let q = aggregate()
            .select(field("sal").sum_if(Condition::on("status").eq("active")).as_("s"))
            .build()
            .unwrap();
        let stmt = translate(Dialect::POSTGRES, q);
        assert_eq!(
            stmt.sql,
            "SELECT SUM(CASE WHEN \"status\" = $1 THEN \"sal\" ELSE 0 END) AS \"s\" FROM \"employees\""
        );
    }

    #[test]
    fn test_string_agg_per_dialect() {
        let q = || {
            aggregate()
                .select(field("name").string_agg().as_("names"))
                .build()
                .unwrap()
        };
        assert!(translate(Dialect::POSTGRES, q())
            .sql
            .starts_with("SELECT STRING_AGG(CAST(\"name\" AS TEXT), ',')"));
        assert!(translate(Dialect::MYSQL, q())
            .sql
            .starts_with("SELECT GROUP_CONCAT(`name` SEPARATOR ',')"));
        assert!(translate(Dialect::SQLITE, q())
            .sql
            .starts_with("SELECT GROUP_CONCAT(\"name\", ',')"));
        assert!(translate(Dialect::H2, q()).sql.starts_with("SELECT LISTAGG(\"name\", ',')"));
    }

    #[test]
    fn test_json_path_aggregate() {
        let q = aggregate()
            .select(json_field("meta", "$.bonus").sum().as_("bonus"))
            .build()
            .unwrap();
        let stmt = translate(Dialect::POSTGRES, q);
        assert!(stmt
            .sql
            .starts_with("SELECT SUM(CAST(\"meta\"->>'bonus' AS NUMERIC)) AS \"bonus\""));

        let q = aggregate()
            .select(json_field("meta", "$.tags").array_length().as_("n"))
            .build()
            .unwrap();
        let stmt = translate(Dialect::POSTGRES, q);
        assert!(stmt.sql.starts_with("SELECT jsonb_array_length(\"meta\"->'tags') AS \"n\""));
    }

    #[test]
    fn test_dialect_gaps() {
        let catalog = catalog();
        let q = aggregate().select(field("sal").stddev().as_("sd")).build().unwrap();
        let err = SqlTranslator::new(Dialect::SQLITE, &catalog)
            .translate("Employee", &q)
            .unwrap_err();
        assert!(matches!(err, QuarryError::UnsupportedFeature { .. }));

        let q = aggregate().select(field("sal").first().as_("f")).build().unwrap();
        assert!(SqlTranslator::new(Dialect::MYSQL, &catalog)
            .translate("Employee", &q)
            .is_err());
        assert!(translate(Dialect::POSTGRES, q)
            .sql
            .starts_with("SELECT (ARRAY_AGG(\"sal\"))[1] AS \"f\""));
    }

    #[test]
    fn test_missing_condition_at_translation() {
        let catalog = catalog();
        let built = aggregate()
            .select(field("status").count_if(Condition::eq("x")).as_("n"))
            .build()
            .unwrap();
        let Query::Aggregate(mut agg) = built else {
            panic!("expected an aggregate query");
        };
        if let crate::ast::FieldDefinition::Aggregate { expr, .. } = &mut agg.select_fields[0] {
            expr.condition = None;
        }
        let q = Query::Aggregate(agg);
        let err = SqlTranslator::new(Dialect::POSTGRES, &catalog)
            .translate("Employee", &q)
            .unwrap_err();
        assert!(matches!(err, QuarryError::MissingCondition(_)));
    }

    #[test]
    fn test_count_all() {
        let q = aggregate()
            .select(field("dept").into_definition())
            .select(count_all().as_("n"))
            .group_by("dept")
            .build()
            .unwrap();
        let stmt = translate(Dialect::POSTGRES, q);
        assert_eq!(
            stmt.sql,
            "SELECT \"dept\", COUNT(*) AS \"n\" FROM \"employees\" GROUP BY \"dept\""
        );
    }
}

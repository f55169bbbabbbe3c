//! Quarry SQL - Relational Query Translation
//!
//! Translates [`Query`] values into dialect-specific SQL with positional
//! parameters. The translator is stateless between calls; each call walks
//! the query once, writing text and collecting parameters in order.
//!
//! Key Features:
//! - Select, aggregate, window, update and delete statements
//! - Filter operators with empty-list and presence special cases
//! - Aggregation templates per dialect
//! - Window functions with partitions, ordering and frames
//! - Correlated and derived sub-queries with collision-free aliases
//! - Literal-inlined rendering for diagnostics
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

mod aggregate;
mod predicate;
pub(crate) mod scope;
mod subquery;
mod window;
mod writer;

pub use writer::{render_literal, ParameterMode, SqlStatement};

use crate::ast::*;
use crate::dialect::Dialect;
use crate::json_path::{self, ValueBinding};
use crate::metadata::{EntitySchema, SchemaProvider};
use quarry_common::{QuarryError, QueryConfig, Result, Value};
use scope::ScopeStack;
use writer::SqlWriter;

pub(crate) use aggregate::condition_target;
pub(crate) use predicate::{having_alias, predicate_reads_lhs};

// =============================================================================
// Translator
// =============================================================================

/// SQL translator for one dialect and schema.
pub struct SqlTranslator<'a> {
    dialect: Dialect,
    schema: &'a dyn SchemaProvider,
    mode: ParameterMode,
    max_depth: usize,
    string_agg_separator: String,
    log_inlined_sql: bool,
}

impl<'a> SqlTranslator<'a> {
    pub fn new(dialect: Dialect, schema: &'a dyn SchemaProvider) -> Self {
        Self::with_config(dialect, schema, &QueryConfig::default())
    }

    pub fn with_config(dialect: Dialect, schema: &'a dyn SchemaProvider, config: &QueryConfig) -> Self {
        Self {
            dialect,
            schema,
            mode: ParameterMode::Positional,
            max_depth: config.max_sub_query_depth,
            string_agg_separator: config.string_agg_separator.clone(),
            log_inlined_sql: config.log_inlined_sql,
        }
    }

    pub fn with_mode(mut self, mode: ParameterMode) -> Self {
        self.mode = mode;
        self
    }

    /// Switch to literal-inlined rendering.
    pub fn inline_literals(self) -> Self {
        self.with_mode(ParameterMode::Inline)
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Translate a complete statement against `entity`.
    pub fn translate(&self, entity: &str, query: &Query) -> Result<SqlStatement> {
        if query.is_empty_result() {
            return Err(QuarryError::InvalidQuery(
                "limit 0 must be answered without translation".to_string(),
            ));
        }
        let schema = self.schema.require_entity(entity)?;
        let mut render = self.render();
        render.statement(schema, query)?;
        let statement = render.w.finish();

        tracing::debug!(
            entity,
            kind = query.kind_name(),
            dialect = self.dialect.name(),
            params = statement.param_count(),
            "Translated query"
        );
        if self.mode == ParameterMode::Inline && self.log_inlined_sql {
            tracing::trace!(sql = %statement.sql, "Inlined SQL");
        }
        Ok(statement)
    }

    /// Translate a filter list into a WHERE predicate (without the keyword).
    /// An empty list yields empty text.
    pub fn translate_where(&self, entity: &str, filters: &[FilterOption]) -> Result<SqlStatement> {
        let schema = self.schema.require_entity(entity)?;
        let mut render = self.render();
        render.scopes.push_unqualified(schema)?;
        render.filter_list(filters)?;
        Ok(render.w.finish())
    }

    fn render(&self) -> Render<'_> {
        Render {
            dialect: &self.dialect,
            schema: self.schema,
            separator: &self.string_agg_separator,
            scopes: ScopeStack::new(self.max_depth),
            w: SqlWriter::new(self.dialect, self.mode),
        }
    }
}

// =============================================================================
// Rendering Context
// =============================================================================

/// State of one translation.
pub(crate) struct Render<'s> {
    dialect: &'s Dialect,
    schema: &'s dyn SchemaProvider,
    separator: &'s str,
    scopes: ScopeStack<'s>,
    w: SqlWriter,
}

impl<'s> Render<'s> {
    fn statement(&mut self, schema: &'s EntitySchema, query: &Query) -> Result<()> {
        let alias = scope::open_root(&mut self.scopes, self.dialect, schema, query)?;
        match query {
            Query::Select(q) => self.select(schema, alias, q),
            Query::Aggregate(q) => self.aggregate_query(schema, alias, q),
            Query::Window(q) => self.window_query(schema, alias, q),
            Query::Update(q) => self.update(schema, q),
            Query::Delete(q) => self.delete(schema, q),
        }
    }

    fn quote(&self, ident: &str) -> String {
        self.dialect.quote_identifier(ident)
    }

    fn push_table(&mut self, table: &str, alias: Option<&str>) {
        self.w.push_identifier(table);
        if let Some(alias) = alias {
            self.w.push(" AS ");
            self.w.push(alias);
        }
    }

    /// Filters joined with AND, no keyword.
    fn filter_list(&mut self, filters: &[FilterOption]) -> Result<()> {
        for (i, filter) in filters.iter().enumerate() {
            if i > 0 {
                self.w.push(" AND ");
            }
            self.filter(filter)?;
        }
        Ok(())
    }

    fn where_clause(&mut self, filters: &[FilterOption]) -> Result<()> {
        if !filters.is_empty() {
            self.w.push(" WHERE ");
            self.filter_list(filters)?;
        }
        Ok(())
    }

    fn group_by_clause(&mut self, group_by: &[String]) -> Result<()> {
        if group_by.is_empty() {
            return Ok(());
        }
        let columns = group_by
            .iter()
            .map(|f| self.scopes.column(self.dialect, f))
            .collect::<Result<Vec<_>>>()?;
        self.w.push(" GROUP BY ");
        self.w.push(&columns.join(", "));
        Ok(())
    }

    fn having_clause(&mut self, having: &[FilterOption]) -> Result<()> {
        if !having.is_empty() {
            self.w.push(" HAVING ");
            self.filter_list(having)?;
        }
        Ok(())
    }

    /// ORDER BY; names matching a computed output column sort by its alias.
    fn order_by_clause(&mut self, sort: &[SortOption], outputs: &[FieldDefinition]) -> Result<()> {
        if sort.is_empty() {
            return Ok(());
        }
        let mut parts = Vec::with_capacity(sort.len());
        for option in sort {
            let computed = outputs.iter().any(|def| {
                def.output_name() == option.field
                    && !matches!(def, FieldDefinition::Simple { alias: None, .. })
            });
            let target = if computed {
                self.quote(&option.field)
            } else {
                self.scopes.column(self.dialect, &option.field)?
            };
            parts.push(format!("{} {}", target, option.order.keyword()));
        }
        self.w.push(" ORDER BY ");
        self.w.push(&parts.join(", "));
        Ok(())
    }

    fn limit_clause(&mut self, limit: Limit) {
        if let Limit::Rows(n) = limit {
            self.w.push(&format!(" LIMIT {}", n));
        }
    }

    /// Select-list entries separated by commas.
    fn field_list(&mut self, fields: &[FieldDefinition]) -> Result<()> {
        for (i, def) in fields.iter().enumerate() {
            if i > 0 {
                self.w.push(", ");
            }
            self.field_definition(def)?;
        }
        Ok(())
    }

    fn field_definition(&mut self, def: &FieldDefinition) -> Result<()> {
        match def {
            FieldDefinition::Simple { field, alias } => {
                let column = self.scopes.column(self.dialect, field)?;
                self.w.push(&column);
                if let Some(alias) = alias {
                    self.w.push(" AS ");
                    self.w.push_identifier(alias);
                }
            }
            FieldDefinition::Aggregate { expr, alias } => {
                self.aggregate_expr(expr)?;
                self.w.push(" AS ");
                self.w.push_identifier(alias);
            }
            FieldDefinition::Window(window) => {
                self.window_expr(window)?;
                self.w.push(" AS ");
                self.w.push_identifier(&window.alias);
            }
            FieldDefinition::SubQuery { sub_query, alias } => {
                self.w.push("(");
                self.sub_query(sub_query)?;
                self.w.push(") AS ");
                self.w.push_identifier(alias);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn select(&mut self, schema: &'s EntitySchema, alias: Option<String>, q: &SelectQuery) -> Result<()> {
        self.w.push("SELECT ");
        if q.columns.is_empty() {
            let star = self.scopes.current()?.star();
            self.w.push(&star);
        } else {
            let columns = q
                .columns
                .iter()
                .map(|c| self.scopes.column(self.dialect, c))
                .collect::<Result<Vec<_>>>()?;
            self.w.push(&columns.join(", "));
        }
        self.w.push(" FROM ");
        self.push_table(&schema.table, alias.as_deref());

        if let Some(join) = &q.join_hint {
            let joined = self.schema.require_entity(&join.entity)?;
            let join_alias = self.scopes.allocate_alias(&joined.table);
            let local = self.scopes.column(self.dialect, &join.local_field)?;
            let foreign = format!(
                "{}.{}",
                join_alias,
                self.quote(&joined.require_field(&join.foreign_field)?.column)
            );
            self.w.push(match join.kind {
                JoinKind::Inner => " INNER JOIN ",
                JoinKind::Left => " LEFT JOIN ",
            });
            self.push_table(&joined.table, Some(&join_alias));
            self.w.push(&format!(" ON {} = {}", local, foreign));
        }

        self.where_clause(&q.filters)?;
        self.order_by_clause(&q.sort, &[])?;
        self.limit_clause(q.limit);
        Ok(())
    }

    fn update(&mut self, schema: &'s EntitySchema, q: &UpdateQuery) -> Result<()> {
        if q.updates.is_empty() {
            return Err(QuarryError::InvalidQuery(
                "update requires at least one assignment".to_string(),
            ));
        }
        self.w.push("UPDATE ");
        self.w.push_identifier(&schema.table);
        self.w.push(" SET ");
        for (i, assignment) in q.updates.iter().enumerate() {
            if i > 0 {
                self.w.push(", ");
            }
            let meta = schema.require_field(&assignment.field)?;
            self.w.push_identifier(&meta.column);
            self.w.push(" = ");
            let operand = FilterValue::Scalar(assignment.value.clone());
            let binding = json_path::binding_for(Some(meta), None, &operand)?;
            if binding == ValueBinding::WholeDocument {
                let encoded = json_path::encode_operand(&binding, Some(meta), &operand)?;
                let value = encoded.as_scalar().cloned().unwrap_or(Value::Null);
                let placeholder = self.w.param_text(value);
                let wrapped = json_path::document_param(self.dialect, &placeholder, Some(meta))?;
                self.w.push(&wrapped);
            } else {
                self.w.push_param(assignment.value.clone());
            }
        }
        self.where_clause(&q.filters)
    }

    fn delete(&mut self, schema: &'s EntitySchema, q: &DeleteQuery) -> Result<()> {
        self.w.push("DELETE FROM ");
        self.w.push_identifier(&schema.table);
        self.where_clause(&q.filters)
    }

    fn window_query(&mut self, schema: &'s EntitySchema, alias: Option<String>, q: &WindowQuery) -> Result<()> {
        if q.select_fields.is_empty() {
            return Err(QuarryError::InvalidQuery(
                "window query requires select fields".to_string(),
            ));
        }
        self.w.push("SELECT ");
        self.field_list(&q.select_fields)?;
        self.w.push(" FROM ");
        let table = q.from_table.as_deref().unwrap_or(&schema.table);
        self.push_table(table, alias.as_deref());
        self.where_clause(&q.where_filters)?;
        self.order_by_clause(&q.order_by, &q.select_fields)?;
        self.limit_clause(q.limit);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Quarry Evaluator - In-Memory Query Execution
//!
//! Executes queries directly over in-process entity sequences when no
//! external database is present. Results follow the relational translator's
//! semantics: SQL null handling in predicates, first-seen group order,
//! tie-aware ranking, and correlated sub-queries resolved through an
//! entity-adapter registry.
//!
//! Key Features:
//! - Predicate matching for every operator
//! - Composite, stable, null-first sorting
//! - Grouping with aggregation and HAVING
//! - Window functions with partitions, ordering and frames
//! - Sub-queries over registered entity adapters
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

mod filter;
mod group;
mod sort;
mod window;

pub use sort::compare_values;

use crate::ast::*;
use crate::metadata::{EntitySchema, SchemaProvider};
use quarry_common::{QuarryError, QueryConfig, Result, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Entities
// =============================================================================

/// Field access the evaluator needs from an entity.
pub trait Entity {
    fn get(&self, field: &str) -> Option<Value>;

    fn set(&mut self, field: &str, value: Value) -> Result<()>;

    /// Names of the fields this entity carries, when enumerable.
    fn field_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A schemaless entity backed by an ordered map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn value(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn into_map(self) -> BTreeMap<String, Value> {
        self.fields
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl From<ResultRow> for Record {
    fn from(row: ResultRow) -> Self {
        Self {
            fields: row.columns.into_iter().collect(),
        }
    }
}

impl Entity for Record {
    fn get(&self, field: &str) -> Option<Value> {
        self.fields.get(field).cloned()
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        self.fields.insert(field.to_string(), value);
        Ok(())
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }
}

/// One output row of an aggregate, window or sub-query evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    columns: Vec<(String, Value)>,
}

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.columns.push((name.into(), value));
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(name, value.into());
        self
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Value of the first column; the scalar a sub-query yields.
    pub fn first_value(&self) -> Value {
        self.columns.first().map(|(_, v)| v.clone()).unwrap_or(Value::Null)
    }

    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Entity for ResultRow {
    fn get(&self, field: &str) -> Option<Value> {
        self.value(field).cloned()
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match self.columns.iter_mut().find(|(n, _)| n == field) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((field.to_string(), value)),
        }
        Ok(())
    }

    fn field_names(&self) -> Vec<String> {
        self.columns.iter().map(|(n, _)| n.clone()).collect()
    }
}

// =============================================================================
// Entity Adapters
// =============================================================================

/// Source of an entity's rows, consulted only for embedded sub-queries.
pub trait EntityAdapter: Send + Sync {
    fn load(&self) -> Result<Vec<Record>>;
}

impl<F> EntityAdapter for F
where
    F: Fn() -> Result<Vec<Record>> + Send + Sync,
{
    fn load(&self) -> Result<Vec<Record>> {
        self()
    }
}

/// Entity name to adapter.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn EntityAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entity: impl Into<String>, adapter: impl EntityAdapter + 'static) {
        self.adapters.insert(entity.into(), Arc::new(adapter));
    }

    pub fn with_adapter(mut self, entity: impl Into<String>, adapter: impl EntityAdapter + 'static) -> Self {
        self.register(entity, adapter);
        self
    }

    /// Register a fixed row set.
    pub fn with_rows(self, entity: impl Into<String>, rows: Vec<Record>) -> Self {
        self.with_adapter(entity, move || -> Result<Vec<Record>> { Ok(rows.clone()) })
    }

    pub fn get(&self, entity: &str) -> Result<&Arc<dyn EntityAdapter>> {
        self.adapters
            .get(entity)
            .ok_or_else(|| QuarryError::EntityNotFound(entity.to_string()))
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entities: Vec<_> = self.adapters.keys().collect();
        entities.sort();
        f.debug_struct("AdapterRegistry")
            .field("entities", &entities)
            .finish()
    }
}

// =============================================================================
// Results
// =============================================================================

/// Entities for select, update and delete; rows for aggregate and window.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationResult<E> {
    Entities(Vec<E>),
    Rows(Vec<ResultRow>),
}

impl<E> EvaluationResult<E> {
    /// The empty result of the given query's shape.
    pub fn empty(query: &Query) -> Self {
        match query {
            Query::Aggregate(_) | Query::Window(_) => EvaluationResult::Rows(Vec::new()),
            _ => EvaluationResult::Entities(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EvaluationResult::Entities(items) => items.len(),
            EvaluationResult::Rows(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_entities(self) -> Result<Vec<E>> {
        match self {
            EvaluationResult::Entities(items) => Ok(items),
            EvaluationResult::Rows(_) => Err(QuarryError::TypeError(
                "result holds rows, not entities".to_string(),
            )),
        }
    }

    pub fn into_rows(self) -> Result<Vec<ResultRow>> {
        match self {
            EvaluationResult::Rows(rows) => Ok(rows),
            EvaluationResult::Entities(_) => Err(QuarryError::TypeError(
                "result holds entities, not rows".to_string(),
            )),
        }
    }
}

// =============================================================================
// Row Context
// =============================================================================

/// An entity under evaluation, with its schema and enclosing row.
#[derive(Clone, Copy)]
pub(crate) struct Row<'r> {
    pub entity: &'r dyn Entity,
    pub schema: Option<&'r EntitySchema>,
    pub outer: Option<&'r Row<'r>>,
    /// Sub-query nesting level.
    pub depth: usize,
}

impl<'r> Row<'r> {
    fn root(entity: &'r dyn Entity, schema: Option<&'r EntitySchema>) -> Self {
        Self {
            entity,
            schema,
            outer: None,
            depth: 0,
        }
    }

    pub fn value(&self, field: &str) -> Value {
        self.entity.get(field).unwrap_or(Value::Null)
    }

    /// Field value with stored JSON text decoded through the field codec.
    pub fn document(&self, field: &str) -> Result<Value> {
        let value = self.value(field);
        match (&value, self.schema.and_then(|s| s.get_field(field))) {
            (Value::String(text), Some(meta)) if meta.is_json() => meta.codec().decode(text),
            _ => Ok(value),
        }
    }

    pub fn outer_value(&self, field: &str) -> Result<Value> {
        match self.outer {
            Some(outer) => Ok(outer.value(field)),
            None => Err(QuarryError::InvalidQuery(format!(
                "outer reference '{}' outside a sub-query",
                field
            ))),
        }
    }
}

static EMPTY_ROW: ResultRow = ResultRow {
    columns: Vec::new(),
};

// =============================================================================
// Evaluator
// =============================================================================

/// Shape of an aggregate, window or sub-query result.
pub(crate) struct Shape<'q> {
    pub fields: &'q [FieldDefinition],
    pub group_by: &'q [String],
    pub having: &'q [FilterOption],
    pub order_by: &'q [SortOption],
    pub limit: Limit,
}

impl Shape<'_> {
    fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || self.fields.iter().any(FieldDefinition::is_aggregating)
    }
}

/// Evaluates queries over in-process entities.
pub struct InMemoryEvaluator<'a> {
    schema: &'a dyn SchemaProvider,
    adapters: &'a AdapterRegistry,
    max_depth: usize,
    separator: String,
}

impl<'a> InMemoryEvaluator<'a> {
    pub fn new(schema: &'a dyn SchemaProvider, adapters: &'a AdapterRegistry) -> Self {
        Self::with_config(schema, adapters, &QueryConfig::default())
    }

    pub fn with_config(schema: &'a dyn SchemaProvider, adapters: &'a AdapterRegistry, config: &QueryConfig) -> Self {
        Self {
            schema,
            adapters,
            max_depth: config.max_sub_query_depth,
            separator: config.string_agg_separator.clone(),
        }
    }

    /// Evaluate `query` against `items`, which belong to `entity`.
    pub fn evaluate<E: Entity + Clone>(
        &self,
        entity: &str,
        query: &Query,
        items: &[E],
    ) -> Result<EvaluationResult<E>> {
        if query.is_empty_result() {
            tracing::debug!(entity, kind = query.kind_name(), "Limit 0, skipping evaluation");
            return Ok(EvaluationResult::empty(query));
        }
        let schema = self.schema.require_entity(entity)?;
        let rows: Vec<Row<'_>> = items
            .iter()
            .map(|item| Row::root(item as &dyn Entity, Some(schema)))
            .collect();

        let result = match query {
            Query::Select(q) => {
                let mut matched = self.matching_indices(&rows, &q.filters)?;
                sort::sort_by_key(&mut matched, &q.sort, |&i, field| rows[i].value(field));
                let picked = q.limit.apply(matched);
                EvaluationResult::Entities(picked.into_iter().map(|i| items[i].clone()).collect())
            }
            Query::Aggregate(q) => {
                let matched = self.matching_rows(&rows, &q.where_filters)?;
                let shape = Shape {
                    fields: &q.select_fields,
                    group_by: &q.group_by,
                    having: &q.having,
                    order_by: &q.order_by,
                    limit: q.limit,
                };
                EvaluationResult::Rows(self.shape(&matched, &shape)?)
            }
            Query::Window(q) => {
                if q.select_fields.iter().any(FieldDefinition::is_aggregating) {
                    return Err(QuarryError::InvalidQuery(
                        "window query cannot select grouped aggregates".to_string(),
                    ));
                }
                let matched = self.matching_rows(&rows, &q.where_filters)?;
                let shape = Shape {
                    fields: &q.select_fields,
                    group_by: &[],
                    having: &[],
                    order_by: &q.order_by,
                    limit: q.limit,
                };
                EvaluationResult::Rows(self.shape(&matched, &shape)?)
            }
            Query::Update(q) => {
                let matched = self.matching_indices(&rows, &q.filters)?;
                let mut updated = Vec::with_capacity(matched.len());
                for i in matched {
                    let mut item = items[i].clone();
                    for assignment in &q.updates {
                        item.set(&assignment.field, assignment.value.clone())?;
                    }
                    updated.push(item);
                }
                EvaluationResult::Entities(updated)
            }
            Query::Delete(q) => {
                let matched = self.matching_indices(&rows, &q.filters)?;
                EvaluationResult::Entities(matched.into_iter().map(|i| items[i].clone()).collect())
            }
        };

        tracing::debug!(
            entity,
            kind = query.kind_name(),
            input = items.len(),
            output = result.len(),
            "Evaluated query in memory"
        );
        Ok(result)
    }

    /// Entities of `entity` matching every filter, in input order.
    pub fn filter<E: Entity + Clone>(&self, entity: &str, filters: &[FilterOption], items: &[E]) -> Result<Vec<E>> {
        let schema = self.schema.require_entity(entity)?;
        let mut out = Vec::new();
        for item in items {
            if self.row_matches(&Row::root(item, Some(schema)), filters)? {
                out.push(item.clone());
            }
        }
        Ok(out)
    }

    /// True if `item` matches every filter.
    pub fn matches(&self, entity: &str, filters: &[FilterOption], item: &dyn Entity) -> Result<bool> {
        let schema = self.schema.require_entity(entity)?;
        self.row_matches(&Row::root(item, Some(schema)), filters)
    }

    fn matching_indices(&self, rows: &[Row<'_>], filters: &[FilterOption]) -> Result<Vec<usize>> {
        let mut out = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            if self.row_matches(row, filters)? {
                out.push(i);
            }
        }
        Ok(out)
    }

    fn matching_rows<'r>(&self, rows: &[Row<'r>], filters: &[FilterOption]) -> Result<Vec<Row<'r>>> {
        let mut out = Vec::new();
        for row in rows {
            if self.row_matches(row, filters)? {
                out.push(*row);
            }
        }
        Ok(out)
    }

    // =========================================================================
    // Result Shaping
    // =========================================================================

    /// Group or project `rows`, then apply HAVING, ORDER BY and LIMIT.
    pub(crate) fn shape(&self, rows: &[Row<'_>], shape: &Shape<'_>) -> Result<Vec<ResultRow>> {
        // Each output row keeps the source row it was built from, so ORDER BY
        // can fall back to source fields that were not selected.
        let mut produced: Vec<(ResultRow, Option<usize>)> = Vec::new();
        if shape.is_grouped() {
            for members in group::partition(rows, shape.group_by) {
                let group: Vec<&Row<'_>> = members.iter().map(|&i| &rows[i]).collect();
                let output = self.group_output(shape.fields, &group)?;
                if self.having_holds(&output, &group, shape.having)? {
                    produced.push((output, members.first().copied()));
                }
            }
        } else {
            let windows = shape
                .fields
                .iter()
                .map(|def| match def {
                    FieldDefinition::Window(window) => self.window_column(window, rows).map(Some),
                    _ => Ok(None),
                })
                .collect::<Result<Vec<_>>>()?;
            for (i, row) in rows.iter().enumerate() {
                let output = self.project(shape.fields, row, &windows, i)?;
                produced.push((output, Some(i)));
            }
        }

        sort::sort_by_key(&mut produced, shape.order_by, |(output, source), field| {
            match output.value(field) {
                Some(value) => value.clone(),
                None => source.map(|i| rows[i].value(field)).unwrap_or(Value::Null),
            }
        });
        Ok(shape
            .limit
            .apply(produced)
            .into_iter()
            .map(|(row, _)| row)
            .collect())
    }

    fn project(
        &self,
        fields: &[FieldDefinition],
        row: &Row<'_>,
        windows: &[Option<Vec<Value>>],
        index: usize,
    ) -> Result<ResultRow> {
        let mut out = ResultRow::new();
        if fields.is_empty() {
            match row.schema.and_then(|s| s.primary_key()) {
                Some(pk) => out.push(pk.name.clone(), row.value(&pk.name)),
                None => {
                    for name in row.entity.field_names() {
                        let value = row.value(&name);
                        out.push(name, value);
                    }
                }
            }
            return Ok(out);
        }
        for (def, window) in fields.iter().zip(windows) {
            let value = match def {
                FieldDefinition::Simple { field, .. } => row.value(field),
                FieldDefinition::Aggregate { expr, .. } => self.aggregate(expr, &[row])?,
                FieldDefinition::Window(_) => window
                    .as_ref()
                    .and_then(|column| column.get(index).cloned())
                    .unwrap_or(Value::Null),
                FieldDefinition::SubQuery { sub_query, .. } => self.scalar_sub_query(sub_query, row)?,
            };
            out.push(def.output_name(), value);
        }
        Ok(out)
    }

    // =========================================================================
    // Sub-Queries
    // =========================================================================

    /// Rows a sub-query yields for the enclosing `outer` row.
    pub(crate) fn run_sub_query(&self, sq: &SubQuery, outer: &Row<'_>) -> Result<Vec<ResultRow>> {
        self.run_at(sq, outer, outer.depth + 1)
    }

    fn run_at(&self, sq: &SubQuery, outer: &Row<'_>, depth: usize) -> Result<Vec<ResultRow>> {
        if depth > self.max_depth {
            return Err(QuarryError::SubQueryDepthExceeded(self.max_depth));
        }
        let (records, schema) = match &sq.from_sub_query {
            Some(inner) => {
                let rows = self.run_at(inner, outer, depth + 1)?;
                let records: Vec<Record> = rows.into_iter().map(Record::from).collect();
                (records, None)
            }
            None => {
                let records = self.adapters.get(&sq.entity)?.load()?;
                (records, self.schema.entity(&sq.entity))
            }
        };
        let rows: Vec<Row<'_>> = records
            .iter()
            .map(|record| Row {
                entity: record,
                schema,
                outer: Some(outer),
                depth,
            })
            .collect();
        let matched = self.matching_rows(&rows, &sq.where_filters)?;
        let shape = Shape {
            fields: &sq.select_fields,
            group_by: &sq.group_by,
            having: &sq.having,
            order_by: &sq.order_by,
            limit: sq.limit,
        };
        self.shape(&matched, &shape)
    }

    /// First column of the first row, or NULL.
    pub(crate) fn scalar_sub_query(&self, sq: &SubQuery, outer: &Row<'_>) -> Result<Value> {
        Ok(self
            .run_sub_query(sq, outer)?
            .first()
            .map(ResultRow::first_value)
            .unwrap_or(Value::Null))
    }

    fn empty_row(&self) -> Row<'static> {
        Row::root(&EMPTY_ROW, None)
    }
}

// =============================================================================
// Tests
// =============================================================================

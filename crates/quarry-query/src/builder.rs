//! Quarry Builder - Fluent Query Construction
//!
//! Fluent entry points producing immutable [`Query`] values. Field cursors
//! carry their owning builder by value so a terminal comparison hands the
//! builder back; comparisons only exist on cursors whose owner can accept a
//! filter, which turns an unterminated cursor into a compile error.
//!
//! Key Features:
//! - Select, aggregate, window, update and delete builders
//! - Field and JSON-path cursors with typed comparisons
//! - Aggregation and window function wrappers
//! - HAVING redirection through an adapter
//! - Sub-query builders for filters, select columns and derived tables
//!
//! Errors raised while chaining (invalid JSON paths, bad raw limits, operand
//! shape violations from the dynamic `compare`) are kept and surfaced by
//! `build()`.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::ast::*;
use quarry_common::{QuarryError, Result, Value};

// =============================================================================
// Entry Points
// =============================================================================

pub fn select() -> SelectBuilder {
    SelectBuilder::new()
}

pub fn update() -> UpdateBuilder {
    UpdateBuilder::new()
}

pub fn delete() -> DeleteBuilder {
    DeleteBuilder::new()
}

pub fn aggregate() -> AggregateBuilder {
    AggregateBuilder::new()
}

pub fn window() -> WindowBuilder {
    WindowBuilder::new()
}

pub fn sub_query(entity: impl Into<String>) -> SubQueryBuilder {
    SubQueryBuilder::new(entity)
}

/// Detached field cursor, used to define select columns.
pub fn field(name: impl Into<String>) -> FieldCursor<Detached> {
    FieldCursor::new(Detached, name.into(), None)
}

/// Detached cursor on a value inside a JSON field.
pub fn json_field(name: impl Into<String>, path: impl Into<String>) -> FieldCursor<Detached> {
    FieldCursor::new(Detached, name.into(), Some(path.into()))
}

/// `COUNT(*)`.
pub fn count_all() -> AggregateCursor<Detached> {
    field("*").count()
}

pub fn row_number() -> WindowCursor {
    WindowCursor::new(None, WindowFunction::RowNumber)
}

pub fn rank() -> WindowCursor {
    WindowCursor::new(None, WindowFunction::Rank)
}

pub fn dense_rank() -> WindowCursor {
    WindowCursor::new(None, WindowFunction::DenseRank)
}

pub fn ntile(buckets: u32) -> WindowCursor {
    WindowCursor::new(None, WindowFunction::Ntile(buckets))
}

// =============================================================================
// Filter Sinks
// =============================================================================

/// A builder that accepts filters from a terminated cursor.
pub trait FilterSink: Sized {
    fn accept_filter(self, filter: FilterOption) -> Self;

    /// Keep a chaining error until `build()`.
    fn record_error(self, error: QuarryError) -> Self;

    fn where_(self, field: impl Into<String>) -> FieldCursor<Self> {
        FieldCursor::new(self, field.into(), None)
    }

    fn where_json(self, field: impl Into<String>, path: impl Into<String>) -> FieldCursor<Self> {
        let path = path.into();
        match crate::json_path::segments(&path) {
            Ok(_) => FieldCursor::new(self, field.into(), Some(path)),
            Err(e) => FieldCursor::new(self.record_error(e), field.into(), Some(path)),
        }
    }

    /// `EXISTS (sub-query)`.
    fn where_exists(self, sub: SubQueryBuilder) -> Self {
        exists_filter(self, sub, Operator::Exists)
    }

    fn where_not_exists(self, sub: SubQueryBuilder) -> Self {
        exists_filter(self, sub, Operator::NotExists)
    }

    /// Add an already-built filter.
    fn filter(self, filter: FilterOption) -> Self {
        self.accept_filter(filter)
    }
}

fn exists_filter<S: FilterSink>(sink: S, sub: SubQueryBuilder, operator: Operator) -> S {
    match sub.build() {
        Ok(sq) => sink.accept_filter(FilterOption::Plain {
            field: String::new(),
            operator,
            value: FilterValue::SubQuery(Box::new(sq)),
        }),
        Err(e) => sink.record_error(e),
    }
}

/// Invariants of a select-list entry frozen by `as_`.
fn check_definition(definition: &FieldDefinition) -> Result<()> {
    match definition {
        FieldDefinition::Aggregate { expr, .. } => expr.check(),
        FieldDefinition::Window(window) => window.check(),
        FieldDefinition::Simple { .. } | FieldDefinition::SubQuery { .. } => Ok(()),
    }
}

fn keep_first(slot: &mut Option<QuarryError>, error: QuarryError) {
    if slot.is_none() {
        *slot = Some(error);
    }
}

/// Owner of a cursor that only produces field definitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

// =============================================================================
// Field Cursor
// =============================================================================

/// A field (optionally a JSON path inside it) awaiting an operator or an
/// aggregation.
#[derive(Debug)]
#[must_use = "a field cursor does nothing until terminated"]
pub struct FieldCursor<O> {
    owner: O,
    field: String,
    json_path: Option<String>,
}

impl<O> FieldCursor<O> {
    fn new(owner: O, field: String, json_path: Option<String>) -> Self {
        Self {
            owner,
            field,
            json_path,
        }
    }

    fn aggregate(self, agg_type: AggregationType, condition: Option<Condition>) -> AggregateCursor<O> {
        let json_path = match (agg_type, self.json_path) {
            (AggregationType::ArrayLength, Some(path))
                if crate::json_path::segments(&path).map(|s| s.is_empty()).unwrap_or(false) =>
            {
                None
            }
            (_, path) => path,
        };
        AggregateCursor {
            owner: self.owner,
            expr: AggregateExpr {
                field: self.field,
                json_path,
                agg_type,
                condition,
                key_field: None,
            },
            alias: None,
        }
    }

    /// Aggregate by a runtime-chosen function. Conditional functions need
    /// a condition.
    pub fn try_agg(
        self,
        agg_type: AggregationType,
        condition: Option<Condition>,
    ) -> Result<AggregateCursor<O>> {
        let cursor = self.aggregate(agg_type, condition);
        cursor.expr.check()?;
        Ok(cursor)
    }

    pub fn count(self) -> AggregateCursor<O> {
        self.aggregate(AggregationType::Count, None)
    }

    pub fn count_distinct(self) -> AggregateCursor<O> {
        self.aggregate(AggregationType::CountDistinct, None)
    }

    pub fn sum(self) -> AggregateCursor<O> {
        self.aggregate(AggregationType::Sum, None)
    }

    pub fn avg(self) -> AggregateCursor<O> {
        self.aggregate(AggregationType::Avg, None)
    }

    pub fn min(self) -> AggregateCursor<O> {
        self.aggregate(AggregationType::Min, None)
    }

    pub fn max(self) -> AggregateCursor<O> {
        self.aggregate(AggregationType::Max, None)
    }

    pub fn count_if(self, condition: Condition) -> AggregateCursor<O> {
        self.aggregate(AggregationType::CountIf, Some(condition))
    }

    pub fn sum_if(self, condition: Condition) -> AggregateCursor<O> {
        self.aggregate(AggregationType::SumIf, Some(condition))
    }

    pub fn string_agg(self) -> AggregateCursor<O> {
        self.aggregate(AggregationType::StringAgg, None)
    }

    pub fn array_length(self) -> AggregateCursor<O> {
        self.aggregate(AggregationType::ArrayLength, None)
    }

    pub fn json_array_agg(self) -> AggregateCursor<O> {
        self.aggregate(AggregationType::JsonArrayAgg, None)
    }

    pub fn json_object_agg(self, key_field: impl Into<String>) -> AggregateCursor<O> {
        let mut cursor = self.aggregate(AggregationType::JsonObjectAgg, None);
        cursor.expr.key_field = Some(key_field.into());
        cursor
    }

    pub fn stddev(self) -> AggregateCursor<O> {
        self.aggregate(AggregationType::Stddev, None)
    }

    pub fn variance(self) -> AggregateCursor<O> {
        self.aggregate(AggregationType::Variance, None)
    }

    pub fn first(self) -> AggregateCursor<O> {
        self.aggregate(AggregationType::First, None)
    }

    pub fn last(self) -> AggregateCursor<O> {
        self.aggregate(AggregationType::Last, None)
    }
}

impl FieldCursor<Detached> {
    pub fn as_(self, alias: impl Into<String>) -> FieldDefinition {
        FieldDefinition::Simple {
            field: self.field,
            alias: Some(alias.into()),
        }
    }

    pub fn into_definition(self) -> FieldDefinition {
        FieldDefinition::simple(self.field)
    }

    /// Window function over this field.
    pub fn over(self, function: WindowFunction) -> WindowCursor {
        WindowCursor::new(Some(self.field), function)
    }

    pub fn lag(self, offset: u32) -> WindowCursor {
        self.over(WindowFunction::Lag(offset))
    }

    pub fn lead(self, offset: u32) -> WindowCursor {
        self.over(WindowFunction::Lead(offset))
    }

    pub fn first_value(self) -> WindowCursor {
        self.over(WindowFunction::FirstValue)
    }

    pub fn last_value(self) -> WindowCursor {
        self.over(WindowFunction::LastValue)
    }

    pub fn nth_value(self, n: u32) -> WindowCursor {
        self.over(WindowFunction::NthValue(n))
    }
}

impl<O: FilterSink> FieldCursor<O> {
    fn finish(self, operator: Operator, value: FilterValue) -> O {
        let filter = match self.json_path {
            Some(json_path) => FilterOption::JsonPath {
                field: self.field,
                json_path,
                operator,
                value,
            },
            None => FilterOption::Plain {
                field: self.field,
                operator,
                value,
            },
        };
        self.owner.accept_filter(filter)
    }

    pub fn eq(self, value: impl Into<Value>) -> O {
        self.finish(Operator::Eq, FilterValue::scalar(value))
    }

    pub fn ne(self, value: impl Into<Value>) -> O {
        self.finish(Operator::Ne, FilterValue::scalar(value))
    }

    pub fn gt(self, value: impl Into<Value>) -> O {
        self.finish(Operator::Gt, FilterValue::scalar(value))
    }

    pub fn gte(self, value: impl Into<Value>) -> O {
        self.finish(Operator::Gte, FilterValue::scalar(value))
    }

    pub fn lt(self, value: impl Into<Value>) -> O {
        self.finish(Operator::Lt, FilterValue::scalar(value))
    }

    pub fn lte(self, value: impl Into<Value>) -> O {
        self.finish(Operator::Lte, FilterValue::scalar(value))
    }

    pub fn in_list<I, V>(self, values: I) -> O
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.finish(Operator::In, FilterValue::list(values))
    }

    pub fn not_in<I, V>(self, values: I) -> O
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.finish(Operator::NotIn, FilterValue::list(values))
    }

    pub fn like(self, pattern: impl Into<String>) -> O {
        self.finish(Operator::Like, FilterValue::Scalar(Value::String(pattern.into())))
    }

    pub fn not_like(self, pattern: impl Into<String>) -> O {
        self.finish(Operator::NotLike, FilterValue::Scalar(Value::String(pattern.into())))
    }

    pub fn is_null(self) -> O {
        self.finish(Operator::IsNull, FilterValue::Empty)
    }

    pub fn is_not_null(self) -> O {
        self.finish(Operator::IsNotNull, FilterValue::Empty)
    }

    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> O {
        self.finish(Operator::Between, FilterValue::Range(low.into(), high.into()))
    }

    /// Field presence.
    pub fn exists(self) -> O {
        self.finish(Operator::Exists, FilterValue::Empty)
    }

    pub fn not_exists(self) -> O {
        self.finish(Operator::NotExists, FilterValue::Empty)
    }

    pub fn regex(self, pattern: impl Into<String>) -> O {
        self.finish(Operator::Regex, FilterValue::Scalar(Value::String(pattern.into())))
    }

    /// Value kind test, e.g. `"string"`.
    pub fn has_type(self, type_name: impl Into<String>) -> O {
        self.finish(Operator::Type, FilterValue::Scalar(Value::String(type_name.into())))
    }

    pub fn size(self, len: i64) -> O {
        self.finish(Operator::Size, FilterValue::scalar(len))
    }

    pub fn contains_all<I, V>(self, values: I) -> O
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.finish(Operator::All, FilterValue::list(values))
    }

    pub fn elem_match(self, value: impl Into<Value>) -> O {
        self.finish(Operator::ElemMatch, FilterValue::scalar(value))
    }

    pub fn text(self, search: impl Into<String>) -> O {
        self.finish(Operator::Text, FilterValue::Scalar(Value::String(search.into())))
    }

    pub fn in_sub_query(self, sub: SubQueryBuilder) -> O {
        self.sub_query_operand(Operator::In, sub)
    }

    pub fn not_in_sub_query(self, sub: SubQueryBuilder) -> O {
        self.sub_query_operand(Operator::NotIn, sub)
    }

    /// Compare against a scalar sub-query.
    pub fn compare_sub_query(self, operator: Operator, sub: SubQueryBuilder) -> O {
        self.sub_query_operand(operator, sub)
    }

    fn sub_query_operand(self, operator: Operator, sub: SubQueryBuilder) -> O {
        match sub.build() {
            Ok(sq) => self.compare(operator, FilterValue::SubQuery(Box::new(sq))),
            Err(e) => self.owner.record_error(e),
        }
    }

    /// Compare against a field of the enclosing query's row.
    pub fn eq_outer(self, outer_field: impl Into<String>) -> O {
        self.finish(
            Operator::Eq,
            FilterValue::Outer(OuterFieldReference::new(outer_field)),
        )
    }

    pub fn compare_outer(self, operator: Operator, outer_field: impl Into<String>) -> O {
        self.compare(operator, FilterValue::Outer(OuterFieldReference::new(outer_field)))
    }

    /// Runtime-chosen operator; shape violations surface from `build()`.
    pub fn compare(self, operator: Operator, value: FilterValue) -> O {
        match check_operand(operator, &value) {
            Ok(()) => self.finish(operator, value),
            Err(e) => self.owner.record_error(e),
        }
    }
}

// =============================================================================
// Aggregate Cursor
// =============================================================================

/// An aggregate awaiting an alias (select list) or a comparison (HAVING).
#[derive(Debug)]
#[must_use = "an aggregate cursor does nothing until terminated"]
pub struct AggregateCursor<O> {
    owner: O,
    expr: AggregateExpr,
    alias: Option<String>,
}

impl<O> AggregateCursor<O> {
    pub fn expr(&self) -> &AggregateExpr {
        &self.expr
    }
}

impl AggregateCursor<Detached> {
    pub fn as_(self, alias: impl Into<String>) -> FieldDefinition {
        FieldDefinition::Aggregate {
            expr: self.expr,
            alias: alias.into(),
        }
    }
}

impl<O: FilterSink> AggregateCursor<O> {
    /// Name the select-list alias this comparison refers to.
    pub fn referencing(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    fn finish(self, operator: Operator, value: FilterValue) -> O {
        if let Err(e) = self.expr.check().and_then(|_| check_operand(operator, &value)) {
            return self.owner.record_error(e);
        }
        self.owner.accept_filter(FilterOption::AggregateComparison {
            expr: self.expr,
            operator,
            value,
            alias: self.alias,
        })
    }

    pub fn eq(self, value: impl Into<Value>) -> O {
        self.finish(Operator::Eq, FilterValue::scalar(value))
    }

    pub fn ne(self, value: impl Into<Value>) -> O {
        self.finish(Operator::Ne, FilterValue::scalar(value))
    }

    pub fn gt(self, value: impl Into<Value>) -> O {
        self.finish(Operator::Gt, FilterValue::scalar(value))
    }

    pub fn gte(self, value: impl Into<Value>) -> O {
        self.finish(Operator::Gte, FilterValue::scalar(value))
    }

    pub fn lt(self, value: impl Into<Value>) -> O {
        self.finish(Operator::Lt, FilterValue::scalar(value))
    }

    pub fn lte(self, value: impl Into<Value>) -> O {
        self.finish(Operator::Lte, FilterValue::scalar(value))
    }

    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> O {
        self.finish(Operator::Between, FilterValue::Range(low.into(), high.into()))
    }
}

// =============================================================================
// Window Cursor
// =============================================================================

/// A window function column under construction.
#[derive(Debug, Clone)]
#[must_use = "a window cursor does nothing until aliased"]
pub struct WindowCursor {
    field: WindowField,
}

impl WindowCursor {
    fn new(field: Option<String>, function: WindowFunction) -> Self {
        Self {
            field: WindowField {
                field,
                function,
                partition_by: Vec::new(),
                order_by: Vec::new(),
                frame_start: None,
                frame_end: None,
                alias: String::new(),
            },
        }
    }

    pub fn partition_by(mut self, field: impl Into<String>) -> Self {
        self.field.partition_by.push(field.into());
        self
    }

    pub fn order_by(mut self, sort: SortOption) -> Self {
        self.field.order_by.push(sort);
        self
    }

    pub fn order_by_asc(self, field: impl Into<String>) -> Self {
        self.order_by(SortOption::asc(field))
    }

    pub fn order_by_desc(self, field: impl Into<String>) -> Self {
        self.order_by(SortOption::desc(field))
    }

    pub fn rows_between(mut self, start: FrameBound, end: FrameBound) -> Self {
        self.field.frame_start = Some(start);
        self.field.frame_end = Some(end);
        self
    }

    pub fn as_(mut self, alias: impl Into<String>) -> FieldDefinition {
        self.field.alias = alias.into();
        FieldDefinition::Window(self.field)
    }
}

// =============================================================================
// Select Builder
// =============================================================================

/// Builder for plain entity selects.
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    query: SelectQuery,
    error: Option<QuarryError>,
}

impl SelectBuilder {
    pub fn new() -> Self {
        Self {
            query: SelectQuery {
                columns: Vec::new(),
                filters: Vec::new(),
                sort: Vec::new(),
                limit: Limit::Unbounded,
                join_hint: None,
            },
            error: None,
        }
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.query.columns.push(name.into());
        self
    }

    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.columns.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn order_by(mut self, sort: SortOption) -> Self {
        self.query.sort.push(sort);
        self
    }

    pub fn order_by_asc(self, field: impl Into<String>) -> Self {
        self.order_by(SortOption::asc(field))
    }

    pub fn order_by_desc(self, field: impl Into<String>) -> Self {
        self.order_by(SortOption::desc(field))
    }

    pub fn limit(mut self, rows: u64) -> Self {
        self.query.limit = Limit::Rows(rows);
        self
    }

    /// Limit in the `-1 = unbounded` encoding.
    pub fn limit_raw(mut self, raw: i64) -> Self {
        match Limit::from_raw(raw) {
            Ok(limit) => self.query.limit = limit,
            Err(e) => keep_first(&mut self.error, e),
        }
        self
    }

    pub fn join(mut self, hint: JoinHint) -> Self {
        self.query.join_hint = Some(hint);
        self
    }

    pub fn build(self) -> Result<Query> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(Query::Select(self.query)),
        }
    }
}

impl Default for SelectBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterSink for SelectBuilder {
    fn accept_filter(mut self, filter: FilterOption) -> Self {
        self.query.filters.push(filter);
        self
    }

    fn record_error(mut self, error: QuarryError) -> Self {
        keep_first(&mut self.error, error);
        self
    }
}

// =============================================================================
// Update / Delete Builders
// =============================================================================

/// Builder for filtered updates.
#[derive(Debug, Clone, Default)]
pub struct UpdateBuilder {
    updates: Vec<Assignment>,
    filters: Vec<FilterOption>,
    error: Option<QuarryError>,
}

impl UpdateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.updates.push(Assignment {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn build(self) -> Result<Query> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.updates.is_empty() {
            return Err(QuarryError::InvalidQuery(
                "update requires at least one assignment".to_string(),
            ));
        }
        Ok(Query::Update(UpdateQuery {
            updates: self.updates,
            filters: self.filters,
        }))
    }
}

impl FilterSink for UpdateBuilder {
    fn accept_filter(mut self, filter: FilterOption) -> Self {
        self.filters.push(filter);
        self
    }

    fn record_error(mut self, error: QuarryError) -> Self {
        keep_first(&mut self.error, error);
        self
    }
}

/// Builder for filtered deletes.
#[derive(Debug, Clone, Default)]
pub struct DeleteBuilder {
    filters: Vec<FilterOption>,
    bypass_cache: bool,
    error: Option<QuarryError>,
}

impl DeleteBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    pub fn build(self) -> Result<Query> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(Query::Delete(DeleteQuery {
                filters: self.filters,
                bypass_cache: self.bypass_cache,
            })),
        }
    }
}

impl FilterSink for DeleteBuilder {
    fn accept_filter(mut self, filter: FilterOption) -> Self {
        self.filters.push(filter);
        self
    }

    fn record_error(mut self, error: QuarryError) -> Self {
        keep_first(&mut self.error, error);
        self
    }
}

// =============================================================================
// Aggregate Builder
// =============================================================================

/// Builder for grouped aggregate queries.
#[derive(Debug, Clone)]
pub struct AggregateBuilder {
    query: AggregateQuery,
    error: Option<QuarryError>,
}

impl AggregateBuilder {
    pub fn new() -> Self {
        Self {
            query: AggregateQuery {
                select_fields: Vec::new(),
                from_table: None,
                where_filters: Vec::new(),
                group_by: Vec::new(),
                having: Vec::new(),
                order_by: Vec::new(),
                limit: Limit::Unbounded,
            },
            error: None,
        }
    }

    pub fn select(mut self, definition: FieldDefinition) -> Self {
        match check_definition(&definition) {
            Ok(()) => self.query.select_fields.push(definition),
            Err(e) => keep_first(&mut self.error, e),
        }
        self
    }

    pub fn select_field(self, name: impl Into<String>) -> Self {
        self.select(FieldDefinition::simple(name))
    }

    /// Override the table of the target entity.
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.query.from_table = Some(table.into());
        self
    }

    pub fn group_by(mut self, field: impl Into<String>) -> Self {
        self.query.group_by.push(field.into());
        self
    }

    /// Redirect subsequent filters into HAVING until `end()`.
    pub fn having(self) -> HavingAdapter<Self> {
        HavingAdapter { builder: self }
    }

    pub fn order_by(mut self, sort: SortOption) -> Self {
        self.query.order_by.push(sort);
        self
    }

    pub fn order_by_asc(self, field: impl Into<String>) -> Self {
        self.order_by(SortOption::asc(field))
    }

    pub fn order_by_desc(self, field: impl Into<String>) -> Self {
        self.order_by(SortOption::desc(field))
    }

    pub fn limit(mut self, rows: u64) -> Self {
        self.query.limit = Limit::Rows(rows);
        self
    }

    pub fn build(self) -> Result<Query> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.query.select_fields.is_empty() {
            return Err(QuarryError::InvalidQuery(
                "aggregate query requires select fields".to_string(),
            ));
        }
        Ok(Query::Aggregate(self.query))
    }
}

impl Default for AggregateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterSink for AggregateBuilder {
    fn accept_filter(mut self, filter: FilterOption) -> Self {
        self.query.where_filters.push(filter);
        self
    }

    fn record_error(mut self, error: QuarryError) -> Self {
        keep_first(&mut self.error, error);
        self
    }
}

impl HavingSink for AggregateBuilder {
    fn accept_having(mut self, filter: FilterOption) -> Self {
        self.query.having.push(filter);
        self
    }
}

// =============================================================================
// Window Builder
// =============================================================================

/// Builder for queries with window function columns.
#[derive(Debug, Clone)]
pub struct WindowBuilder {
    query: WindowQuery,
    error: Option<QuarryError>,
}

impl WindowBuilder {
    pub fn new() -> Self {
        Self {
            query: WindowQuery {
                select_fields: Vec::new(),
                from_table: None,
                where_filters: Vec::new(),
                order_by: Vec::new(),
                limit: Limit::Unbounded,
            },
            error: None,
        }
    }

    pub fn select(mut self, definition: FieldDefinition) -> Self {
        match check_definition(&definition) {
            Ok(()) => self.query.select_fields.push(definition),
            Err(e) => keep_first(&mut self.error, e),
        }
        self
    }

    pub fn select_field(self, name: impl Into<String>) -> Self {
        self.select(FieldDefinition::simple(name))
    }

    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.query.from_table = Some(table.into());
        self
    }

    pub fn order_by(mut self, sort: SortOption) -> Self {
        self.query.order_by.push(sort);
        self
    }

    pub fn order_by_asc(self, field: impl Into<String>) -> Self {
        self.order_by(SortOption::asc(field))
    }

    pub fn order_by_desc(self, field: impl Into<String>) -> Self {
        self.order_by(SortOption::desc(field))
    }

    pub fn limit(mut self, rows: u64) -> Self {
        self.query.limit = Limit::Rows(rows);
        self
    }

    pub fn build(self) -> Result<Query> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.query.select_fields.is_empty() {
            return Err(QuarryError::InvalidQuery(
                "window query requires select fields".to_string(),
            ));
        }
        for definition in &self.query.select_fields {
            if let FieldDefinition::Window(window) = definition {
                window.check()?;
            }
        }
        Ok(Query::Window(self.query))
    }
}

impl Default for WindowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterSink for WindowBuilder {
    fn accept_filter(mut self, filter: FilterOption) -> Self {
        self.query.where_filters.push(filter);
        self
    }

    fn record_error(mut self, error: QuarryError) -> Self {
        keep_first(&mut self.error, error);
        self
    }
}

// =============================================================================
// Sub-Query Builder
// =============================================================================

/// Builder for nested queries.
#[derive(Debug, Clone)]
pub struct SubQueryBuilder {
    query: SubQuery,
    error: Option<QuarryError>,
}

impl SubQueryBuilder {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            query: SubQuery {
                entity: entity.into(),
                select_fields: Vec::new(),
                where_filters: Vec::new(),
                group_by: Vec::new(),
                having: Vec::new(),
                order_by: Vec::new(),
                limit: Limit::Unbounded,
                alias: None,
                from_sub_query: None,
            },
            error: None,
        }
    }

    pub fn select(mut self, definition: FieldDefinition) -> Self {
        match check_definition(&definition) {
            Ok(()) => self.query.select_fields.push(definition),
            Err(e) => keep_first(&mut self.error, e),
        }
        self
    }

    pub fn select_field(self, name: impl Into<String>) -> Self {
        self.select(FieldDefinition::simple(name))
    }

    pub fn group_by(mut self, field: impl Into<String>) -> Self {
        self.query.group_by.push(field.into());
        self
    }

    pub fn having(self) -> HavingAdapter<Self> {
        HavingAdapter { builder: self }
    }

    pub fn order_by(mut self, sort: SortOption) -> Self {
        self.query.order_by.push(sort);
        self
    }

    pub fn limit(mut self, rows: u64) -> Self {
        self.query.limit = Limit::Rows(rows);
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.query.alias = Some(alias.into());
        self
    }

    /// Read from another sub-query instead of the entity's table.
    pub fn from_sub_query(mut self, inner: SubQueryBuilder) -> Self {
        match inner.build() {
            Ok(sq) => self.query.from_sub_query = Some(Box::new(sq)),
            Err(e) => keep_first(&mut self.error, e),
        }
        self
    }

    /// Use this sub-query as a select column.
    pub fn as_(self, alias: impl Into<String>) -> Result<FieldDefinition> {
        let sub_query = self.build()?;
        Ok(FieldDefinition::SubQuery {
            sub_query: Box::new(sub_query),
            alias: alias.into(),
        })
    }

    pub fn build(self) -> Result<SubQuery> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.query),
        }
    }
}

impl FilterSink for SubQueryBuilder {
    fn accept_filter(mut self, filter: FilterOption) -> Self {
        self.query.where_filters.push(filter);
        self
    }

    fn record_error(mut self, error: QuarryError) -> Self {
        keep_first(&mut self.error, error);
        self
    }
}

impl HavingSink for SubQueryBuilder {
    fn accept_having(mut self, filter: FilterOption) -> Self {
        self.query.having.push(filter);
        self
    }
}

// =============================================================================
// HAVING Adapter
// =============================================================================

/// Builders with a HAVING clause.
pub trait HavingSink: FilterSink {
    fn accept_having(self, filter: FilterOption) -> Self;
}

/// Routes terminated cursors into the wrapped builder's HAVING clause.
#[derive(Debug, Clone)]
#[must_use = "call end() to return to the builder"]
pub struct HavingAdapter<B> {
    builder: B,
}

impl<B: HavingSink> HavingAdapter<B> {
    pub fn field(self, name: impl Into<String>) -> FieldCursor<Self> {
        FieldCursor::new(self, name.into(), None)
    }

    pub fn end(self) -> B {
        self.builder
    }
}

impl<B: HavingSink> FilterSink for HavingAdapter<B> {
    fn accept_filter(self, filter: FilterOption) -> Self {
        Self {
            builder: self.builder.accept_having(filter),
        }
    }

    fn record_error(self, error: QuarryError) -> Self {
        Self {
            builder: self.builder.record_error(error),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Quarry AST - Query Model
//!
//! Immutable, backend-agnostic representation of a query's intent. Values of
//! these types are produced by the builder DSL and consumed by the SQL
//! translator, the document filter translator and the in-memory evaluator.
//!
//! Key Features:
//! - Closed sum types for queries, filters and field definitions
//! - Construction-time checks for operand shape and aggregate conditions
//! - Aggregation and window function vocabularies
//! - Correlated and derived sub-queries
//! - Structural equality and a stable cache key
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use quarry_common::utils::hash64;
use quarry_common::{QuarryError, Result, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Limit
// =============================================================================

/// Row limit of a query. A zero limit means an empty result and never
/// reaches a translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Limit {
    #[default]
    Unbounded,
    Rows(u64),
}

impl Limit {
    /// Raw encoding accepted by [`Limit::from_raw`] for "no limit".
    pub const UNBOUNDED_RAW: i64 = -1;

    /// Decode the raw `-1 = unbounded` encoding.
    pub fn from_raw(raw: i64) -> Result<Self> {
        match raw {
            Self::UNBOUNDED_RAW => Ok(Limit::Unbounded),
            n if n >= 0 => Ok(Limit::Rows(n as u64)),
            n => Err(QuarryError::InvalidQuery(format!("invalid limit {}", n))),
        }
    }

    pub fn as_raw(&self) -> i64 {
        match self {
            Limit::Unbounded => Self::UNBOUNDED_RAW,
            Limit::Rows(n) => *n as i64,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Limit::Rows(0))
    }

    /// Truncate a materialized result to this limit.
    pub fn apply<T>(&self, mut items: Vec<T>) -> Vec<T> {
        if let Limit::Rows(n) = self {
            items.truncate(*n as usize);
        }
        items
    }
}

// =============================================================================
// Sorting
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// One ORDER BY component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortOption {
    pub field: String,
    pub order: SortOrder,
}

impl SortOption {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

// =============================================================================
// Operators
// =============================================================================

/// Filter operators. Each backend interprets the subset it supports and
/// rejects the rest with `UnsupportedOperator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Like,
    NotLike,
    IsNull,
    IsNotNull,
    Between,
    Exists,
    NotExists,
    Regex,
    Type,
    Size,
    All,
    ElemMatch,
    Text,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::Between => "BETWEEN",
            Operator::Exists => "EXISTS",
            Operator::NotExists => "NOT EXISTS",
            Operator::Regex => "REGEX",
            Operator::Type => "TYPE",
            Operator::Size => "SIZE",
            Operator::All => "ALL",
            Operator::ElemMatch => "ELEM_MATCH",
            Operator::Text => "TEXT",
        }
    }

    /// `=`, `!=`, `>`, `>=`, `<`, `<=`.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Ne | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte
        )
    }

    pub fn requires_collection(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn | Operator::All)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// =============================================================================
// Filter Values
// =============================================================================

/// Marks a value taken from the enclosing query's current row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OuterFieldReference {
    pub name: String,
}

impl OuterFieldReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Right-hand side of a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    /// No operand (`IS NULL`, field-presence `EXISTS`).
    Empty,
    Scalar(Value),
    List(Vec<Value>),
    Range(Value, Value),
    SubQuery(Box<SubQuery>),
    Outer(OuterFieldReference),
}

impl FilterValue {
    pub fn scalar(value: impl Into<Value>) -> Self {
        FilterValue::Scalar(value.into())
    }

    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            FilterValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn sub_query(&self) -> Option<&SubQuery> {
        match self {
            FilterValue::SubQuery(sq) => Some(sq),
            _ => None,
        }
    }

    /// True if every concrete value in the operand is numeric.
    pub fn is_numeric(&self) -> bool {
        match self {
            FilterValue::Scalar(v) => v.is_numeric(),
            FilterValue::List(items) => !items.is_empty() && items.iter().all(Value::is_numeric),
            FilterValue::Range(low, high) => low.is_numeric() && high.is_numeric(),
            _ => false,
        }
    }
}

/// Checks that an operand has the shape its operator needs.
pub(crate) fn check_operand(operator: Operator, value: &FilterValue) -> Result<()> {
    let ok = match operator {
        Operator::In | Operator::NotIn => {
            matches!(value, FilterValue::List(_) | FilterValue::SubQuery(_))
        }
        Operator::All => matches!(value, FilterValue::List(_)),
        Operator::Between => matches!(value, FilterValue::Range(_, _)),
        Operator::IsNull | Operator::IsNotNull => matches!(value, FilterValue::Empty),
        Operator::Exists | Operator::NotExists => matches!(
            value,
            FilterValue::Empty
                | FilterValue::SubQuery(_)
                | FilterValue::Scalar(Value::Null)
                | FilterValue::Scalar(Value::Boolean(_))
        ),
        Operator::Size => matches!(value, FilterValue::Scalar(Value::Integer(_))),
        _ => matches!(
            value,
            FilterValue::Scalar(_) | FilterValue::SubQuery(_) | FilterValue::Outer(_)
        ),
    };

    if ok {
        return Ok(());
    }
    if operator.requires_collection() {
        return Err(QuarryError::NotACollection(operator.to_string()));
    }
    Err(QuarryError::InvalidQuery(format!(
        "operator {} cannot take operand {:?}",
        operator, value
    )))
}

// =============================================================================
// Conditions
// =============================================================================

/// Embedded condition of a conditional aggregate (`COUNT_IF`, `SUM_IF`).
///
/// Without a field the condition tests the aggregated field itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: Option<String>,
    pub operator: Operator,
    pub value: FilterValue,
}

impl Condition {
    pub fn new(operator: Operator, value: FilterValue) -> Result<Self> {
        check_operand(operator, &value)?;
        Ok(Self {
            field: None,
            operator,
            value,
        })
    }

    /// Start a condition on another field of the same row.
    pub fn on(field: impl Into<String>) -> ConditionTarget {
        ConditionTarget {
            field: field.into(),
        }
    }

    fn scalar(operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: None,
            operator,
            value: FilterValue::Scalar(value.into()),
        }
    }

    pub fn eq(value: impl Into<Value>) -> Self {
        Self::scalar(Operator::Eq, value)
    }

    pub fn ne(value: impl Into<Value>) -> Self {
        Self::scalar(Operator::Ne, value)
    }

    pub fn gt(value: impl Into<Value>) -> Self {
        Self::scalar(Operator::Gt, value)
    }

    pub fn gte(value: impl Into<Value>) -> Self {
        Self::scalar(Operator::Gte, value)
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        Self::scalar(Operator::Lt, value)
    }

    pub fn lte(value: impl Into<Value>) -> Self {
        Self::scalar(Operator::Lte, value)
    }

    pub fn like(pattern: impl Into<String>) -> Self {
        Self::scalar(Operator::Like, Value::String(pattern.into()))
    }

    pub fn in_list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            field: None,
            operator: Operator::In,
            value: FilterValue::list(values),
        }
    }

    pub fn is_null() -> Self {
        Self {
            field: None,
            operator: Operator::IsNull,
            value: FilterValue::Empty,
        }
    }

    pub fn is_not_null() -> Self {
        Self {
            field: None,
            operator: Operator::IsNotNull,
            value: FilterValue::Empty,
        }
    }
}

/// Field-scoped condition constructor returned by [`Condition::on`].
pub struct ConditionTarget {
    field: String,
}

impl ConditionTarget {
    pub fn eq(self, value: impl Into<Value>) -> Condition {
        self.with(Condition::eq(value))
    }

    pub fn ne(self, value: impl Into<Value>) -> Condition {
        self.with(Condition::ne(value))
    }

    pub fn gt(self, value: impl Into<Value>) -> Condition {
        self.with(Condition::gt(value))
    }

    pub fn lt(self, value: impl Into<Value>) -> Condition {
        self.with(Condition::lt(value))
    }

    pub fn in_list<I, V>(self, values: I) -> Condition
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.with(Condition::in_list(values))
    }

    fn with(self, condition: Condition) -> Condition {
        Condition {
            field: Some(self.field),
            ..condition
        }
    }
}

// =============================================================================
// Aggregations
// =============================================================================

/// Aggregation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationType {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
    CountIf,
    SumIf,
    StringAgg,
    ArrayLength,
    JsonArrayAgg,
    JsonObjectAgg,
    Stddev,
    Variance,
    First,
    Last,
}

impl AggregationType {
    pub fn name(&self) -> &'static str {
        match self {
            AggregationType::Count => "COUNT",
            AggregationType::CountDistinct => "COUNT_DISTINCT",
            AggregationType::Sum => "SUM",
            AggregationType::Avg => "AVG",
            AggregationType::Min => "MIN",
            AggregationType::Max => "MAX",
            AggregationType::CountIf => "COUNT_IF",
            AggregationType::SumIf => "SUM_IF",
            AggregationType::StringAgg => "STRING_AGG",
            AggregationType::ArrayLength => "ARRAY_LENGTH",
            AggregationType::JsonArrayAgg => "JSON_ARRAY_AGG",
            AggregationType::JsonObjectAgg => "JSON_OBJECT_AGG",
            AggregationType::Stddev => "STDDEV",
            AggregationType::Variance => "VARIANCE",
            AggregationType::First => "FIRST",
            AggregationType::Last => "LAST",
        }
    }

    pub fn requires_condition(&self) -> bool {
        matches!(self, AggregationType::CountIf | AggregationType::SumIf)
    }

    /// False for per-row functions that never collapse a group.
    pub fn is_aggregating(&self) -> bool {
        !matches!(self, AggregationType::ArrayLength)
    }

    /// True for functions whose input must be treated as a number.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            AggregationType::Sum
                | AggregationType::Avg
                | AggregationType::SumIf
                | AggregationType::Stddev
                | AggregationType::Variance
        )
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An aggregate computation over one field, shared by select lists and
/// HAVING comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateExpr {
    pub field: String,
    pub json_path: Option<String>,
    pub agg_type: AggregationType,
    pub condition: Option<Condition>,
    /// Key column of `JSON_OBJECT_AGG`.
    pub key_field: Option<String>,
}

impl AggregateExpr {
    pub fn new(field: impl Into<String>, agg_type: AggregationType) -> Result<Self> {
        let expr = Self {
            field: field.into(),
            json_path: None,
            agg_type,
            condition: None,
            key_field: None,
        };
        expr.check()?;
        Ok(expr)
    }

    pub fn conditional(
        field: impl Into<String>,
        agg_type: AggregationType,
        condition: Condition,
    ) -> Result<Self> {
        let expr = Self {
            field: field.into(),
            json_path: None,
            agg_type,
            condition: Some(condition),
            key_field: None,
        };
        expr.check()?;
        Ok(expr)
    }

    /// Re-checks the invariants the constructors enforce. Translators call
    /// this again because the fields are public.
    pub fn check(&self) -> Result<()> {
        match (&self.condition, self.agg_type.requires_condition()) {
            (None, true) => return Err(QuarryError::MissingCondition(self.agg_type.to_string())),
            (Some(_), false) => {
                return Err(QuarryError::InvalidQuery(format!(
                    "aggregation {} does not take a condition",
                    self.agg_type
                )))
            }
            (Some(condition), true) => check_operand(condition.operator, &condition.value)?,
            (None, false) => {}
        }
        if self.agg_type == AggregationType::JsonObjectAgg && self.key_field.is_none() {
            return Err(QuarryError::InvalidQuery(
                "JSON_OBJECT_AGG requires a key field".to_string(),
            ));
        }
        if self.field == "*" && self.agg_type != AggregationType::Count {
            return Err(QuarryError::InvalidQuery(format!(
                "{} cannot aggregate '*'",
                self.agg_type
            )));
        }
        Ok(())
    }

    /// Label used when no alias names the aggregate.
    pub fn label(&self) -> String {
        match &self.json_path {
            Some(path) => format!("{}({}{})", self.agg_type, self.field, path.trim_start_matches('$')),
            None => format!("{}({})", self.agg_type, self.field),
        }
    }
}

// =============================================================================
// Window Functions
// =============================================================================

/// Window frame boundary (`ROWS BETWEEN <start> AND <end>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(u32),
    CurrentRow,
    Following(u32),
    UnboundedFollowing,
}

impl FrameBound {
    /// Offset relative to the current row; unbounded ends saturate.
    pub fn offset(&self) -> i64 {
        match self {
            FrameBound::UnboundedPreceding => i64::MIN,
            FrameBound::Preceding(n) => -(*n as i64),
            FrameBound::CurrentRow => 0,
            FrameBound::Following(n) => *n as i64,
            FrameBound::UnboundedFollowing => i64::MAX,
        }
    }
}

/// Window functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowFunction {
    RowNumber,
    Rank,
    DenseRank,
    Ntile(u32),
    Lag(u32),
    Lead(u32),
    FirstValue,
    LastValue,
    NthValue(u32),
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl WindowFunction {
    pub fn name(&self) -> &'static str {
        match self {
            WindowFunction::RowNumber => "ROW_NUMBER",
            WindowFunction::Rank => "RANK",
            WindowFunction::DenseRank => "DENSE_RANK",
            WindowFunction::Ntile(_) => "NTILE",
            WindowFunction::Lag(_) => "LAG",
            WindowFunction::Lead(_) => "LEAD",
            WindowFunction::FirstValue => "FIRST_VALUE",
            WindowFunction::LastValue => "LAST_VALUE",
            WindowFunction::NthValue(_) => "NTH_VALUE",
            WindowFunction::Count => "COUNT",
            WindowFunction::Sum => "SUM",
            WindowFunction::Avg => "AVG",
            WindowFunction::Min => "MIN",
            WindowFunction::Max => "MAX",
        }
    }

    /// Aggregate-window functions (`COUNT/SUM/AVG/MIN/MAX ... OVER`).
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            WindowFunction::Count
                | WindowFunction::Sum
                | WindowFunction::Avg
                | WindowFunction::Min
                | WindowFunction::Max
        )
    }

    pub fn is_ranking(&self) -> bool {
        matches!(
            self,
            WindowFunction::RowNumber
                | WindowFunction::Rank
                | WindowFunction::DenseRank
                | WindowFunction::Ntile(_)
        )
    }

    /// True if the function reads a field value (COUNT may count rows).
    pub fn requires_field(&self) -> bool {
        !self.is_ranking() && *self != WindowFunction::Count
    }
}

impl fmt::Display for WindowFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A window function column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowField {
    pub field: Option<String>,
    pub function: WindowFunction,
    pub partition_by: Vec<String>,
    pub order_by: Vec<SortOption>,
    pub frame_start: Option<FrameBound>,
    pub frame_end: Option<FrameBound>,
    pub alias: String,
}

impl WindowField {
    pub fn check(&self) -> Result<()> {
        if self.function.requires_field() && self.field.is_none() {
            return Err(QuarryError::InvalidQuery(format!(
                "window function {} requires a field",
                self.function
            )));
        }
        if let Some((start, end)) = self.frame() {
            if self.function.is_ranking() {
                return Err(QuarryError::InvalidQuery(format!(
                    "window function {} does not take a frame",
                    self.function
                )));
            }
            if start == FrameBound::UnboundedFollowing
                || end == FrameBound::UnboundedPreceding
                || start.offset() > end.offset()
            {
                return Err(QuarryError::InvalidQuery(format!(
                    "invalid window frame {:?} .. {:?}",
                    start, end
                )));
            }
        }
        Ok(())
    }

    /// Frame with defaults filled in, if either end was given.
    pub fn frame(&self) -> Option<(FrameBound, FrameBound)> {
        match (self.frame_start, self.frame_end) {
            (None, None) => None,
            (Some(start), None) => Some((start, FrameBound::CurrentRow)),
            (None, Some(end)) => Some((FrameBound::UnboundedPreceding, end)),
            (Some(start), Some(end)) => Some((start, end)),
        }
    }
}

// =============================================================================
// Field Definitions
// =============================================================================

/// An output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldDefinition {
    Simple {
        field: String,
        alias: Option<String>,
    },
    Aggregate {
        expr: AggregateExpr,
        alias: String,
    },
    Window(WindowField),
    SubQuery {
        sub_query: Box<SubQuery>,
        alias: String,
    },
}

impl FieldDefinition {
    pub fn simple(field: impl Into<String>) -> Self {
        FieldDefinition::Simple {
            field: field.into(),
            alias: None,
        }
    }

    /// Name of the column this definition produces.
    pub fn output_name(&self) -> &str {
        match self {
            FieldDefinition::Simple { field, alias } => alias.as_deref().unwrap_or(field),
            FieldDefinition::Aggregate { alias, .. } => alias,
            FieldDefinition::Window(window) => &window.alias,
            FieldDefinition::SubQuery { alias, .. } => alias,
        }
    }

    pub fn is_aggregating(&self) -> bool {
        matches!(self, FieldDefinition::Aggregate { expr, .. } if expr.agg_type.is_aggregating())
    }
}

// =============================================================================
// Filters
// =============================================================================

/// A single filter. Filters within one clause are AND-combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterOption {
    Plain {
        field: String,
        operator: Operator,
        value: FilterValue,
    },
    JsonPath {
        field: String,
        json_path: String,
        operator: Operator,
        value: FilterValue,
    },
    /// HAVING comparison. Without an alias the aggregate is recomputed.
    AggregateComparison {
        expr: AggregateExpr,
        operator: Operator,
        value: FilterValue,
        alias: Option<String>,
    },
}

impl FilterOption {
    pub fn plain(field: impl Into<String>, operator: Operator, value: FilterValue) -> Result<Self> {
        check_operand(operator, &value)?;
        Ok(FilterOption::Plain {
            field: field.into(),
            operator,
            value,
        })
    }

    pub fn json_path(
        field: impl Into<String>,
        json_path: impl Into<String>,
        operator: Operator,
        value: FilterValue,
    ) -> Result<Self> {
        let json_path = json_path.into();
        crate::json_path::segments(&json_path)?;
        check_operand(operator, &value)?;
        Ok(FilterOption::JsonPath {
            field: field.into(),
            json_path,
            operator,
            value,
        })
    }

    pub fn aggregate_comparison(
        expr: AggregateExpr,
        operator: Operator,
        value: FilterValue,
        alias: Option<String>,
    ) -> Result<Self> {
        expr.check()?;
        check_operand(operator, &value)?;
        Ok(FilterOption::AggregateComparison {
            expr,
            operator,
            value,
            alias,
        })
    }

    pub fn field(&self) -> &str {
        match self {
            FilterOption::Plain { field, .. } | FilterOption::JsonPath { field, .. } => field,
            FilterOption::AggregateComparison { expr, .. } => &expr.field,
        }
    }

    pub fn operator(&self) -> Operator {
        match self {
            FilterOption::Plain { operator, .. }
            | FilterOption::JsonPath { operator, .. }
            | FilterOption::AggregateComparison { operator, .. } => *operator,
        }
    }

    pub fn value(&self) -> &FilterValue {
        match self {
            FilterOption::Plain { value, .. }
            | FilterOption::JsonPath { value, .. }
            | FilterOption::AggregateComparison { value, .. } => value,
        }
    }

    /// `EXISTS (sub-query)` style filters that do not read their own field.
    pub fn is_sub_query_existence(&self) -> bool {
        matches!(self.operator(), Operator::Exists | Operator::NotExists)
            && matches!(self.value(), FilterValue::SubQuery(_))
    }
}

// =============================================================================
// Sub-Queries
// =============================================================================

/// A nested query, either inside a filter operand, as a select column, or
/// as the derived table of another sub-query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQuery {
    pub entity: String,
    pub select_fields: Vec<FieldDefinition>,
    pub where_filters: Vec<FilterOption>,
    pub group_by: Vec<String>,
    pub having: Vec<FilterOption>,
    pub order_by: Vec<SortOption>,
    pub limit: Limit,
    pub alias: Option<String>,
    pub from_sub_query: Option<Box<SubQuery>>,
}

impl SubQuery {
    /// True if evaluating this sub-query collapses rows into groups.
    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || self.select_fields.iter().any(FieldDefinition::is_aggregating)
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Optional eager join requested for a plain select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinHint {
    pub entity: String,
    pub local_field: String,
    pub foreign_field: String,
    pub kind: JoinKind,
}

/// `SET field = value` of an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub columns: Vec<String>,
    pub filters: Vec<FilterOption>,
    pub sort: Vec<SortOption>,
    pub limit: Limit,
    pub join_hint: Option<JoinHint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateQuery {
    pub select_fields: Vec<FieldDefinition>,
    pub from_table: Option<String>,
    pub where_filters: Vec<FilterOption>,
    pub group_by: Vec<String>,
    pub having: Vec<FilterOption>,
    pub order_by: Vec<SortOption>,
    pub limit: Limit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowQuery {
    pub select_fields: Vec<FieldDefinition>,
    pub from_table: Option<String>,
    pub where_filters: Vec<FilterOption>,
    pub order_by: Vec<SortOption>,
    pub limit: Limit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateQuery {
    pub updates: Vec<Assignment>,
    pub filters: Vec<FilterOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteQuery {
    pub filters: Vec<FilterOption>,
    pub bypass_cache: bool,
}

/// Top-level query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    Select(SelectQuery),
    Aggregate(AggregateQuery),
    Window(WindowQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
}

impl Query {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Query::Select(_) => "select",
            Query::Aggregate(_) => "aggregate",
            Query::Window(_) => "window",
            Query::Update(_) => "update",
            Query::Delete(_) => "delete",
        }
    }

    pub fn limit(&self) -> Limit {
        match self {
            Query::Select(q) => q.limit,
            Query::Aggregate(q) => q.limit,
            Query::Window(q) => q.limit,
            Query::Update(_) | Query::Delete(_) => Limit::Unbounded,
        }
    }

    /// True if the query is known to produce nothing without running it.
    pub fn is_empty_result(&self) -> bool {
        self.limit().is_zero()
    }

    pub fn where_filters(&self) -> &[FilterOption] {
        match self {
            Query::Select(q) => &q.filters,
            Query::Aggregate(q) => &q.where_filters,
            Query::Window(q) => &q.where_filters,
            Query::Update(q) => &q.filters,
            Query::Delete(q) => &q.filters,
        }
    }

    pub fn select_fields(&self) -> &[FieldDefinition] {
        match self {
            Query::Aggregate(q) => &q.select_fields,
            Query::Window(q) => &q.select_fields,
            Query::Select(_) | Query::Update(_) | Query::Delete(_) => &[],
        }
    }

    pub fn having(&self) -> &[FilterOption] {
        match self {
            Query::Aggregate(q) => &q.having,
            _ => &[],
        }
    }

    /// Stable hash of the canonical serialized form. Structurally equal
    /// queries share a key.
    pub fn cache_key(&self) -> Result<u64> {
        let encoded = serde_json::to_vec(self)?;
        Ok(hash64(&encoded))
    }
}

// =============================================================================
// Tests
// =============================================================================

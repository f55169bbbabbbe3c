//! Quarry Binder - Parameter Binding
//!
//! Binds filter operands into backend parameter slots. The binder walks a
//! query in the exact order the SQL translator emits placeholders, so the
//! n-th bound parameter always belongs to the n-th placeholder. Slot names
//! come from the same target function the translator uses for the left-hand
//! side of each predicate.
//!
//! Key Features:
//! - Resolver registry keyed by runtime value kind
//! - Typeless NULL binding
//! - Whole-document JSON operands bound as codec text
//! - Correlated and derived sub-query traversal
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::ast::*;
use crate::dialect::Dialect;
use crate::json_path::{self, ValueBinding};
use crate::metadata::{EntitySchema, SchemaProvider};
use crate::sql::scope::{self, ScopeStack};
use crate::sql::{condition_target, having_alias, predicate_reads_lhs};
use chrono::{DateTime, Utc};
use quarry_common::{QuarryError, QueryConfig, Result, Value, ValueKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Bound Values
// =============================================================================

/// A value in the form a driver accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    /// Serialized JSON document.
    Json(String),
}

/// One positional parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    /// 1-based placeholder position.
    pub index: usize,
    /// Left-hand side of the predicate the parameter belongs to.
    pub slot: String,
    pub value: BoundValue,
}

// =============================================================================
// Value Resolvers
// =============================================================================

/// Converts one runtime value into its bound form.
pub trait ValueResolver: Send + Sync {
    fn resolve(&self, value: &Value) -> Result<BoundValue>;
}

impl<F> ValueResolver for F
where
    F: Fn(&Value) -> Result<BoundValue> + Send + Sync,
{
    fn resolve(&self, value: &Value) -> Result<BoundValue> {
        self(value)
    }
}

fn mismatch(expected: ValueKind, value: &Value) -> QuarryError {
    QuarryError::TypeError(format!(
        "resolver for {} received {}",
        expected.name(),
        value.type_name()
    ))
}

fn json_text(value: &Value) -> Result<BoundValue> {
    serde_json::to_string(&value.to_json())
        .map(BoundValue::Json)
        .map_err(|e| QuarryError::Serialization(e.to_string()))
}

/// Resolvers keyed by [`ValueKind`].
#[derive(Clone, Default)]
pub struct ValueResolverRegistry {
    resolvers: HashMap<ValueKind, Arc<dyn ValueResolver>>,
}

impl ValueResolverRegistry {
    /// An empty registry. Only NULL binds until resolvers are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a resolver for every kind.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_resolver(ValueKind::Boolean, |v: &Value| match v {
                Value::Boolean(b) => Ok(BoundValue::Bool(*b)),
                other => Err(mismatch(ValueKind::Boolean, other)),
            })
            .with_resolver(ValueKind::Integer, |v: &Value| match v {
                Value::Integer(i) => Ok(BoundValue::Int(*i)),
                other => Err(mismatch(ValueKind::Integer, other)),
            })
            .with_resolver(ValueKind::Float, |v: &Value| match v {
                Value::Float(f) => Ok(BoundValue::Double(*f)),
                other => Err(mismatch(ValueKind::Float, other)),
            })
            .with_resolver(ValueKind::String, |v: &Value| match v {
                Value::String(s) => Ok(BoundValue::Text(s.clone())),
                other => Err(mismatch(ValueKind::String, other)),
            })
            .with_resolver(ValueKind::Bytes, |v: &Value| match v {
                Value::Bytes(b) => Ok(BoundValue::Bytes(b.clone())),
                other => Err(mismatch(ValueKind::Bytes, other)),
            })
            .with_resolver(ValueKind::Timestamp, |v: &Value| match v {
                Value::Timestamp(t) => Ok(BoundValue::Timestamp(*t)),
                other => Err(mismatch(ValueKind::Timestamp, other)),
            })
            .with_resolver(ValueKind::Array, json_text)
            .with_resolver(ValueKind::Object, json_text)
    }

    pub fn register(&mut self, kind: ValueKind, resolver: impl ValueResolver + 'static) {
        self.resolvers.insert(kind, Arc::new(resolver));
    }

    pub fn with_resolver(mut self, kind: ValueKind, resolver: impl ValueResolver + 'static) -> Self {
        self.register(kind, resolver);
        self
    }

    pub fn contains(&self, kind: ValueKind) -> bool {
        kind == ValueKind::Null || self.resolvers.contains_key(&kind)
    }

    /// Resolve `value`; NULL is always typeless.
    pub fn resolve(&self, value: &Value) -> Result<BoundValue> {
        if value.is_null() {
            return Ok(BoundValue::Null);
        }
        let kind = value.kind();
        match self.resolvers.get(&kind) {
            Some(resolver) => resolver.resolve(value),
            None => Err(QuarryError::NoResolver(kind.name().to_string())),
        }
    }
}

impl fmt::Debug for ValueResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.resolvers.keys().collect();
        kinds.sort();
        f.debug_struct("ValueResolverRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

// =============================================================================
// Parameter Binder
// =============================================================================

/// Produces the bound parameters for a translated query.
pub struct ParameterBinder<'a> {
    dialect: Dialect,
    schema: &'a dyn SchemaProvider,
    registry: &'a ValueResolverRegistry,
    max_depth: usize,
}

impl<'a> ParameterBinder<'a> {
    pub fn new(dialect: Dialect, schema: &'a dyn SchemaProvider, registry: &'a ValueResolverRegistry) -> Self {
        Self {
            dialect,
            schema,
            registry,
            max_depth: QueryConfig::default().max_sub_query_depth,
        }
    }

    pub fn with_config(
        dialect: Dialect,
        schema: &'a dyn SchemaProvider,
        registry: &'a ValueResolverRegistry,
        config: &QueryConfig,
    ) -> Self {
        Self {
            max_depth: config.max_sub_query_depth,
            ..Self::new(dialect, schema, registry)
        }
    }

    /// Bind every parameter of a full statement.
    pub fn bind_query(&self, entity: &str, query: &Query) -> Result<Vec<BoundParameter>> {
        let schema = self.schema.require_entity(entity)?;
        let mut walk = self.walk();
        scope::open_root(&mut walk.scopes, &self.dialect, schema, query)?;
        walk.statement(schema, query)?;
        tracing::trace!(entity, params = walk.out.len(), "Bound parameters");
        Ok(walk.out)
    }

    /// Bind a bare filter list, matching `SqlTranslator::translate_where`.
    pub fn bind_filters(&self, entity: &str, filters: &[FilterOption]) -> Result<Vec<BoundParameter>> {
        let schema = self.schema.require_entity(entity)?;
        let mut walk = self.walk();
        walk.scopes.push_unqualified(schema)?;
        walk.filters(filters)?;
        Ok(walk.out)
    }

    fn walk(&self) -> Walk<'_> {
        Walk {
            dialect: &self.dialect,
            schema: self.schema,
            registry: self.registry,
            scopes: ScopeStack::new(self.max_depth),
            out: Vec::new(),
        }
    }
}

/// One binding pass. Mirrors the translator's clause order.
struct Walk<'s> {
    dialect: &'s Dialect,
    schema: &'s dyn SchemaProvider,
    registry: &'s ValueResolverRegistry,
    scopes: ScopeStack<'s>,
    out: Vec<BoundParameter>,
}

impl<'s> Walk<'s> {
    fn push(&mut self, slot: &str, value: &Value) -> Result<()> {
        let bound = self.registry.resolve(value)?;
        self.push_bound(slot, bound);
        Ok(())
    }

    fn push_bound(&mut self, slot: &str, value: BoundValue) {
        self.out.push(BoundParameter {
            index: self.out.len() + 1,
            slot: slot.to_string(),
            value,
        });
    }

    fn statement(&mut self, schema: &'s EntitySchema, query: &Query) -> Result<()> {
        match query {
            Query::Select(q) => self.filters(&q.filters),
            Query::Aggregate(q) => {
                self.fields(&q.select_fields)?;
                self.filters(&q.where_filters)?;
                self.filters(&q.having)
            }
            Query::Window(q) => {
                self.fields(&q.select_fields)?;
                self.filters(&q.where_filters)
            }
            Query::Update(q) => {
                for assignment in &q.updates {
                    let meta = schema.require_field(&assignment.field)?;
                    let slot = self.dialect.quote_identifier(&meta.column);
                    let operand = FilterValue::Scalar(assignment.value.clone());
                    let binding = json_path::binding_for(Some(meta), None, &operand)?;
                    if binding == ValueBinding::WholeDocument {
                        let text = meta.codec().encode(&assignment.value)?;
                        self.push_bound(&slot, BoundValue::Json(text));
                    } else {
                        self.push(&slot, &assignment.value)?;
                    }
                }
                self.filters(&q.filters)
            }
            Query::Delete(q) => self.filters(&q.filters),
        }
    }

    fn fields(&mut self, fields: &[FieldDefinition]) -> Result<()> {
        for def in fields {
            match def {
                FieldDefinition::Aggregate { expr, .. } => self.aggregate(expr)?,
                FieldDefinition::SubQuery { sub_query, .. } => self.sub_query(sub_query)?,
                FieldDefinition::Simple { .. } | FieldDefinition::Window(_) => {}
            }
        }
        Ok(())
    }

    fn aggregate(&mut self, expr: &AggregateExpr) -> Result<()> {
        expr.check()?;
        if !expr.agg_type.requires_condition() {
            return Ok(());
        }
        let (target, condition) = condition_target(self.dialect, &self.scopes, expr)?;
        self.operands(&target, condition.operator, &condition.value)
    }

    fn filters(&mut self, filters: &[FilterOption]) -> Result<()> {
        filters.iter().try_for_each(|f| self.filter(f))
    }

    fn filter(&mut self, filter: &FilterOption) -> Result<()> {
        match filter {
            FilterOption::Plain {
                field,
                operator,
                value,
            } => {
                if !predicate_reads_lhs(*operator, value) {
                    return self.operands("", *operator, value);
                }
                self.bound_filter(field, None, *operator, value)
            }
            FilterOption::JsonPath {
                field,
                json_path,
                operator,
                value,
            } => self.bound_filter(field, Some(json_path), *operator, value),
            FilterOption::AggregateComparison {
                expr,
                operator,
                value,
                alias,
            } => match having_alias(self.dialect, alias) {
                Some(alias) => {
                    let slot = self.dialect.quote_identifier(alias);
                    self.operands(&slot, *operator, value)
                }
                None => {
                    // an empty IN list renders a constant, not the aggregate
                    if predicate_reads_lhs(*operator, value) {
                        self.aggregate(expr)?;
                    } else {
                        expr.check()?;
                    }
                    let slot = alias.clone().unwrap_or_else(|| expr.label());
                    self.operands(&slot, *operator, value)
                }
            },
        }
    }

    fn bound_filter(
        &mut self,
        field: &str,
        path: Option<&str>,
        operator: Operator,
        value: &FilterValue,
    ) -> Result<()> {
        let column = self.scopes.column(self.dialect, field)?;
        let meta = self.scopes.field_meta(field);
        let binding = json_path::binding_for(meta, path, value)?;
        let slot = json_path::filter_target(self.dialect, &column, &binding, operator, value)?;
        let operand = json_path::encode_operand(&binding, meta, value)?;

        if binding == ValueBinding::WholeDocument {
            return match &operand {
                FilterValue::Scalar(Value::String(text)) => {
                    self.push_bound(&slot, BoundValue::Json(text.clone()));
                    Ok(())
                }
                FilterValue::List(items) => {
                    for item in items {
                        let text = item.as_str().unwrap_or_default().to_string();
                        self.push_bound(&slot, BoundValue::Json(text));
                    }
                    Ok(())
                }
                _ => self.operands(&slot, operator, &operand),
            };
        }
        self.operands(&slot, operator, &operand)
    }

    /// Parameters of one predicate, in placeholder order.
    fn operands(&mut self, slot: &str, operator: Operator, value: &FilterValue) -> Result<()> {
        if matches!(
            operator,
            Operator::Type | Operator::All | Operator::ElemMatch | Operator::Text
        ) {
            return Err(QuarryError::UnsupportedOperator {
                operator: operator.to_string(),
                backend: format!("sql/{}", self.dialect.name()),
            });
        }
        match (operator, value) {
            (Operator::IsNull | Operator::IsNotNull, _) => Ok(()),
            (Operator::Exists | Operator::NotExists, FilterValue::SubQuery(sq)) => self.sub_query(sq),
            (Operator::Exists | Operator::NotExists, _) => Ok(()),
            (_, FilterValue::Scalar(v)) => self.push(slot, v),
            (_, FilterValue::List(items)) => items.iter().try_for_each(|v| self.push(slot, v)),
            (_, FilterValue::Range(low, high)) => {
                self.push(slot, low)?;
                self.push(slot, high)
            }
            (_, FilterValue::SubQuery(sq)) => self.sub_query(sq),
            (_, FilterValue::Outer(_)) | (_, FilterValue::Empty) => Ok(()),
        }
    }

    fn sub_query(&mut self, sq: &SubQuery) -> Result<()> {
        let schema = self.schema;
        match &sq.from_sub_query {
            Some(inner) => {
                let alias = match inner.alias.clone() {
                    Some(alias) => alias,
                    None => self.scopes.allocate_alias("derived"),
                };
                self.scopes.push_derived(alias, scope::derived_columns(schema, inner))?;
                let result = self
                    .fields(&sq.select_fields)
                    .and_then(|_| self.sub_query(inner))
                    .and_then(|_| self.sub_query_filters(sq));
                self.scopes.pop();
                result
            }
            None => {
                let entity = schema.require_entity(&sq.entity)?;
                let alias = self.scopes.allocate_alias(&entity.table);
                self.scopes.push_aliased(Some(entity), alias)?;
                let result = self
                    .fields(&sq.select_fields)
                    .and_then(|_| self.sub_query_filters(sq));
                self.scopes.pop();
                result
            }
        }
    }

    fn sub_query_filters(&mut self, sq: &SubQuery) -> Result<()> {
        self.filters(&sq.where_filters)?;
        self.filters(&sq.having)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::*;
    use crate::metadata::{Catalog, FieldMeta};
    use crate::sql::SqlTranslator;
    use quarry_common::DataType;
    use std::collections::BTreeMap;

    fn catalog() -> Catalog {
        Catalog::new()
            .with_entity(
                EntitySchema::new("User", "users")
                    .field(FieldMeta::new("id", DataType::BigInt).primary_key())
                    .field(FieldMeta::new("name", DataType::Text))
                    .field(FieldMeta::new("age", DataType::Integer))
                    .field(FieldMeta::new("meta", DataType::Jsonb)),
            )
            .with_entity(
                EntitySchema::new("Order", "orders")
                    .field(FieldMeta::new("id", DataType::BigInt).primary_key())
                    .field(FieldMeta::new("userId", DataType::BigInt).with_column("user_id"))
                    .field(FieldMeta::new("total", DataType::Double)),
            )
    }

    fn bind(dialect: Dialect, query: &Query) -> Vec<BoundParameter> {
        let catalog = catalog();
        let registry = ValueResolverRegistry::with_defaults();
        ParameterBinder::new(dialect, &catalog, &registry)
            .bind_query("User", query)
            .unwrap()
    }

    #[test]
    fn test_json_slot_matches_translated_lhs() {
        let catalog = catalog();
        for dialect in [Dialect::POSTGRES, Dialect::MYSQL, Dialect::SQLITE] {
            let q = select()
                .where_json("meta", "$.plan")
                .eq("pro")
                .where_json("meta", "$.seats")
                .gt(3)
                .build()
                .unwrap();
            let stmt = SqlTranslator::new(dialect, &catalog).translate("User", &q).unwrap();
            let params = bind(dialect, &q);
            assert_eq!(params.len(), stmt.param_count());
            for p in &params {
                assert!(
                    stmt.sql.contains(&format!("{} ", p.slot)),
                    "slot {} missing from {}",
                    p.slot,
                    stmt.sql
                );
            }
            assert_eq!(params[0].value, BoundValue::Text("pro".into()));
            assert_eq!(params[1].value, BoundValue::Int(3));
        }
    }

    #[test]
    fn test_having_empty_in_list_binds_no_condition() {
        let having = |items: Vec<Value>| {
            let expr = AggregateExpr::conditional("name", AggregationType::CountIf, Condition::eq("a")).unwrap();
            Query::Aggregate(AggregateQuery {
                select_fields: vec![FieldDefinition::simple("name")],
                from_table: None,
                where_filters: Vec::new(),
                group_by: vec!["name".to_string()],
                having: vec![
                    FilterOption::aggregate_comparison(expr, Operator::In, FilterValue::List(items), None).unwrap(),
                ],
                order_by: Vec::new(),
                limit: Limit::Unbounded,
            })
        };

        let catalog = catalog();
        for dialect in [Dialect::POSTGRES, Dialect::MYSQL, Dialect::SQLITE, Dialect::H2] {
            let empty = having(Vec::new());
            let stmt = SqlTranslator::new(dialect, &catalog).translate("User", &empty).unwrap();
            assert!(stmt.sql.ends_with("HAVING 1 = 0"), "{}", stmt.sql);
            assert_eq!(stmt.param_count(), 0);
            assert!(bind(dialect, &empty).is_empty());

            let listed = having(vec![Value::from(1), Value::from(2)]);
            let stmt = SqlTranslator::new(dialect, &catalog).translate("User", &listed).unwrap();
            let params = bind(dialect, &listed);
            assert_eq!(params.len(), 3);
            assert_eq!(params.len(), stmt.param_count());
            assert_eq!(params[0].value, BoundValue::Text("a".into()));
        }
    }

    #[test]
    fn test_in_list_binds_each_element() {
        let q = select()
            .where_("name")
            .in_list(["a", "b", "c"])
            .where_("age")
            .between(18, 65)
            .where_("id")
            .in_list(Vec::<i64>::new())
            .build()
            .unwrap();
        let params = bind(Dialect::POSTGRES, &q);
        assert_eq!(params.len(), 5);
        assert_eq!(params.iter().map(|p| p.index).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert!(params[..3].iter().all(|p| p.slot == "\"name\""));
        assert_eq!(params[4].value, BoundValue::Int(65));
    }

    #[test]
    fn test_null_is_typeless() {
        let registry = ValueResolverRegistry::new();
        assert_eq!(registry.resolve(&Value::Null).unwrap(), BoundValue::Null);
        let err = registry.resolve(&Value::from(1)).unwrap_err();
        assert!(matches!(err, QuarryError::NoResolver(_)));
    }

    #[test]
    fn test_custom_resolver() {
        let registry = ValueResolverRegistry::with_defaults().with_resolver(
            ValueKind::Boolean,
            |v: &Value| Ok(BoundValue::Int(i64::from(v.as_bool().unwrap_or(false)))),
        );
        assert_eq!(registry.resolve(&Value::Boolean(true)).unwrap(), BoundValue::Int(1));
    }

    #[test]
    fn test_whole_document_binds_codec_text() {
        let mut doc = BTreeMap::new();
        doc.insert("plan".to_string(), Value::from("pro"));
        let q = select().where_("meta").eq(Value::Object(doc)).build().unwrap();
        let params = bind(Dialect::POSTGRES, &q);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].slot, "\"meta\"");
        assert_eq!(params[0].value, BoundValue::Json("{\"plan\":\"pro\"}".into()));
    }

    #[test]
    fn test_sub_query_order_matches_placeholders() {
        let catalog = catalog();
        let q = select()
            .where_("name")
            .like("a%")
            .where_("id")
            .in_sub_query(sub_query("Order").select_field("userId").where_("total").gt(100.5))
            .where_("age")
            .lt(40)
            .build()
            .unwrap();
        let stmt = SqlTranslator::new(Dialect::POSTGRES, &catalog)
            .translate("User", &q)
            .unwrap();
        let params = bind(Dialect::POSTGRES, &q);
        assert_eq!(params.len(), stmt.param_count());
        assert_eq!(params[1].slot, "o.\"total\"");
        assert_eq!(params[1].value, BoundValue::Double(100.5));
        assert_eq!(params[2].slot, "u.\"age\"");
    }

    #[test]
    fn test_having_slots() {
        let q = aggregate()
            .select(field("name").into_definition())
            .select(field("age").count_if(crate::ast::Condition::gt(30)).as_("senior"))
            .group_by("name")
            .having()
            .field("age")
            .count()
            .gt(2)
            .end()
            .build()
            .unwrap();
        let params = bind(Dialect::MYSQL, &q);
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].slot, "`age`");
        assert_eq!(params[1].slot, "COUNT(age)");
    }

    #[test]
    fn test_update_assignments_first() {
        let q = update()
            .set("name", "bob")
            .where_("id")
            .eq(7)
            .build()
            .unwrap();
        let params = bind(Dialect::SQLITE, &q);
        assert_eq!(params[0].slot, "\"name\"");
        assert_eq!(params[0].value, BoundValue::Text("bob".into()));
        assert_eq!(params[1].value, BoundValue::Int(7));
    }
}

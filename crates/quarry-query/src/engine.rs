//! Quarry Engine - Query Execution Facade
//!
//! Ties validation, translation, binding and in-memory evaluation together
//! behind one entry point configured by [`QueryConfig`].
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::ast::Query;
use crate::binder::{BoundParameter, ParameterBinder, ValueResolverRegistry};
use crate::dialect::Dialect;
use crate::evaluator::{AdapterRegistry, Entity, EntityAdapter, EvaluationResult, InMemoryEvaluator};
use crate::metadata::SchemaProvider;
use crate::sql::{ParameterMode, SqlStatement, SqlTranslator};
use crate::validation::{Enforcement, QueryValidator, ValidationResult};
use quarry_common::{QuarryError, QueryConfig, Result};
use std::sync::Arc;

// =============================================================================
// Prepared Statement
// =============================================================================

/// Outcome of preparing a query for a relational backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Prepared {
    /// Nothing to run; the answer is an empty result.
    Empty,
    Statement {
        statement: SqlStatement,
        bindings: Vec<BoundParameter>,
    },
}

impl Prepared {
    pub fn is_empty(&self) -> bool {
        matches!(self, Prepared::Empty)
    }

    pub fn statement(&self) -> Option<&SqlStatement> {
        match self {
            Prepared::Empty => None,
            Prepared::Statement { statement, .. } => Some(statement),
        }
    }

    pub fn bindings(&self) -> &[BoundParameter] {
        match self {
            Prepared::Empty => &[],
            Prepared::Statement { bindings, .. } => bindings,
        }
    }
}

// =============================================================================
// Query Engine
// =============================================================================

/// Entry point for running queries against any backend.
pub struct QueryEngine {
    config: QueryConfig,
    schema: Arc<dyn SchemaProvider>,
    resolvers: ValueResolverRegistry,
    adapters: AdapterRegistry,
}

impl QueryEngine {
    pub fn new(schema: Arc<dyn SchemaProvider>) -> Self {
        Self::with_config(schema, QueryConfig::default())
    }

    pub fn with_config(schema: Arc<dyn SchemaProvider>, config: QueryConfig) -> Self {
        Self {
            config,
            schema,
            resolvers: ValueResolverRegistry::with_defaults(),
            adapters: AdapterRegistry::new(),
        }
    }

    pub fn with_resolvers(mut self, resolvers: ValueResolverRegistry) -> Self {
        self.resolvers = resolvers;
        self
    }

    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    /// Register the adapter sub-queries over `entity` load rows from.
    pub fn register_adapter(&mut self, entity: impl Into<String>, adapter: impl EntityAdapter + 'static) {
        self.adapters.register(entity, adapter);
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn schema(&self) -> &dyn SchemaProvider {
        self.schema.as_ref()
    }

    pub fn validate(&self, entity: &str, query: &Query) -> ValidationResult {
        QueryValidator::new(self.schema.as_ref()).validate(entity, query)
    }

    // -------------------------------------------------------------------------
    // Relational
    // -------------------------------------------------------------------------

    /// Prepare `query` for the configured default dialect.
    pub fn prepare_sql(&self, entity: &str, query: &Query) -> Result<Prepared> {
        self.prepare_sql_for(Dialect::of(self.config.default_dialect), entity, query)
    }

    /// Validate, translate and bind `query` for `dialect`.
    pub fn prepare_sql_for(&self, dialect: Dialect, entity: &str, query: &Query) -> Result<Prepared> {
        if !self.admit(entity, query)? {
            return Ok(Prepared::Empty);
        }

        let statement = SqlTranslator::with_config(dialect, self.schema.as_ref(), &self.config).translate(entity, query)?;
        let bindings = ParameterBinder::with_config(dialect, self.schema.as_ref(), &self.resolvers, &self.config)
            .bind_query(entity, query)?;
        if bindings.len() != statement.param_count() {
            return Err(QuarryError::Internal(format!(
                "{} placeholders but {} bound parameters",
                statement.param_count(),
                bindings.len()
            )));
        }
        Ok(Prepared::Statement { statement, bindings })
    }

    /// SQL with literals inlined, for diagnostics only.
    pub fn explain(&self, entity: &str, query: &Query) -> Result<String> {
        let dialect = Dialect::of(self.config.default_dialect);
        let statement = SqlTranslator::with_config(dialect, self.schema.as_ref(), &self.config)
            .with_mode(ParameterMode::Inline)
            .translate(entity, query)?;
        Ok(statement.sql)
    }

    // -------------------------------------------------------------------------
    // In-Memory
    // -------------------------------------------------------------------------

    /// Validate and evaluate `query` over `items` without a database.
    pub fn evaluate<E: Entity + Clone>(&self, entity: &str, query: &Query, items: &[E]) -> Result<EvaluationResult<E>> {
        if !self.admit(entity, query)? {
            return Ok(EvaluationResult::empty(query));
        }
        InMemoryEvaluator::with_config(self.schema.as_ref(), &self.adapters, &self.config).evaluate(entity, query, items)
    }

    /// Shared gate: validation policy first, then the zero-limit short circuit.
    fn admit(&self, entity: &str, query: &Query) -> Result<bool> {
        if self.validate(entity, query).enforce(self.config.validation_policy)? == Enforcement::Empty {
            return Ok(false);
        }
        if query.is_empty_result() {
            tracing::debug!(entity, kind = query.kind_name(), "Limit 0, skipping execution");
            return Ok(false);
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
    use crate::evaluator::Record;
    use crate::metadata::{Catalog, EntitySchema, FieldMeta};
    use quarry_common::{DataType, DialectKind, Value, ValidationPolicy};

    fn catalog() -> Arc<dyn SchemaProvider> {
        Arc::new(
            Catalog::new().with_entity(
                EntitySchema::new("User", "users")
                    .field(FieldMeta::new("id", DataType::BigInt).primary_key())
                    .field(FieldMeta::new("name", DataType::Text))
                    .field(FieldMeta::new("age", DataType::Integer)),
            ),
        )
    }

    fn users() -> Vec<Record> {
        vec![
            Record::new().with("id", 1).with("name", "ann").with("age", 31),
            Record::new().with("id", 2).with("name", "bob").with("age", 17),
        ]
    }

    #[test]
    fn test_prepare_translates_and_binds() {
        let engine = QueryEngine::new(catalog());
        let q = select().where_("age").gte(18).where_("name").in_list(["ann", "cy"]).build().unwrap();
        let prepared = engine.prepare_sql("User", &q).unwrap();
        let statement = prepared.statement().unwrap();
        assert_eq!(
            statement.sql,
            r#"SELECT * FROM "users" WHERE "age" >= $1 AND "name" IN ($2, $3)"#
        );
        assert_eq!(prepared.bindings().len(), 3);
        assert_eq!(prepared.bindings()[0].slot, r#""age""#);
    }

    #[test]
    fn test_prepare_having_with_empty_in_list() {
        use crate::ast::{AggregateExpr, AggregationType, Condition, FilterOption, FilterValue, Operator, Query};

        let engine = QueryEngine::new(catalog());
        let expr = AggregateExpr::conditional("name", AggregationType::CountIf, Condition::eq("ann")).unwrap();
        let q = aggregate().select_field("age").group_by("age").build().unwrap();
        let Query::Aggregate(mut agg) = q else {
            panic!("aggregate builder produced {:?}", q);
        };
        agg.having
            .push(FilterOption::aggregate_comparison(expr, Operator::In, FilterValue::List(Vec::new()), None).unwrap());

        let prepared = engine.prepare_sql("User", &Query::Aggregate(agg)).unwrap();
        assert_eq!(
            prepared.statement().unwrap().sql,
            r#"SELECT "age" FROM "users" GROUP BY "age" HAVING 1 = 0"#
        );
        assert!(prepared.bindings().is_empty());
    }

    #[test]
    fn test_zero_limit_skips_translation() {
        let engine = QueryEngine::new(catalog());
        let q = select().where_("age").gt(1).limit(0).build().unwrap();
        assert_eq!(engine.prepare_sql("User", &q).unwrap(), Prepared::Empty);
        let rows = engine.evaluate("User", &q, &users()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_validation_policy() {
        let q = select().where_("shoe_size").eq(9).build().unwrap();

        let strict = QueryEngine::new(catalog());
        assert!(matches!(
            strict.prepare_sql("User", &q),
            Err(QuarryError::Validation(_))
        ));

        let lenient = QueryEngine::with_config(catalog(), QueryConfig::lenient());
        assert_eq!(lenient.config().validation_policy, ValidationPolicy::WarnAndEmpty);
        assert!(lenient.prepare_sql("User", &q).unwrap().is_empty());
        assert!(lenient.evaluate("User", &q, &users()).unwrap().is_empty());
    }

    #[test]
    fn test_default_dialect_and_explain() {
        let engine = QueryEngine::with_config(catalog(), QueryConfig::default().with_dialect(DialectKind::MySql));
        let q = select().where_("name").eq("o'neil").build().unwrap();
        let prepared = engine.prepare_sql("User", &q).unwrap();
        assert_eq!(prepared.statement().unwrap().sql, "SELECT * FROM `users` WHERE `name` = ?");
        assert_eq!(
            engine.explain("User", &q).unwrap(),
            "SELECT * FROM `users` WHERE `name` = 'o''neil'"
        );
    }

    #[test]
    fn test_evaluate_in_memory() {
        let engine = QueryEngine::new(catalog());
        let q = select().where_("age").gte(18).build().unwrap();
        let adults = engine.evaluate("User", &q, &users()).unwrap().into_entities().unwrap();
        assert_eq!(adults.len(), 1);
        assert_eq!(adults[0].value("name"), Some(&Value::from("ann")));
    }
}

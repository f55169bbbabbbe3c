//! Quarry Query - Query Model and Execution Strategies
//!
//! Backend-agnostic query model with three ways of running it: parameterized
//! SQL for relational dialects, and direct evaluation over in-process
//! entities. Document stores consume the same model through quarry-document.
//!
//! Key Features:
//! - Immutable AST built through a fluent, injection-safe DSL
//! - SQL translation for Postgres, MySQL, SQLite and H2
//! - Aggregation, window functions, correlated and derived sub-queries
//! - Parameter binding through a pluggable value-resolver registry
//! - Schema-aware validation with an explicit failure policy
//! - In-memory evaluation with matching semantics
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod ast;
pub mod binder;
pub mod builder;
pub mod dialect;
pub mod engine;
pub mod evaluator;
pub mod json_path;
pub mod metadata;
pub mod sql;
pub mod validation;

pub use ast::*;
pub use binder::{BoundParameter, BoundValue, ParameterBinder, ValueResolver, ValueResolverRegistry};
pub use dialect::{Dialect, PlaceholderStyle};
pub use engine::{Prepared, QueryEngine};
pub use evaluator::{
    compare_values, AdapterRegistry, Entity, EntityAdapter, EvaluationResult, InMemoryEvaluator, Record, ResultRow,
};
pub use json_path::ValueBinding;
pub use metadata::{Catalog, EntitySchema, FieldCodec, FieldMeta, JsonCodec, SchemaProvider};
pub use sql::{render_literal, ParameterMode, SqlStatement, SqlTranslator};
pub use validation::{Enforcement, QueryValidator, ValidationResult};

/// Everything needed to build and run queries.
pub mod prelude {
    pub use crate::ast::{
        AggregationType, Condition, FieldDefinition, FilterOption, FilterValue, FrameBound, Limit, Operator, Query,
        SortOption, SortOrder, WindowFunction,
    };
    pub use crate::builder::*;
    pub use crate::dialect::Dialect;
    pub use crate::engine::{Prepared, QueryEngine};
    pub use crate::evaluator::{AdapterRegistry, Entity, Record, ResultRow};
    pub use crate::metadata::{Catalog, EntitySchema, FieldMeta, SchemaProvider};
    pub use quarry_common::{DataType, DialectKind, QuarryError, QueryConfig, Result, Value};
}

//! Quarry Validation - Pre-Execution Query Checks
//!
//! Checks a built query against the schema before any backend sees it:
//! unknown fields, JSON paths on plain columns, grouped selects naming
//! ungrouped fields, malformed aggregates and windows. Failures are
//! collected rather than raised; a [`ValidationPolicy`] decides what a
//! failed result means.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::ast::*;
use crate::metadata::{EntitySchema, SchemaProvider};
use quarry_common::{QuarryError, Result, ValidationPolicy};
use serde::{Deserialize, Serialize};

// =============================================================================
// Validation Result
// =============================================================================

/// Outcome of validating one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// First error joined with the rest, for messages.
    pub fn reason(&self) -> String {
        self.errors.join("; ")
    }

    /// Apply `policy` to this result.
    pub fn enforce(&self, policy: ValidationPolicy) -> Result<Enforcement> {
        if self.is_valid {
            return Ok(Enforcement::Proceed);
        }
        match policy {
            ValidationPolicy::FailClosed => Err(QuarryError::Validation(self.reason())),
            ValidationPolicy::WarnAndEmpty => {
                tracing::warn!(
                    errors = self.errors.len(),
                    reason = %self.reason(),
                    "Query failed validation, returning empty result"
                );
                Ok(Enforcement::Empty)
            }
        }
    }
}

/// What the caller does after enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enforcement {
    Proceed,
    /// Skip execution and answer with no rows.
    Empty,
}

// =============================================================================
// Query Validator
// =============================================================================

/// Schema-aware query validator.
pub struct QueryValidator<'a> {
    schema: &'a dyn SchemaProvider,
}

impl<'a> QueryValidator<'a> {
    pub fn new(schema: &'a dyn SchemaProvider) -> Self {
        Self { schema }
    }

    pub fn validate(&self, entity: &str, query: &Query) -> ValidationResult {
        let mut errors = Vec::new();
        match self.schema.entity(entity) {
            Some(schema) => Checker {
                provider: self.schema,
                errors: &mut errors,
            }
            .query(schema, query),
            None => errors.push(format!("Unknown entity: {}", entity)),
        }
        ValidationResult::from_errors(errors)
    }
}

struct Checker<'a, 'e> {
    provider: &'a dyn SchemaProvider,
    errors: &'e mut Vec<String>,
}

impl Checker<'_, '_> {
    fn error(&mut self, message: String) {
        self.errors.push(message);
    }

    fn check(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.error(e.to_string());
        }
    }

    /// `None` scope means a derived table; its columns are not checked.
    fn field(&mut self, scope: Option<&EntitySchema>, field: &str) {
        if let Some(entity) = scope {
            if entity.get_field(field).is_none() {
                self.error(format!("Unknown field: {}.{}", entity.name, field));
            }
        }
    }

    fn query(&mut self, schema: &EntitySchema, query: &Query) {
        let scope = Some(schema);
        match query {
            Query::Select(q) => {
                for column in &q.columns {
                    self.field(scope, column);
                }
                self.filters(scope, &q.filters);
                for sort in &q.sort {
                    self.field(scope, &sort.field);
                }
                if let Some(join) = &q.join_hint {
                    self.field(scope, &join.local_field);
                    let provider = self.provider;
                    match provider.entity(&join.entity) {
                        Some(joined) => self.field(Some(joined), &join.foreign_field),
                        None => self.error(format!("Unknown entity: {}", join.entity)),
                    }
                }
            }
            Query::Aggregate(q) => {
                if q.select_fields.is_empty() {
                    self.error("Aggregate query selects no fields".to_string());
                }
                self.definitions(scope, &q.select_fields);
                self.grouping(&q.select_fields, &q.group_by);
                self.filters(scope, &q.where_filters);
                for field in &q.group_by {
                    self.field(scope, field);
                }
                self.having(scope, &q.select_fields, &q.having);
                self.order(scope, &q.select_fields, &q.order_by);
            }
            Query::Window(q) => {
                if q.select_fields.is_empty() {
                    self.error("Window query selects no fields".to_string());
                }
                self.definitions(scope, &q.select_fields);
                self.filters(scope, &q.where_filters);
                self.order(scope, &q.select_fields, &q.order_by);
            }
            Query::Update(q) => {
                if q.updates.is_empty() {
                    self.error("Update assigns no fields".to_string());
                }
                for assignment in &q.updates {
                    match schema.get_field(&assignment.field) {
                        Some(meta) if meta.primary_key => self.error(format!(
                            "Cannot assign primary key: {}.{}",
                            schema.name, assignment.field
                        )),
                        Some(meta) if !meta.nullable && assignment.value.is_null() => self.error(
                            format!("Null assigned to non-null field: {}.{}", schema.name, assignment.field),
                        ),
                        Some(_) => {}
                        None => self.field(scope, &assignment.field),
                    }
                }
                self.filters(scope, &q.filters);
            }
            Query::Delete(q) => self.filters(scope, &q.filters),
        }
    }

    fn filters(&mut self, scope: Option<&EntitySchema>, filters: &[FilterOption]) {
        for filter in filters {
            self.filter(scope, filter);
        }
    }

    fn filter(&mut self, scope: Option<&EntitySchema>, filter: &FilterOption) {
        self.check(check_operand(filter.operator(), filter.value()));
        match filter {
            FilterOption::Plain { field, .. } => {
                if !filter.is_sub_query_existence() {
                    self.field(scope, field);
                }
            }
            FilterOption::JsonPath { field, .. } => {
                self.field(scope, field);
                if let Some(meta) = scope.and_then(|e| e.get_field(field)) {
                    if !meta.is_json() {
                        self.error(format!("JSON path on non-JSON field: {}", field));
                    }
                }
            }
            FilterOption::AggregateComparison { expr, .. } => self.aggregate(scope, expr),
        }
        self.value(filter.value());
    }

    fn value(&mut self, value: &FilterValue) {
        if let FilterValue::SubQuery(sq) = value {
            self.sub_query(sq);
        }
    }

    fn sub_query(&mut self, sq: &SubQuery) {
        let provider = self.provider;
        let scope = match &sq.from_sub_query {
            Some(inner) => {
                self.sub_query(inner);
                None
            }
            None => match provider.entity(&sq.entity) {
                Some(entity) => Some(entity),
                None => {
                    self.error(format!("Unknown entity: {}", sq.entity));
                    return;
                }
            },
        };
        self.definitions(scope, &sq.select_fields);
        if sq.is_grouped() {
            self.grouping(&sq.select_fields, &sq.group_by);
        }
        self.filters(scope, &sq.where_filters);
        for field in &sq.group_by {
            self.field(scope, field);
        }
        self.having(scope, &sq.select_fields, &sq.having);
        self.order(scope, &sq.select_fields, &sq.order_by);
    }

    fn definitions(&mut self, scope: Option<&EntitySchema>, fields: &[FieldDefinition]) {
        for def in fields {
            match def {
                FieldDefinition::Simple { field, .. } => self.field(scope, field),
                FieldDefinition::Aggregate { expr, .. } => self.aggregate(scope, expr),
                FieldDefinition::Window(window) => {
                    self.check(window.check());
                    if let Some(field) = &window.field {
                        self.field(scope, field);
                    }
                    for field in &window.partition_by {
                        self.field(scope, field);
                    }
                    for sort in &window.order_by {
                        self.field(scope, &sort.field);
                    }
                }
                FieldDefinition::SubQuery { sub_query, .. } => self.sub_query(sub_query),
            }
        }
    }

    fn aggregate(&mut self, scope: Option<&EntitySchema>, expr: &AggregateExpr) {
        self.check(expr.check());
        if expr.field != "*" {
            self.field(scope, &expr.field);
        }
        if let Some(key) = &expr.key_field {
            self.field(scope, key);
        }
        if let Some(condition) = &expr.condition {
            if let Some(field) = &condition.field {
                self.field(scope, field);
            }
            self.check(check_operand(condition.operator, &condition.value));
            self.value(&condition.value);
        }
    }

    /// Plain select fields of a grouped query must be grouped.
    fn grouping(&mut self, fields: &[FieldDefinition], group_by: &[String]) {
        if group_by.is_empty() {
            return;
        }
        for def in fields {
            if let FieldDefinition::Simple { field, .. } = def {
                if !group_by.contains(field) {
                    self.error(format!("Field {} is neither grouped nor aggregated", field));
                }
            }
        }
    }

    fn having(&mut self, scope: Option<&EntitySchema>, outputs: &[FieldDefinition], having: &[FilterOption]) {
        for filter in having {
            match filter {
                FilterOption::AggregateComparison {
                    alias: Some(alias), ..
                } if !outputs.iter().any(|d| d.output_name() == alias) => {
                    self.error(format!("HAVING references unknown alias: {}", alias));
                }
                _ => {}
            }
            self.filter(scope, filter);
        }
    }

    fn order(&mut self, scope: Option<&EntitySchema>, outputs: &[FieldDefinition], sort: &[SortOption]) {
        for option in sort {
            if !outputs.iter().any(|d| d.output_name() == option.field) {
                self.field(scope, &option.field);
            }
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
    use crate::metadata::{Catalog, FieldMeta};
    use quarry_common::DataType;

    fn catalog() -> Catalog {
        Catalog::new().with_entity(
            EntitySchema::new("Employee", "employees")
                .field(FieldMeta::new("id", DataType::BigInt).primary_key())
                .field(FieldMeta::new("dept", DataType::Text))
                .field(FieldMeta::new("sal", DataType::Integer))
                .field(FieldMeta::new("profile", DataType::Json)),
        )
    }

    #[test]
    fn test_valid_aggregate() {
        let catalog = catalog();
        let q = aggregate()
            .select(field("dept").into_definition())
            .select(field("sal").sum().as_("total"))
            .group_by("dept")
            .order_by_desc("total")
            .build()
            .unwrap();
        let result = QueryValidator::new(&catalog).validate("Employee", &q);
        assert!(result.is_valid, "{:?}", result.errors);
    }

    #[test]
    fn test_collects_every_error() {
        let catalog = catalog();
        let q = aggregate()
            .select(field("dept").into_definition())
            .select(field("salary").sum().as_("total"))
            .select(field("sal").as_("raw"))
            .group_by("dept")
            .build()
            .unwrap();
        let result = QueryValidator::new(&catalog).validate("Employee", &q);
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].contains("salary"));
        assert!(result.errors[1].contains("neither grouped"));
    }

    #[test]
    fn test_json_path_on_plain_column() {
        let catalog = catalog();
        let q = select().where_json("dept", "$.code").eq("x").build().unwrap();
        let result = QueryValidator::new(&catalog).validate("Employee", &q);
        assert!(!result.is_valid);
        assert!(result.reason().contains("non-JSON"));
    }

    #[test]
    fn test_unknown_entity() {
        let catalog = catalog();
        let q = delete().build().unwrap();
        let result = QueryValidator::new(&catalog).validate("Ghost", &q);
        assert_eq!(result.errors, vec!["Unknown entity: Ghost".to_string()]);
    }

    #[test]
    fn test_primary_key_assignment_rejected() {
        let catalog = catalog();
        let q = update().set("id", 5).build().unwrap();
        let result = QueryValidator::new(&catalog).validate("Employee", &q);
        assert!(!result.is_valid);
    }

    #[test]
    fn test_policy_enforcement() {
        let failed = ValidationResult::from_errors(vec!["bad".to_string()]);
        let err = failed.enforce(ValidationPolicy::FailClosed).unwrap_err();
        assert!(matches!(err, QuarryError::Validation(ref r) if r == "bad"));
        assert_eq!(
            failed.enforce(ValidationPolicy::WarnAndEmpty).unwrap(),
            Enforcement::Empty
        );
        let passed = ValidationResult::from_errors(Vec::new());
        assert_eq!(
            passed.enforce(ValidationPolicy::FailClosed).unwrap(),
            Enforcement::Proceed
        );
    }
}

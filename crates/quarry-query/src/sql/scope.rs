//! Quarry SQL Scope - Table Aliases and Column Resolution
//!
//! Stack of active table scopes. The translator and the parameter binder
//! both walk queries through this stack so that column references (and
//! therefore JSON filter slot names) resolve identically on both sides.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::ast::{FieldDefinition, FilterOption, FilterValue, Query, SubQuery};
use crate::dialect::Dialect;
use crate::metadata::{EntitySchema, FieldMeta, SchemaProvider};
use quarry_common::{QuarryError, Result};

// =============================================================================
// Scope
// =============================================================================

/// One table in the current FROM chain.
#[derive(Debug, Clone)]
pub(crate) struct Scope<'s> {
    pub entity: Option<&'s EntitySchema>,
    /// Raw alias, for collision checks.
    pub alias: Option<String>,
    /// Rendered qualifier prefixed to columns.
    pub qualifier: Option<String>,
    /// Field to column names exposed by a derived table.
    pub derived_columns: Vec<(String, String)>,
}

impl<'s> Scope<'s> {
    pub fn column(&self, dialect: &Dialect, field: &str) -> Result<String> {
        let column = match self.entity {
            Some(entity) => entity.require_field(field)?.column.as_str(),
            None => self
                .derived_columns
                .iter()
                .find(|(name, _)| name == field)
                .map(|(_, column)| column.as_str())
                .unwrap_or(field),
        };
        let quoted = dialect.quote_identifier(column);
        Ok(match &self.qualifier {
            Some(q) => format!("{}.{}", q, quoted),
            None => quoted,
        })
    }

    pub fn field_meta(&self, field: &str) -> Option<&'s FieldMeta> {
        self.entity.and_then(|e| e.get_field(field))
    }

    /// `u.*`, or `*` when unqualified.
    pub fn star(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}.*", q),
            None => "*".to_string(),
        }
    }
}

// =============================================================================
// Scope Stack
// =============================================================================

#[derive(Debug, Clone)]
pub(crate) struct ScopeStack<'s> {
    scopes: Vec<Scope<'s>>,
    max_depth: usize,
}

impl<'s> ScopeStack<'s> {
    pub fn new(max_depth: usize) -> Self {
        Self {
            scopes: Vec::new(),
            max_depth,
        }
    }

    /// Number of sub-query levels below the root.
    pub fn nesting(&self) -> usize {
        self.scopes.len().saturating_sub(1)
    }

    fn check_depth(&self) -> Result<()> {
        if self.scopes.len() > self.max_depth {
            return Err(QuarryError::SubQueryDepthExceeded(self.max_depth));
        }
        Ok(())
    }

    /// Alias derived from the first letter of the table, suffixed with the
    /// nesting depth when an enclosing scope already uses it.
    pub fn allocate_alias(&self, table: &str) -> String {
        let base = table
            .chars()
            .find(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or('t');
        let taken = |candidate: &str| {
            self.scopes
                .iter()
                .any(|s| s.alias.as_deref() == Some(candidate))
        };
        let mut candidate = base.to_string();
        let mut suffix = self.scopes.len();
        while taken(&candidate) {
            candidate = format!("{}{}", base, suffix);
            suffix += 1;
        }
        candidate
    }

    pub fn push_unqualified(&mut self, entity: &'s EntitySchema) -> Result<()> {
        self.check_depth()?;
        self.scopes.push(Scope {
            entity: Some(entity),
            alias: None,
            qualifier: None,
            derived_columns: Vec::new(),
        });
        Ok(())
    }

    /// Columns are qualified by the quoted table name.
    pub fn push_table_qualified(&mut self, dialect: &Dialect, entity: &'s EntitySchema) -> Result<()> {
        self.check_depth()?;
        self.scopes.push(Scope {
            entity: Some(entity),
            alias: None,
            qualifier: Some(dialect.quote_identifier(&entity.table)),
            derived_columns: Vec::new(),
        });
        Ok(())
    }

    /// Push an aliased scope and return the alias.
    pub fn push_aliased(&mut self, entity: Option<&'s EntitySchema>, alias: String) -> Result<String> {
        self.check_depth()?;
        self.scopes.push(Scope {
            entity,
            alias: Some(alias.clone()),
            qualifier: Some(alias.clone()),
            derived_columns: Vec::new(),
        });
        Ok(alias)
    }

    /// Push a derived-table scope exposing `columns`.
    pub fn push_derived(&mut self, alias: String, columns: Vec<(String, String)>) -> Result<()> {
        self.check_depth()?;
        self.scopes.push(Scope {
            entity: None,
            alias: Some(alias.clone()),
            qualifier: Some(alias),
            derived_columns: columns,
        });
        Ok(())
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn current(&self) -> Result<&Scope<'s>> {
        self.scopes
            .last()
            .ok_or_else(|| QuarryError::Internal("no active scope".to_string()))
    }

    pub fn column(&self, dialect: &Dialect, field: &str) -> Result<String> {
        self.current()?.column(dialect, field)
    }

    pub fn field_meta(&self, field: &str) -> Option<&'s FieldMeta> {
        self.scopes.last().and_then(|s| s.field_meta(field))
    }

    /// Resolve an outer field reference against the enclosing scope.
    pub fn outer_column(&self, dialect: &Dialect, field: &str) -> Result<String> {
        match self.scopes.len() {
            0 | 1 => Err(QuarryError::InvalidQuery(format!(
                "outer reference '{}' outside a sub-query",
                field
            ))),
            n => self.scopes[n - 2].column(dialect, field),
        }
    }
}

/// Output columns of a sub-query used as a derived table, keyed by the
/// field names outer filters use.
pub(crate) fn derived_columns(schema: &dyn SchemaProvider, inner: &SubQuery) -> Vec<(String, String)> {
    let entity = match inner.from_sub_query {
        Some(_) => None,
        None => schema.entity(&inner.entity),
    };
    inner
        .select_fields
        .iter()
        .map(|def| match def {
            FieldDefinition::Simple { field, alias: None } => {
                let column = entity
                    .and_then(|e| e.get_field(field))
                    .map(|m| m.column.clone())
                    .unwrap_or_else(|| field.clone());
                (field.clone(), column)
            }
            other => (other.output_name().to_string(), other.output_name().to_string()),
        })
        .collect()
}

// =============================================================================
// Root Scope
// =============================================================================

fn value_nests(value: &FilterValue) -> bool {
    matches!(value, FilterValue::SubQuery(_) | FilterValue::Outer(_))
}

fn filters_nest(filters: &[FilterOption]) -> bool {
    filters.iter().any(|f| {
        value_nests(f.value())
            || matches!(f, FilterOption::AggregateComparison { expr, .. }
                if expr.condition.as_ref().map(|c| value_nests(&c.value)).unwrap_or(false))
    })
}

fn fields_nest(fields: &[FieldDefinition]) -> bool {
    fields.iter().any(|f| match f {
        FieldDefinition::SubQuery { .. } => true,
        FieldDefinition::Aggregate { expr, .. } => {
            expr.condition.as_ref().map(|c| value_nests(&c.value)).unwrap_or(false)
        }
        _ => false,
    })
}

/// True if the top-level table must be qualified for nested references.
pub(crate) fn query_nests(query: &Query) -> bool {
    match query {
        Query::Select(q) => q.join_hint.is_some() || filters_nest(&q.filters),
        Query::Aggregate(q) => {
            fields_nest(&q.select_fields) || filters_nest(&q.where_filters) || filters_nest(&q.having)
        }
        Query::Window(q) => fields_nest(&q.select_fields) || filters_nest(&q.where_filters),
        Query::Update(q) => filters_nest(&q.filters),
        Query::Delete(q) => filters_nest(&q.filters),
    }
}

/// Table the top-level query reads.
pub(crate) fn root_table<'q>(entity: &'q EntitySchema, query: &'q Query) -> &'q str {
    let from = match query {
        Query::Aggregate(q) => q.from_table.as_deref(),
        Query::Window(q) => q.from_table.as_deref(),
        _ => None,
    };
    from.unwrap_or(&entity.table)
}

/// Open the root scope for `query`. Returns the alias, if one was chosen.
pub(crate) fn open_root<'s>(
    scopes: &mut ScopeStack<'s>,
    dialect: &Dialect,
    entity: &'s EntitySchema,
    query: &Query,
) -> Result<Option<String>> {
    if !query_nests(query) {
        scopes.push_unqualified(entity)?;
        return Ok(None);
    }
    match query {
        Query::Update(_) | Query::Delete(_) => {
            scopes.push_table_qualified(dialect, entity)?;
            Ok(None)
        }
        _ => {
            let alias = scopes.allocate_alias(root_table(entity, query));
            scopes.push_aliased(Some(entity), alias).map(Some)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FieldMeta;
    use quarry_common::DataType;

    fn users() -> EntitySchema {
        EntitySchema::new("User", "users")
            .field(FieldMeta::new("id", DataType::BigInt).primary_key())
            .field(FieldMeta::new("fullName", DataType::Text).with_column("full_name"))
    }

    #[test]
    fn test_alias_collision_uses_depth_suffix() {
        let users = users();
        let mut scopes = ScopeStack::new(8);
        let outer = scopes.allocate_alias("users");
        scopes.push_aliased(Some(&users), outer.clone()).unwrap();
        assert_eq!(outer, "u");

        let inner = scopes.allocate_alias("users");
        assert_eq!(inner, "u1");
        scopes.push_aliased(Some(&users), inner).unwrap();

        assert_eq!(scopes.column(&Dialect::POSTGRES, "fullName").unwrap(), "u1.\"full_name\"");
        assert_eq!(scopes.outer_column(&Dialect::POSTGRES, "id").unwrap(), "u.\"id\"");
    }

    #[test]
    fn test_depth_limit() {
        let users = users();
        let mut scopes = ScopeStack::new(1);
        scopes.push_unqualified(&users).unwrap();
        scopes.push_aliased(Some(&users), "u1".into()).unwrap();
        let err = scopes.push_aliased(Some(&users), "u2".into()).unwrap_err();
        assert!(matches!(err, QuarryError::SubQueryDepthExceeded(1)));
    }

    #[test]
    fn test_outer_reference_at_root_rejected() {
        let users = users();
        let mut scopes = ScopeStack::new(8);
        scopes.push_unqualified(&users).unwrap();
        assert!(scopes.outer_column(&Dialect::POSTGRES, "id").is_err());
    }
}

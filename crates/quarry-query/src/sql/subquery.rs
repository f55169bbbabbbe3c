//! Quarry SQL Sub-Queries - Nested Query Rendering
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use super::Render;
use crate::ast::*;
use quarry_common::Result;

impl<'s> Render<'s> {
    /// Render a sub-query body (without surrounding parentheses).
    pub(super) fn sub_query(&mut self, sq: &SubQuery) -> Result<()> {
        let schema = self.schema;
        match &sq.from_sub_query {
            Some(inner) => {
                let alias = match inner.alias.clone() {
                    Some(alias) => alias,
                    None => self.scopes.allocate_alias("derived"),
                };
                let columns = super::scope::derived_columns(schema, inner);
                self.scopes.push_derived(alias.clone(), columns)?;
                let result = self.sub_query_body(sq, |render| {
                    render.w.push("(");
                    render.sub_query(inner)?;
                    render.w.push(") AS ");
                    render.w.push(&alias);
                    Ok(())
                });
                self.scopes.pop();
                result
            }
            None => {
                let entity = schema.require_entity(&sq.entity)?;
                let alias = self.scopes.allocate_alias(&entity.table);
                self.scopes.push_aliased(Some(entity), alias.clone())?;
                let result = self.sub_query_body(sq, |render| {
                    render.push_table(&entity.table, Some(&alias));
                    Ok(())
                });
                self.scopes.pop();
                result
            }
        }
    }

    fn sub_query_body<F>(&mut self, sq: &SubQuery, from: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.w.push("SELECT ");
        if sq.select_fields.is_empty() {
            let scope = self.scopes.current()?;
            let default = match scope.entity.and_then(|e| e.primary_key()) {
                Some(pk) => scope.column(self.dialect, &pk.name)?,
                None => scope.star(),
            };
            self.w.push(&default);
        } else {
            self.field_list(&sq.select_fields)?;
        }
        self.w.push(" FROM ");
        from(self)?;
        self.where_clause(&sq.where_filters)?;
        self.group_by_clause(&sq.group_by)?;
        self.having_clause(&sq.having)?;
        self.order_by_clause(&sq.order_by, &sq.select_fields)?;
        self.limit_clause(sq.limit);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Quarry SQL Windows - Window Function Rendering
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use super::Render;
use crate::ast::*;
use quarry_common::Result;

fn frame_bound(bound: FrameBound) -> String {
    match bound {
        FrameBound::UnboundedPreceding => "UNBOUNDED PRECEDING".to_string(),
        FrameBound::Preceding(n) => format!("{} PRECEDING", n),
        FrameBound::CurrentRow => "CURRENT ROW".to_string(),
        FrameBound::Following(n) => format!("{} FOLLOWING", n),
        FrameBound::UnboundedFollowing => "UNBOUNDED FOLLOWING".to_string(),
    }
}

impl<'s> Render<'s> {
    /// `FUNC(args) OVER (PARTITION BY ... ORDER BY ... ROWS BETWEEN ...)`
    pub(super) fn window_expr(&mut self, window: &WindowField) -> Result<()> {
        window.check()?;
        let column = match &window.field {
            Some(field) => Some(self.scopes.column(self.dialect, field)?),
            None => None,
        };
        let value = column.clone().unwrap_or_default();

        let args = match window.function {
            WindowFunction::RowNumber | WindowFunction::Rank | WindowFunction::DenseRank => {
                String::new()
            }
            WindowFunction::Ntile(n) => n.to_string(),
            WindowFunction::Lag(offset) | WindowFunction::Lead(offset) => {
                format!("{}, {}", value, offset)
            }
            WindowFunction::NthValue(n) => format!("{}, {}", value, n),
            WindowFunction::Count => column.unwrap_or_else(|| "*".to_string()),
            WindowFunction::FirstValue
            | WindowFunction::LastValue
            | WindowFunction::Sum
            | WindowFunction::Avg
            | WindowFunction::Min
            | WindowFunction::Max => value,
        };

        let mut over = Vec::new();
        if !window.partition_by.is_empty() {
            let columns = window
                .partition_by
                .iter()
                .map(|f| self.scopes.column(self.dialect, f))
                .collect::<Result<Vec<_>>>()?;
            over.push(format!("PARTITION BY {}", columns.join(", ")));
        }
        if !window.order_by.is_empty() {
            let parts = window
                .order_by
                .iter()
                .map(|s| {
                    self.scopes
                        .column(self.dialect, &s.field)
                        .map(|c| format!("{} {}", c, s.order.keyword()))
                })
                .collect::<Result<Vec<_>>>()?;
            over.push(format!("ORDER BY {}", parts.join(", ")));
        }
        if let Some((start, end)) = window.frame() {
            over.push(format!(
                "ROWS BETWEEN {} AND {}",
                frame_bound(start),
                frame_bound(end)
            ));
        }

        self.w.push(&format!(
            "{}({}) OVER ({})",
            window.function.name(),
            args,
            over.join(" ")
        ));
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

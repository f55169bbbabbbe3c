//! Quarry SQL Writer - Statement Text and Parameters
//!
//! Accumulates SQL text and the ordered parameter list. In positional mode
//! every value becomes a dialect placeholder; in inline mode values are
//! rendered as escaped literals for diagnostics.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::dialect::Dialect;
use quarry_common::utils::quote_sql_string;
use quarry_common::{DialectKind, Value};
use serde::{Deserialize, Serialize};

// =============================================================================
// Statement
// =============================================================================

/// How values reach the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParameterMode {
    #[default]
    Positional,
    /// Literals in the text. For logging only, never for execution.
    Inline,
}

/// A translated statement and its positional parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlStatement {
    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

// =============================================================================
// Writer
// =============================================================================

#[derive(Debug)]
pub(crate) struct SqlWriter {
    dialect: Dialect,
    mode: ParameterMode,
    sql: String,
    params: Vec<Value>,
}

impl SqlWriter {
    pub fn new(dialect: Dialect, mode: ParameterMode) -> Self {
        Self {
            dialect,
            mode,
            sql: String::with_capacity(128),
            params: Vec::new(),
        }
    }

    pub fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    pub fn push_identifier(&mut self, ident: &str) {
        let quoted = self.dialect.quote_identifier(ident);
        self.sql.push_str(&quoted);
    }

    /// Register a value and return the text standing for it.
    pub fn param_text(&mut self, value: Value) -> String {
        match self.mode {
            ParameterMode::Positional => {
                self.params.push(value);
                self.dialect.placeholder(self.params.len())
            }
            ParameterMode::Inline => render_literal(&self.dialect, &value),
        }
    }

    pub fn push_param(&mut self, value: Value) {
        let text = self.param_text(value);
        self.sql.push_str(&text);
    }

    /// Comma-separated parameter list.
    pub fn push_params(&mut self, values: &[Value]) {
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.push_param(value.clone());
        }
    }

    pub fn finish(self) -> SqlStatement {
        SqlStatement {
            sql: self.sql,
            params: self.params,
        }
    }
}

// =============================================================================
// Literals
// =============================================================================

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Escaped SQL literal for a value.
pub fn render_literal(dialect: &Dialect, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Boolean(b) => match dialect.kind {
            DialectKind::Sqlite => (if *b { "1" } else { "0" }).to_string(),
            _ => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        },
        Value::Integer(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => f.to_string(),
        Value::Float(_) => "NULL".to_string(),
        Value::String(s) => quote_sql_string(s),
        Value::Bytes(bytes) => match dialect.kind {
            DialectKind::Postgres => format!("'\\x{}'", hex(bytes)),
            _ => format!("X'{}'", hex(bytes)),
        },
        Value::Timestamp(ts) => quote_sql_string(&ts.to_rfc3339()),
        Value::Array(_) | Value::Object(_) => quote_sql_string(&value.to_json().to_string()),
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Quarry JSON Path - Shared JSON Filter Targets
//!
//! Single source of truth for how a JSON filter addresses its column. The
//! SQL translator renders the returned left-hand side into the statement
//! and the parameter binder uses the identical string as the slot name, so
//! the two can never drift apart.
//!
//! Key Features:
//! - `$.a.b[0]` path parsing with per-segment validation
//! - Whole-document versus path-scalar binding decision
//! - Dialect-specific extraction expressions
//! - Codec-encoded operands for whole-document comparisons
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::ast::{FilterValue, Operator};
use crate::dialect::Dialect;
use crate::metadata::{FieldMeta, JsonCodec};
use quarry_common::{DataType, DialectKind, QuarryError, Result, Value};

/// An identifier or an array index.
fn valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => chars.all(|c| c.is_ascii_digit()),
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

// =============================================================================
// Path Parsing
// =============================================================================

/// Split a JSON path into segments. The `$` root yields no segments;
/// array indexes may be written `a[0]` or `a.0`.
pub fn segments(path: &str) -> Result<Vec<String>> {
    let invalid = || QuarryError::InvalidJsonPath(path.to_string());
    let trimmed = path.trim();
    let rest = trimmed.strip_prefix('$').unwrap_or(trimmed);
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    let rest = if trimmed.starts_with('$') {
        rest.strip_prefix('.')
            .or_else(|| rest.starts_with('[').then_some(rest))
            .ok_or_else(invalid)?
    } else {
        rest
    };

    let mut out = Vec::new();
    for part in rest.split('.') {
        let mut pieces = part.split('[');
        let head = pieces.next().unwrap_or_default();
        if !head.is_empty() {
            out.push(head.to_string());
        } else if !part.starts_with('[') {
            return Err(invalid());
        }
        for piece in pieces {
            let index = piece.strip_suffix(']').ok_or_else(invalid)?;
            if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            out.push(index.to_string());
        }
    }

    if out.is_empty() || !out.iter().all(|s| valid_segment(s)) {
        return Err(invalid());
    }
    Ok(out)
}

/// Dotted document key, e.g. `meta` + `$.tier` becomes `meta.tier`.
pub fn document_key(field: &str, path: Option<&str>) -> Result<String> {
    let segs = match path {
        Some(path) => segments(path)?,
        None => Vec::new(),
    };
    let mut key = field.to_string();
    for seg in segs {
        key.push('.');
        key.push_str(&seg);
    }
    Ok(key)
}

/// `$.a[0].b` form used by MySQL and SQLite path arguments.
pub fn path_literal(segments: &[String]) -> String {
    let mut out = String::from("$");
    for seg in segments {
        if seg.bytes().all(|b| b.is_ascii_digit()) {
            out.push('[');
            out.push_str(seg);
            out.push(']');
        } else {
            out.push('.');
            out.push_str(seg);
        }
    }
    out
}

// =============================================================================
// Binding Decision
// =============================================================================

/// How a filter operand is compared against its column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueBinding {
    /// Ordinary column comparison.
    Column,
    /// The operand is the whole stored document, serialized by the codec.
    WholeDocument,
    /// A scalar extracted at a non-root path.
    PathScalar(Vec<String>),
}

/// Decide how a filter on `field` (optionally at `path`) binds its operand.
pub fn binding_for(
    field: Option<&FieldMeta>,
    path: Option<&str>,
    value: &FilterValue,
) -> Result<ValueBinding> {
    let is_json = field.map(FieldMeta::is_json);
    match path {
        Some(path) => {
            let segs = segments(path)?;
            if is_json == Some(false) {
                return Err(QuarryError::InvalidQuery(format!(
                    "JSON path {} on non-JSON field {}",
                    path,
                    field.map(|f| f.name.as_str()).unwrap_or_default()
                )));
            }
            if segs.is_empty() {
                Ok(ValueBinding::WholeDocument)
            } else {
                Ok(ValueBinding::PathScalar(segs))
            }
        }
        None => {
            let structured = matches!(
                value,
                FilterValue::Scalar(Value::Object(_)) | FilterValue::Scalar(Value::Array(_))
            );
            if is_json == Some(true) && structured {
                Ok(ValueBinding::WholeDocument)
            } else {
                Ok(ValueBinding::Column)
            }
        }
    }
}

/// Left-hand side of a filter; also the binder's slot name.
pub fn filter_target(
    dialect: &Dialect,
    column_sql: &str,
    binding: &ValueBinding,
    operator: Operator,
    value: &FilterValue,
) -> Result<String> {
    match binding {
        ValueBinding::Column => Ok(column_sql.to_string()),
        ValueBinding::WholeDocument => {
            dialect.require_json("JSON document comparison")?;
            Ok(column_sql.to_string())
        }
        ValueBinding::PathScalar(segs) if operator == Operator::Size => {
            json_extract(dialect, column_sql, segs)
        }
        ValueBinding::PathScalar(segs) => {
            scalar_extract(dialect, column_sql, segs, value.is_numeric())
        }
    }
}

/// Operand with whole-document values replaced by their codec text.
pub fn encode_operand(
    binding: &ValueBinding,
    field: Option<&FieldMeta>,
    value: &FilterValue,
) -> Result<FilterValue> {
    if *binding != ValueBinding::WholeDocument {
        return Ok(value.clone());
    }
    let encode = |v: &Value| -> Result<Value> {
        let text = match field {
            Some(meta) => meta.codec().encode(v)?,
            None => crate::metadata::FieldCodec::encode(&JsonCodec, v)?,
        };
        Ok(Value::String(text))
    };
    Ok(match value {
        FilterValue::Scalar(v) => FilterValue::Scalar(encode(v)?),
        FilterValue::List(items) => {
            FilterValue::List(items.iter().map(encode).collect::<Result<Vec<_>>>()?)
        }
        other => other.clone(),
    })
}

/// Wrap a placeholder so the backend parses it as a JSON document.
pub fn document_param(dialect: &Dialect, placeholder: &str, field: Option<&FieldMeta>) -> Result<String> {
    match dialect.kind {
        DialectKind::Postgres => {
            let ty = match field.map(|f| &f.data_type) {
                Some(DataType::Json) => "JSON",
                _ => "JSONB",
            };
            Ok(format!("CAST({} AS {})", placeholder, ty))
        }
        DialectKind::MySql => Ok(format!("CAST({} AS JSON)", placeholder)),
        DialectKind::Sqlite => Ok(format!("json({})", placeholder)),
        DialectKind::H2 => Err(dialect.unsupported("JSON document comparison")),
    }
}

// =============================================================================
// Extraction Expressions
// =============================================================================

fn pg_text_path(segments: &[String]) -> String {
    format!("'{{{}}}'", segments.join(","))
}

fn is_index(segment: &str) -> bool {
    segment.bytes().all(|b| b.is_ascii_digit())
}

/// Scalar at a path, as text unless `numeric` asks for a number.
pub fn scalar_extract(
    dialect: &Dialect,
    column_sql: &str,
    segments: &[String],
    numeric: bool,
) -> Result<String> {
    dialect.require_json("JSON path extraction")?;
    let expr = match dialect.kind {
        DialectKind::Postgres => {
            let text = match segments {
                [single] if !is_index(single) => format!("{}->>'{}'", column_sql, single),
                _ => format!("{}#>>{}", column_sql, pg_text_path(segments)),
            };
            if numeric {
                format!("CAST({} AS NUMERIC)", text)
            } else {
                text
            }
        }
        DialectKind::MySql => {
            let extract = format!("JSON_EXTRACT({}, '{}')", column_sql, path_literal(segments));
            if numeric {
                extract
            } else {
                format!("JSON_UNQUOTE({})", extract)
            }
        }
        DialectKind::Sqlite => {
            format!("json_extract({}, '{}')", column_sql, path_literal(segments))
        }
        DialectKind::H2 => return Err(dialect.unsupported("JSON path extraction")),
    };
    Ok(expr)
}

/// JSON-typed value at a path (for array functions).
pub fn json_extract(dialect: &Dialect, column_sql: &str, segments: &[String]) -> Result<String> {
    dialect.require_json("JSON path extraction")?;
    if segments.is_empty() {
        return Ok(column_sql.to_string());
    }
    let expr = match dialect.kind {
        DialectKind::Postgres => match segments {
            [single] if !is_index(single) => format!("{}->'{}'", column_sql, single),
            _ => format!("{}#>{}", column_sql, pg_text_path(segments)),
        },
        DialectKind::MySql => {
            format!("JSON_EXTRACT({}, '{}')", column_sql, path_literal(segments))
        }
        DialectKind::Sqlite => {
            format!("json_extract({}, '{}')", column_sql, path_literal(segments))
        }
        DialectKind::H2 => return Err(dialect.unsupported("JSON path extraction")),
    };
    Ok(expr)
}

// =============================================================================
// Tests
// =============================================================================

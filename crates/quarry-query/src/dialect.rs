//! Quarry Dialect - Relational Dialect Descriptors
//!
//! Per-backend facts the SQL translator consults: identifier quoting,
//! placeholder syntax, identity column syntax and feature support.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use quarry_common::{DataType, DialectKind, QuarryError, Result};

// =============================================================================
// Placeholders
// =============================================================================

/// Bind parameter marker syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`
    Question,
    /// `$1`, `$2`, ...
    Dollar,
}

// =============================================================================
// Dialect
// =============================================================================

/// Descriptor of a relational SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub kind: DialectKind,
    pub identifier_quote: char,
    pub placeholder: PlaceholderStyle,
    pub autoincrement: &'static str,
    pub supports_arrays: bool,
    pub supports_json: bool,
    /// Whether HAVING may name a select-list alias instead of repeating
    /// the aggregate expression.
    pub having_alias_reference: bool,
}

impl Dialect {
    pub const POSTGRES: Dialect = Dialect {
        kind: DialectKind::Postgres,
        identifier_quote: '"',
        placeholder: PlaceholderStyle::Dollar,
        autoincrement: "GENERATED BY DEFAULT AS IDENTITY",
        supports_arrays: true,
        supports_json: true,
        having_alias_reference: false,
    };

    pub const MYSQL: Dialect = Dialect {
        kind: DialectKind::MySql,
        identifier_quote: '`',
        placeholder: PlaceholderStyle::Question,
        autoincrement: "AUTO_INCREMENT",
        supports_arrays: false,
        supports_json: true,
        having_alias_reference: true,
    };

    pub const SQLITE: Dialect = Dialect {
        kind: DialectKind::Sqlite,
        identifier_quote: '"',
        placeholder: PlaceholderStyle::Question,
        autoincrement: "AUTOINCREMENT",
        supports_arrays: false,
        supports_json: true,
        having_alias_reference: true,
    };

    pub const H2: Dialect = Dialect {
        kind: DialectKind::H2,
        identifier_quote: '"',
        placeholder: PlaceholderStyle::Question,
        autoincrement: "AUTO_INCREMENT",
        supports_arrays: true,
        supports_json: false,
        having_alias_reference: false,
    };

    pub fn of(kind: DialectKind) -> Self {
        match kind {
            DialectKind::Postgres => Self::POSTGRES,
            DialectKind::MySql => Self::MYSQL,
            DialectKind::Sqlite => Self::SQLITE,
            DialectKind::H2 => Self::H2,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Quote an identifier, doubling any embedded quote character.
    pub fn quote_identifier(&self, ident: &str) -> String {
        let q = self.identifier_quote;
        let mut out = String::with_capacity(ident.len() + 2);
        out.push(q);
        for c in ident.chars() {
            if c == q {
                out.push(q);
            }
            out.push(c);
        }
        out.push(q);
        out
    }

    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self.placeholder {
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::Dollar => format!("${}", index),
        }
    }

    pub fn unsupported(&self, feature: impl Into<String>) -> QuarryError {
        QuarryError::UnsupportedFeature {
            dialect: self.name().to_string(),
            feature: feature.into(),
        }
    }

    pub fn require_json(&self, feature: &str) -> Result<()> {
        if self.supports_json {
            Ok(())
        } else {
            Err(self.unsupported(feature))
        }
    }

    pub fn require_arrays(&self, feature: &str) -> Result<()> {
        if self.supports_arrays {
            Ok(())
        } else {
            Err(self.unsupported(feature))
        }
    }

    /// Column type name for a declared data type.
    pub fn type_name(&self, data_type: &DataType) -> Result<String> {
        use DialectKind::*;
        let name = match (data_type, self.kind) {
            (DataType::Boolean, _) => "BOOLEAN".to_string(),
            (DataType::SmallInt, _) => "SMALLINT".to_string(),
            (DataType::Integer, MySql) => "INT".to_string(),
            (DataType::Integer, _) => "INTEGER".to_string(),
            (DataType::BigInt, Sqlite) => "INTEGER".to_string(),
            (DataType::BigInt, _) => "BIGINT".to_string(),
            (DataType::Float, MySql) => "FLOAT".to_string(),
            (DataType::Float, _) => "REAL".to_string(),
            (DataType::Double, MySql) => "DOUBLE".to_string(),
            (DataType::Double, Sqlite) => "REAL".to_string(),
            (DataType::Double, _) => "DOUBLE PRECISION".to_string(),
            (DataType::Decimal { precision, scale }, _) => {
                format!("DECIMAL({}, {})", precision, scale)
            }
            (DataType::Varchar(n), _) => format!("VARCHAR({})", n),
            (DataType::Text, H2) => "CLOB".to_string(),
            (DataType::Text, _) => "TEXT".to_string(),
            (DataType::Blob, Postgres) => "BYTEA".to_string(),
            (DataType::Blob, _) => "BLOB".to_string(),
            (DataType::Date, _) => "DATE".to_string(),
            (DataType::Timestamp, Postgres) => "TIMESTAMPTZ".to_string(),
            (DataType::Timestamp, MySql) => "DATETIME(6)".to_string(),
            (DataType::Timestamp, Sqlite) => "TEXT".to_string(),
            (DataType::Timestamp, H2) => "TIMESTAMP WITH TIME ZONE".to_string(),
            (DataType::Json, Sqlite) | (DataType::Jsonb, Sqlite) => "TEXT".to_string(),
            (DataType::Jsonb, Postgres) => "JSONB".to_string(),
            (DataType::Json, _) | (DataType::Jsonb, _) => "JSON".to_string(),
            (DataType::Uuid, Postgres) | (DataType::Uuid, H2) => "UUID".to_string(),
            (DataType::Uuid, MySql) => "CHAR(36)".to_string(),
            (DataType::Uuid, Sqlite) => "TEXT".to_string(),
            (DataType::Array(inner), Postgres) => format!("{}[]", self.type_name(inner)?),
            (DataType::Array(inner), H2) => format!("{} ARRAY", self.type_name(inner)?),
            (DataType::Array(_), _) => return Err(self.unsupported("array columns")),
        };
        Ok(name)
    }

    /// Column definition for DDL, including identity syntax when requested.
    pub fn column_ddl(
        &self,
        column: &str,
        data_type: &DataType,
        primary_key: bool,
        auto_increment: bool,
    ) -> Result<String> {
        let name = self.quote_identifier(column);
        if auto_increment {
            return Ok(match self.kind {
                DialectKind::Sqlite => {
                    format!("{} INTEGER PRIMARY KEY {}", name, self.autoincrement)
                }
                _ => format!(
                    "{} {} {} PRIMARY KEY",
                    name,
                    self.type_name(data_type)?,
                    self.autoincrement
                ),
            });
        }
        let mut ddl = format!("{} {}", name, self.type_name(data_type)?);
        if primary_key {
            ddl.push_str(" PRIMARY KEY");
        }
        Ok(ddl)
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::of(DialectKind::default())
    }
}

impl From<DialectKind> for Dialect {
    fn from(kind: DialectKind) -> Self {
        Self::of(kind)
    }
}

// =============================================================================
// Tests
// =============================================================================

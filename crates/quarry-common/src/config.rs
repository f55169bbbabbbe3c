//! Quarry Config - Configuration Structures
//!
//! Configuration for translation and evaluation. Supports loading from TOML
//! files and programmatic construction, with defaults that fail closed.
//!
//! Key Features:
//! - Default SQL dialect selection
//! - Explicit validation failure policy
//! - Sub-query nesting limit
//! - Diagnostic logging of literal-inlined SQL
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::DialectKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// Validation Policy
// =============================================================================

/// What to do when a query fails pre-execution validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Raise the validation failure to the caller.
    #[default]
    FailClosed,
    /// Log the failure and answer with an empty result.
    WarnAndEmpty,
}

// =============================================================================
// Query Configuration
// =============================================================================

/// Configuration for the query engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_dialect: DialectKind,
    pub validation_policy: ValidationPolicy,
    pub max_sub_query_depth: usize,
    pub string_agg_separator: String,
    pub log_inlined_sql: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_dialect: DialectKind::Postgres,
            validation_policy: ValidationPolicy::FailClosed,
            max_sub_query_depth: 8,
            string_agg_separator: ",".to_string(),
            log_inlined_sql: false,
        }
    }
}

impl QueryConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| crate::QuarryError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration that raises on every validation failure.
    pub fn strict() -> Self {
        Self::default()
    }

    /// Configuration that logs validation failures and answers empty.
    pub fn lenient() -> Self {
        Self {
            validation_policy: ValidationPolicy::WarnAndEmpty,
            ..Default::default()
        }
    }

    pub fn with_dialect(mut self, dialect: DialectKind) -> Self {
        self.default_dialect = dialect;
        self
    }

    fn validate(&self) -> crate::Result<()> {
        if self.max_sub_query_depth == 0 {
            return Err(crate::QuarryError::Configuration(
                "max_sub_query_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Quarry Error - Unified Error Types
//!
//! Error handling for every stage of the query pipeline. Errors are grouped
//! by the stage that raises them: construction of AST values, translation to
//! a backend, validation, and execution against an external collaborator.
//!
//! Key Features:
//! - Construction-time errors raised before anything reaches a backend
//! - Backend capability errors naming the backend that refused
//! - User vs system error classification
//! - Seamless integration with std::io::Error
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Unified error type for all Quarry operations.
///
/// Errors are `Clone` so builders can hold a deferred chaining error.
#[derive(Error, Debug, Clone)]
pub enum QuarryError {
    // Construction errors
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("aggregation {0} requires a condition")]
    MissingCondition(String),

    #[error("operator {0} requires a collection value")]
    NotACollection(String),

    #[error("invalid JSON path '{0}'")]
    InvalidJsonPath(String),

    // Backend capability errors
    #[error("operator {operator} is not supported by {backend}")]
    UnsupportedOperator { operator: String, backend: String },

    #[error("window function {function} is not supported by {backend}")]
    UnsupportedWindowFunction { function: String, backend: String },

    #[error("dialect {dialect} does not support {feature}")]
    UnsupportedFeature { dialect: String, feature: String },

    // Metadata errors
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("field not found: {entity}.{field}")]
    FieldNotFound { entity: String, field: String },

    // Validation errors
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("sub-query nesting exceeds {0} levels")]
    SubQueryDepthExceeded(usize),

    // Value errors
    #[error("type error: {0}")]
    TypeError(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("no value resolver registered for {0}")]
    NoResolver(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    // Execution errors surfaced by external collaborators
    #[error("execution error: {0}")]
    Execution(String),

    #[error("internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for Quarry operations.
pub type Result<T> = std::result::Result<T, QuarryError>;

// =============================================================================
// Error Classification
// =============================================================================

impl QuarryError {
    /// Returns true if the error was raised while building or translating a
    /// query, before any backend was involved.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            QuarryError::InvalidQuery(_)
                | QuarryError::MissingCondition(_)
                | QuarryError::NotACollection(_)
                | QuarryError::InvalidJsonPath(_)
                | QuarryError::UnsupportedOperator { .. }
                | QuarryError::UnsupportedWindowFunction { .. }
                | QuarryError::UnsupportedFeature { .. }
        )
    }

    /// Returns true if this is a user error (vs system error).
    pub fn is_user_error(&self) -> bool {
        self.is_construction_error()
            || matches!(
                self,
                QuarryError::EntityNotFound(_)
                    | QuarryError::FieldNotFound { .. }
                    | QuarryError::Validation(_)
                    | QuarryError::SubQueryDepthExceeded(_)
                    | QuarryError::TypeError(_)
            )
    }
}

impl From<std::io::Error> for QuarryError {
    fn from(err: std::io::Error) -> Self {
        QuarryError::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for QuarryError {
    fn from(err: serde_json::Error) -> Self {
        QuarryError::Serialization(err.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_errors_are_user_errors() {
        let err = QuarryError::MissingCondition("COUNT_IF".to_string());
        assert!(err.is_construction_error());
        assert!(err.is_user_error());
        assert_eq!(err.to_string(), "aggregation COUNT_IF requires a condition");
    }

    #[test]
    fn test_execution_error_is_system_error() {
        let err = QuarryError::Execution("connection reset".to_string());
        assert!(!err.is_construction_error());
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: QuarryError = io.into();
        assert!(matches!(err, QuarryError::Io(_)));
    }

    #[test]
    fn test_errors_clone() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = QuarryError::from(io);
        let copy = err.clone();
        assert_eq!(copy.to_string(), err.to_string());
        assert_eq!(copy.to_string(), "IO error: denied");
    }
}

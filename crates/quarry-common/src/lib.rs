//! Quarry Common - Shared Types and Utilities
//!
//! Foundational types, error handling, and utilities used across the Quarry
//! data-access layer. Provides the value model every backend speaks and the
//! configuration that steers translation and evaluation.
//!
//! Key Features:
//! - Unified error type with construction/user error classification
//! - Runtime value model with natural ordering and JSON conversion
//! - Declared data types and relational dialect identifiers
//! - Query configuration loadable from TOML
//! - Hashing and pattern utilities
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use config::{QueryConfig, ValidationPolicy};
pub use error::{QuarryError, Result};
pub use types::*;

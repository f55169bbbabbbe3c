//! Quarry Document - Document Filter Translation
//!
//! Turns query filters into document-store filter expressions and evaluates
//! those expressions against documents.
//!
//! Key Features:
//! - Dotted-key documents with nested object and array access
//! - `$`-operator filter expressions with JSON rendering
//! - Metadata-driven translation of query filters
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod filter;
pub mod translate;
pub mod types;

pub use filter::DocumentFilter;
pub use translate::DocumentFilterTranslator;
pub use types::{Document, DocumentId, ID_KEY};

//! Quarry Utils - Utility Functions
//!
//! Common utility functions used across the Quarry crates.
//!
//! Key Features:
//! - Fast hashing using xxHash3 for query cache keys
//! - SQL LIKE pattern conversion to anchored regular expressions
//! - SQL string literal escaping for diagnostic output
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use regex::Regex;
use xxhash_rust::xxh3::xxh3_64;

// =============================================================================
// Hashing Functions
// =============================================================================

/// Compute a 64-bit hash of the given bytes using xxHash3.
#[inline]
pub fn hash64(data: &[u8]) -> u64 {
    xxh3_64(data)
}

// =============================================================================
// Pattern Functions
// =============================================================================

/// Convert a SQL LIKE pattern into an anchored regular expression.
///
/// `%` matches any run of characters, `_` exactly one, and a backslash makes
/// the following character literal.
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex::escape(&next.to_string()));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// Compile a SQL LIKE pattern.
pub fn compile_like(pattern: &str) -> crate::Result<Regex> {
    Regex::new(&like_to_regex(pattern))
        .map_err(|e| crate::QuarryError::InvalidQuery(format!("bad LIKE pattern: {}", e)))
}

// =============================================================================
// SQL Text Helpers
// =============================================================================

/// Quote a string as a SQL literal, doubling embedded single quotes.
pub fn quote_sql_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash64(b"select"), hash64(b"select"));
        assert_ne!(hash64(b"select"), hash64(b"delete"));
    }

    #[test]
    fn test_like_to_regex() {
        let re = compile_like("al%").unwrap();
        assert!(re.is_match("alice"));
        assert!(!re.is_match("malice"));

        let re = compile_like("b_b").unwrap();
        assert!(re.is_match("bob"));
        assert!(!re.is_match("boob"));

        let re = compile_like("100\\%").unwrap();
        assert!(re.is_match("100%"));
        assert!(!re.is_match("1000"));

        let re = compile_like("a.c").unwrap();
        assert!(!re.is_match("abc"));
    }

    #[test]
    fn test_quote_sql_string() {
        assert_eq!(quote_sql_string("o'neil"), "'o''neil'");
    }
}

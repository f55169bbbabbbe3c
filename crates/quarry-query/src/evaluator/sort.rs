//! Quarry Evaluator Sorting
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::ast::{SortOption, SortOrder};
use quarry_common::Value;
use std::cmp::Ordering;

/// Total order used for sorting: NULL first, then natural ordering.
/// Values of unrelated kinds order by kind.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.compare(b).unwrap_or_else(|| a.kind().cmp(&b.kind())),
    }
}

/// Stable sort by each option in turn; DESC reverses only its own key.
pub(crate) fn sort_by_key<T, F>(items: &mut [T], sort: &[SortOption], key: F)
where
    F: Fn(&T, &str) -> Value,
{
    if sort.is_empty() {
        return;
    }
    items.sort_by(|a, b| {
        for option in sort {
            let ord = compare_values(&key(a, &option.field), &key(b, &option.field));
            let ord = match option.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// True if two order-by tuples tie.
pub(crate) fn same_key(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| compare_values(x, y) == Ordering::Equal)
}

//! In-memory driver.
//!
//! - [`MemoryReader`]: evaluates [`RemoteQuery`](crate::core::RemoteQuery)
//!   against tables loaded in memory
//! - [`MemoryStore`]: auto-increment tables behind a mutex
//!
//! Used for dry runs and as the test double for both sides of an import.

mod reader;
mod store;

pub use reader::{MemoryConnector, MemoryReader};
pub use store::MemoryStore;

use std::cmp::Ordering;

use crate::core::Value;

/// SQL-style equality: NULL equals nothing, numbers compare numerically.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Some(Ordering::Equal)
}

/// Order two values; `None` if either is NULL.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    if let (Some(x), Some(y)) = (numeric(a), numeric(b)) {
        return Some(x.cmp(&y));
    }
    match (a.as_text(), b.as_text()) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => None,
    }
}

fn numeric(value: &Value) -> Option<rust_decimal::Decimal> {
    match value {
        Value::Int(_) | Value::Float(_) | Value::Decimal(_) | Value::Bool(_) => {
            value.as_decimal().or_else(|| value.as_i64().map(Into::into))
        }
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_text_compares_as_number() {
        assert!(values_equal(&Value::Int(7), &Value::text("7")));
        assert!(values_equal(&Value::text("7.00"), &Value::Int(7)));
        assert_eq!(
            compare_values(&Value::text("10"), &Value::Int(9)),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_null_never_equal() {
        assert!(!values_equal(&Value::Null, &Value::Null));
        assert!(values_equal(&Value::text("a"), &Value::text("a")));
        assert!(!values_equal(&Value::text("a"), &Value::text("A")));
    }
}

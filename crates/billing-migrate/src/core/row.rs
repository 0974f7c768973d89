//! Ordered column/value maps.
//!
//! A [`Row`] is one foreign record as returned by a remote reader. The same
//! structure is reused as the field set handed to entity writers ([`Record`]).

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value::Value;
use crate::error::Result;

/// One foreign record: column name to value, in select order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    columns: IndexMap<String, Value>,
}

/// Target field/value pairs for a single entity write.
pub type Record = Row;

static NULL: Value = Value::Null;

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column, replacing any previous value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(column.into(), value.into());
    }

    /// Get a column; missing columns read as NULL.
    pub fn get(&self, column: &str) -> &Value {
        self.columns.get(column).unwrap_or(&NULL)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.columns.shift_remove(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.columns.iter()
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.columns.keys()
    }

    /// Text value, `None` for NULL or blank.
    pub fn text(&self, column: &str) -> Option<String> {
        let v = self.get(column);
        if v.is_empty() {
            None
        } else {
            v.as_text()
        }
    }

    /// Text value with a default for NULL or blank.
    pub fn text_or(&self, column: &str, default: &str) -> String {
        self.text(column).unwrap_or_else(|| default.to_string())
    }

    pub fn int(&self, column: &str) -> Option<i64> {
        self.get(column).as_i64()
    }

    pub fn decimal(&self, column: &str) -> Decimal {
        self.get(column).as_decimal().unwrap_or_default()
    }

    pub fn flag(&self, column: &str) -> bool {
        self.get(column).as_bool()
    }

    /// Timestamp column as a value (`Null` when absent or zero-date).
    pub fn datetime(&self, column: &str) -> Result<Value> {
        Ok(self.get(column).as_datetime()?.into())
    }

    /// Foreign key column as a remote id; zero and blank mean "no reference".
    pub fn reference(&self, column: &str) -> Option<String> {
        match self.get(column) {
            Value::Int(0) => None,
            v if v.is_empty() => None,
            v => v.as_text().filter(|s| s.trim() != "0"),
        }
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_is_null() {
        let row = Row::new().with("id", 1i64);
        assert!(row.get("nope").is_null());
        assert_eq!(row.int("id"), Some(1));
    }

    #[test]
    fn test_reference_treats_zero_as_absent() {
        let row = Row::new()
            .with("groupid", 0i64)
            .with("currency", "0")
            .with("userid", 7i64);
        assert_eq!(row.reference("groupid"), None);
        assert_eq!(row.reference("currency"), None);
        assert_eq!(row.reference("userid"), Some("7".to_string()));
    }

    #[test]
    fn test_preserves_insertion_order() {
        let row = Row::new().with("b", 1i64).with("a", 2i64);
        let cols: Vec<_> = row.columns().cloned().collect();
        assert_eq!(cols, vec!["b", "a"]);
    }
}

//! Scalar values carried through the import pipeline.
//!
//! Remote rows, mapping-rule literals and records handed to entity writers all
//! use the same [`Value`] representation, so a field read from the foreign
//! database can flow to the local store without intermediate conversions.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// A single column or field value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// SQL NULL / missing field.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Any integer column (tinyint through bigint).
    Int(i64),

    /// Floating point column.
    Float(f64),

    /// Exact decimal (money, rates).
    Decimal(Decimal),

    /// Text data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Date without time component.
    Date(NaiveDate),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Composite value (lists, nested settings) prior to serialization.
    Json(serde_json::Value),
}

impl Value {
    /// Create a text value.
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value counts as "empty" for alternate-source fallback.
    ///
    /// NULL, whitespace-only text, empty bytes and JSON null are empty.
    /// Zero and `"0"` are real values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Json(j) => j.is_null(),
            _ => false,
        }
    }

    /// Render as text, `None` for NULL.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::Decimal(v) => Some(v.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            Value::Json(serde_json::Value::String(s)) => Some(s.clone()),
            Value::Json(j) => Some(j.to_string()),
        }
    }

    /// Interpret as an integer where the conversion is lossless.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Decimal(d) if d.fract().is_zero() => d.to_string().parse().ok(),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Json(serde_json::Value::Number(n)) => n.as_i64(),
            _ => None,
        }
    }

    /// Interpret as a decimal amount.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            Value::Int(v) => Some(Decimal::from(*v)),
            Value::Float(v) => Decimal::from_str(&v.to_string()).ok(),
            Value::Text(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }

    /// Interpret as a boolean flag ("1", "on", "yes", "true", non-zero).
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::Decimal(d) => !d.is_zero(),
            Value::Text(s) => matches!(
                s.trim().to_lowercase().as_str(),
                "1" | "on" | "yes" | "true" | "y"
            ),
            Value::Json(serde_json::Value::Bool(b)) => *b,
            _ => false,
        }
    }

    /// Interpret as a timestamp. Dates are promoted to midnight.
    ///
    /// Text in `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS` form is parsed; the
    /// all-zero MySQL date is treated as absent.
    pub fn as_datetime(&self) -> Result<Option<NaiveDateTime>> {
        match self {
            Value::Null => Ok(None),
            Value::DateTime(dt) => Ok(Some(*dt)),
            Value::Date(d) => Ok(d.and_hms_opt(0, 0, 0)),
            Value::Text(s) => {
                let s = s.trim();
                if s.is_empty() || s.starts_with("0000-00-00") {
                    return Ok(None);
                }
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                    return Ok(Some(dt));
                }
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(|d| d.and_hms_opt(0, 0, 0))
                    .map_err(|e| MigrateError::Serialization(format!("invalid date '{}': {}", s, e)))
            }
            other => Err(MigrateError::Serialization(format!(
                "cannot interpret {:?} as a date",
                other
            ))),
        }
    }

    /// Convert to a JSON value for serialization of composites.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Float(v) => serde_json::Value::from(*v),
            Value::Json(j) => j.clone(),
            other => other
                .as_text()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Json(other),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(s) => f.write_str(&s),
            None => f.write_str("NULL"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emptiness() {
        assert!(Value::Null.is_empty());
        assert!(Value::text("   ").is_empty());
        assert!(Value::Json(serde_json::Value::Null).is_empty());
        assert!(!Value::text("0").is_empty());
        assert!(!Value::Int(0).is_empty());
    }

    #[test]
    fn test_datetime_parsing() {
        let dt = Value::text("2012-03-04 05:06:07").as_datetime().unwrap().unwrap();
        assert_eq!(dt.to_string(), "2012-03-04 05:06:07");

        let midnight = Value::text("2012-03-04").as_datetime().unwrap().unwrap();
        assert_eq!(midnight.to_string(), "2012-03-04 00:00:00");

        assert!(Value::text("0000-00-00").as_datetime().unwrap().is_none());
        assert!(Value::text("next tuesday").as_datetime().is_err());
    }

    #[test]
    fn test_numeric_conversions() {
        assert_eq!(Value::text(" 12 ").as_i64(), Some(12));
        assert_eq!(
            Value::text("9.95").as_decimal(),
            Some(Decimal::from_str("9.95").unwrap())
        );
        assert!(Value::text("on").as_bool());
        assert!(!Value::text("off").as_bool());
    }

    #[test]
    fn test_json_conversion_keeps_composites() {
        let v = Value::from(serde_json::json!(["ns1.example.com", "ns2.example.com"]));
        assert!(matches!(v, Value::Json(_)));
        assert_eq!(v.to_json(), serde_json::json!(["ns1.example.com", "ns2.example.com"]));
    }
}

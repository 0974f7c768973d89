//! Conversion between [`Value`] and MySQL wire values.

use sqlx::mysql::{MySql, MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

use crate::core::{Row, Value};

/// Bind a value as the next positional parameter.
pub(crate) fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Decimal(d) => query.bind(*d),
        Value::Text(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
        Value::Date(d) => query.bind(*d),
        Value::DateTime(dt) => query.bind(*dt),
        Value::Json(j) => query.bind(j.to_string()),
    }
}

/// Bind all values in order.
pub(crate) fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    values: &[Value],
) -> Query<'q, MySql, MySqlArguments> {
    for value in values {
        query = bind_value(query, value);
    }
    query
}

/// Convert a MySQL row to a [`Row`], keyed by column label.
///
/// Values that fail to decode (zero dates, out-of-range integers) become
/// NULL.
pub(crate) fn decode_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let type_name = column.type_info().name().to_lowercase();
            (column.name().to_string(), decode_value(row, i, &type_name))
        })
        .collect()
}

fn decode_value(row: &MySqlRow, i: usize, type_name: &str) -> Value {
    let is_null = row.try_get_raw(i).map(|r| r.is_null()).unwrap_or(true);
    if is_null {
        return Value::Null;
    }

    match type_name {
        "boolean" => row.try_get::<bool, _>(i).map(Value::Bool).ok(),

        "tinyint" => row.try_get::<i8, _>(i).map(|v| Value::Int(v.into())).ok(),
        "smallint" => row.try_get::<i16, _>(i).map(|v| Value::Int(v.into())).ok(),
        "mediumint" | "int" => row.try_get::<i32, _>(i).map(|v| Value::Int(v.into())).ok(),
        "bigint" => row.try_get::<i64, _>(i).map(Value::Int).ok(),
        "tinyint unsigned" => row.try_get::<u8, _>(i).map(|v| Value::Int(v.into())).ok(),
        "smallint unsigned" => row.try_get::<u16, _>(i).map(|v| Value::Int(v.into())).ok(),
        "mediumint unsigned" | "int unsigned" => {
            row.try_get::<u32, _>(i).map(|v| Value::Int(v.into())).ok()
        }
        "bigint unsigned" => row
            .try_get::<u64, _>(i)
            .ok()
            .and_then(|v| i64::try_from(v).ok())
            .map(Value::Int),

        "float" => row.try_get::<f32, _>(i).map(|v| Value::Float(v.into())).ok(),
        "double" => row.try_get::<f64, _>(i).map(Value::Float).ok(),
        "decimal" => row
            .try_get::<rust_decimal::Decimal, _>(i)
            .map(Value::Decimal)
            .ok(),

        "date" => row.try_get::<chrono::NaiveDate, _>(i).map(Value::Date).ok(),
        "datetime" | "timestamp" => row
            .try_get::<chrono::NaiveDateTime, _>(i)
            .map(Value::DateTime)
            .ok(),
        "time" => row
            .try_get::<chrono::NaiveTime, _>(i)
            .map(|t| Value::Text(t.format("%H:%M:%S").to_string()))
            .ok(),

        "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => {
            row.try_get::<Vec<u8>, _>(i).map(Value::Bytes).ok()
        }

        "json" => row
            .try_get::<serde_json::Value, _>(i)
            .map(Value::Json)
            .ok(),

        // char, varchar, text variants, enum, set
        _ => row
            .try_get::<String, _>(i)
            .map(Value::Text)
            .ok()
            .or_else(|| {
                row.try_get::<Vec<u8>, _>(i)
                    .map(|b| Value::Text(String::from_utf8_lossy(&b).into_owned()))
                    .ok()
            }),
    }
    .unwrap_or(Value::Null)
}

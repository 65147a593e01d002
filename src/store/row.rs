//! PostgreSQL rows to JSON objects, keyed by output column name.

use serde_json::{Map, Number, Value};
use sqlx::postgres::{PgRow, Postgres};
use sqlx::{Column, Decode, Row, Type, TypeInfo};

pub fn row_to_json(row: &PgRow) -> Value {
    let mut map = Map::new();
    for (idx, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), cell_to_value(row, idx, col.type_info().name()));
    }
    Value::Object(map)
}

fn get<'r, T>(row: &'r PgRow, idx: usize) -> Option<T>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten()
}

fn float(n: Option<f64>) -> Value {
    n.and_then(Number::from_f64).map(Value::Number).unwrap_or(Value::Null)
}

fn cell_to_value(row: &PgRow, idx: usize, type_name: &str) -> Value {
    match type_name {
        "INT2" => get::<i16>(row, idx).map(|n| Value::Number(n.into())).unwrap_or(Value::Null),
        "INT4" => get::<i32>(row, idx).map(|n| Value::Number(n.into())).unwrap_or(Value::Null),
        "INT8" => get::<i64>(row, idx).map(|n| Value::Number(n.into())).unwrap_or(Value::Null),
        "FLOAT4" => float(get::<f32>(row, idx).map(f64::from)),
        "FLOAT8" => float(get::<f64>(row, idx)),
        "BOOL" => get::<bool>(row, idx).map(Value::Bool).unwrap_or(Value::Null),
        "UUID" => get::<uuid::Uuid>(row, idx)
            .map(|u| Value::String(u.to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMPTZ" => get::<chrono::DateTime<chrono::Utc>>(row, idx)
            .map(|d| Value::String(d.to_rfc3339()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => get::<chrono::NaiveDateTime>(row, idx)
            .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null),
        "DATE" => get::<chrono::NaiveDate>(row, idx)
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        "JSON" | "JSONB" => get::<Value>(row, idx).unwrap_or(Value::Null),
        "BYTEA" => get::<Vec<u8>>(row, idx)
            .map(|b| Value::String(hex(&b)))
            .unwrap_or(Value::Null),
        // text-like types, and anything the select list already cast to text
        _ => get::<String>(row, idx).map(Value::String).unwrap_or(Value::Null),
    }
}

/// PostgreSQL's `\x` hex rendering of bytea.
fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(2 + bytes.len() * 2);
    s.push_str("\\x");
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_matches_postgres_output() {
        assert_eq!(hex(&[0xde, 0xad, 0x01]), "\\xdead01");
        assert_eq!(hex(&[]), "\\x");
    }
}

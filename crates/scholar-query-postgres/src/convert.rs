//! Conversions between scalar values and PostgreSQL wire values

use bytes::BytesMut;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use scholar_query::ScalarValue;
use serde_json::Value;
use std::error::Error;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::Row;

type BoxError = Box<dyn Error + Sync + Send>;

/// A bound positional parameter
///
/// Integers and floats are narrowed or widened to whatever type the server
/// inferred for the placeholder, so `$1` works against INT4 columns as well
/// as BIGINT ones.
#[derive(Debug)]
pub struct SqlParam<'a>(pub &'a ScalarValue);

impl ToSql for SqlParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self.0 {
            ScalarValue::Null => Ok(IsNull::Yes),
            ScalarValue::Integer(v) => integer_to_sql(*v, ty, out),
            ScalarValue::Float(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            ScalarValue::Date(d) => d.to_sql(ty, out),
            ScalarValue::Text(s) => s.as_str().to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn integer_to_sql(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::INT2 {
        i16::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        i32::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::FLOAT4 {
        (v as f32).to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        (v as f64).to_sql(ty, out)
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
        v.to_string().to_sql(ty, out)
    } else {
        v.to_sql(ty, out)
    }
}

/// NUMERIC that holds a finite value
///
/// NaN and the PostgreSQL 14 infinities are rejected before the digits are
/// handed to `rust_decimal`, so they surface as a decode error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiniteNumeric(pub Decimal);

const NUMERIC_POS: [u8; 2] = [0x00, 0x00];
const NUMERIC_NEG: [u8; 2] = [0x40, 0x00];

impl<'a> FromSql<'a> for FiniteNumeric {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        match raw.get(4..6) {
            Some(sign) if sign == NUMERIC_POS || sign == NUMERIC_NEG => {
                Decimal::from_sql(ty, raw).map(FiniteNumeric)
            }
            Some(_) => Err("numeric value is not finite".into()),
            None => Err("numeric value truncated".into()),
        }
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn number(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn decimal(v: FiniteNumeric) -> Value {
    v.0.to_f64().map_or(Value::Null, number)
}

/// A decoded cell as JSON; NULL and undecodable cells both become null
fn json_or_null<T, E>(cell: Result<Option<T>, E>, to_json: impl FnOnce(T) -> Value) -> Value {
    match cell {
        Ok(Some(value)) => to_json(value),
        _ => Value::Null,
    }
}

fn cell<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, to_json: impl FnOnce(T) -> Value) -> Value {
    json_or_null(row.try_get::<_, Option<T>>(idx), to_json)
}

/// Extract every column of a row as JSON, positionally
pub fn row_values(row: &Row) -> Vec<Value> {
    (0..row.columns().len())
        .map(|idx| extract_value(row, idx))
        .collect()
}

/// One column as JSON, chosen by the column's server-side type
///
/// Dates keep ISO text so the normalizer can coerce them alongside the
/// other backends; unknown types are read as text when the driver allows it.
pub fn extract_value(row: &Row, idx: usize) -> Value {
    match row.columns()[idx].type_().name() {
        "bool" => cell(row, idx, Value::Bool),
        "int2" => cell(row, idx, |v: i16| Value::from(v)),
        "int4" => cell(row, idx, |v: i32| Value::from(v)),
        "int8" => cell(row, idx, |v: i64| Value::from(v)),
        "float4" => cell(row, idx, |v: f32| number(f64::from(v))),
        "float8" => cell(row, idx, number),
        "numeric" => cell(row, idx, decimal),
        "date" => cell(row, idx, |v: chrono::NaiveDate| {
            Value::String(v.format("%Y-%m-%d").to_string())
        }),
        "timestamp" => cell(row, idx, |v: chrono::NaiveDateTime| Value::String(v.to_string())),
        "timestamptz" => cell(row, idx, |v: chrono::DateTime<chrono::Utc>| {
            Value::String(v.to_rfc3339())
        }),
        "json" | "jsonb" => cell(row, idx, |v: Value| v),
        "_text" | "_varchar" => cell(row, idx, |items: Vec<String>| {
            items.into_iter().map(Value::String).collect()
        }),
        _ => cell(row, idx, Value::String),
    }
}

//! Result normalization
//!
//! Maps the three native result shapes onto a [`RecordSet`] with a caller
//! supplied projection. Values are coerced to the projection's semantic
//! types; anything that cannot be coerced becomes null.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::types::{FieldDef, FieldSchema, FieldType, RawRows, RecordSet, ScalarValue, SourceTag};

/// Convert native rows into normalized records
///
/// - tuples are zipped positionally against `schema`
/// - documents are projected by key (dotted paths reach into sub-documents)
/// - graph records are projected by key
pub fn normalize(raw: RawRows, source: impl Into<SourceTag>, schema: &FieldSchema) -> RecordSet {
    let mut set = RecordSet::empty(source, schema.clone());

    match raw {
        RawRows::Tuples { rows, .. } => {
            for row in rows {
                let values = schema
                    .fields()
                    .iter()
                    .enumerate()
                    .map(|(idx, field)| project(row.get(idx), field))
                    .collect();
                set.push(values);
            }
        }
        RawRows::Documents(documents) => {
            for document in documents {
                let values = schema
                    .fields()
                    .iter()
                    .map(|field| project(lookup_path(&document, &field.name), field))
                    .collect();
                set.push(values);
            }
        }
        RawRows::Records(records) => {
            for record in records {
                let values = schema
                    .fields()
                    .iter()
                    .map(|field| project(record.get(&field.name), field))
                    .collect();
                set.push(values);
            }
        }
    }

    debug!("Normalized {} {} records", set.len(), set.source);
    set
}

fn project(value: Option<&Value>, field: &FieldDef) -> ScalarValue {
    value.map_or(ScalarValue::Null, |v| coerce(v, field.field_type))
}

fn lookup_path<'a>(document: &'a serde_json::Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(value) = document.get(path) {
        return Some(value);
    }

    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Coerce a native JSON value to the canonical type
pub fn coerce(value: &Value, field_type: FieldType) -> ScalarValue {
    match field_type {
        FieldType::Integer => coerce_integer(value),
        FieldType::Float => coerce_float(value),
        FieldType::Text => coerce_text(value),
        FieldType::Date => coerce_date(value),
    }
}

/// Unwrap `{"$numberLong": "12"}` style extended JSON wrappers
fn unwrap_extended(value: &Value) -> &Value {
    if let Value::Object(map) = value {
        if map.len() == 1 {
            for key in ["$numberLong", "$numberInt", "$numberDouble", "$numberDecimal"] {
                if let Some(inner) = map.get(key) {
                    return inner;
                }
            }
        }
    }
    value
}

fn coerce_float(value: &Value) -> ScalarValue {
    let parsed = match unwrap_extended(value) {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed
        .filter(|v| v.is_finite())
        .map_or(ScalarValue::Null, ScalarValue::Float)
}

fn coerce_integer(value: &Value) -> ScalarValue {
    let inner = unwrap_extended(value);

    if let Value::Number(n) = inner {
        if let Some(i) = n.as_i64() {
            return ScalarValue::Integer(i);
        }
    }
    if let Value::String(s) = inner {
        if let Ok(i) = s.trim().parse::<i64>() {
            return ScalarValue::Integer(i);
        }
    }

    match coerce_float(inner) {
        ScalarValue::Float(f) if f.abs() < i64::MAX as f64 => ScalarValue::Integer(f.round() as i64),
        _ => ScalarValue::Null,
    }
}

fn coerce_text(value: &Value) -> ScalarValue {
    match value {
        Value::Null => ScalarValue::Null,
        Value::String(s) => ScalarValue::Text(s.clone()),
        Value::Bool(b) => ScalarValue::Text(b.to_string()),
        Value::Number(n) => ScalarValue::Text(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| match coerce_text(item) {
                    ScalarValue::Text(s) => Some(s),
                    _ => None,
                })
                .collect();
            ScalarValue::Text(parts.join(", "))
        }
        Value::Object(map) => {
            if let Some(Value::String(oid)) = map.get("$oid") {
                return ScalarValue::Text(oid.clone());
            }
            if map.contains_key("$date") {
                return match coerce_date(value) {
                    ScalarValue::Date(d) => ScalarValue::Text(d.format("%Y-%m-%d").to_string()),
                    _ => ScalarValue::Null,
                };
            }
            if let ScalarValue::Float(f) = coerce_float(value) {
                return ScalarValue::Text(f.to_string());
            }
            ScalarValue::Text(value.to_string())
        }
    }
}

fn coerce_date(value: &Value) -> ScalarValue {
    let parsed = match value {
        Value::String(s) => parse_date(s),
        Value::Object(map) => match map.get("$date") {
            Some(Value::String(s)) => parse_date(s),
            Some(inner) => match coerce_integer(inner) {
                ScalarValue::Integer(millis) => {
                    DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.date_naive())
                }
                _ => None,
            },
            None => None,
        },
        _ => None,
    };

    parsed.map_or(ScalarValue::Null, ScalarValue::Date)
}

/// Parse the date part of an ISO date, datetime or RFC 3339 timestamp
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BackendKind;
    use serde_json::json;

    fn publication_schema() -> FieldSchema {
        FieldSchema::new(vec![
            FieldDef::text("title"),
            FieldDef::integer("year"),
            FieldDef::text("venue"),
            FieldDef::integer("citations"),
        ])
    }

    #[test]
    fn test_relational_tuple_is_zipped_positionally() {
        let raw = RawRows::Tuples {
            columns: vec!["title".into(), "year".into(), "venue".into(), "citations".into()],
            rows: vec![vec![json!("ML Survey"), json!(2020), json!("NeurIPS"), json!(150)]],
        };

        let set = normalize(raw, BackendKind::Relational, &publication_schema());

        assert_eq!(set.source, SourceTag::Relational);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(0, "title"), Some(&ScalarValue::text("ML Survey")));
        assert_eq!(set.get(0, "year"), Some(&ScalarValue::Integer(2020)));
        assert_eq!(set.get(0, "venue"), Some(&ScalarValue::text("NeurIPS")));
        assert_eq!(set.get(0, "citations"), Some(&ScalarValue::Integer(150)));
    }

    #[test]
    fn test_document_missing_keys_become_null() {
        let doc = json!({
            "_id": {"$oid": "65a1f0c2e4b0a1b2c3d4e5f6"},
            "title": "Graph Databases",
            "authors": ["Ada Lovelace", "Alan Turing"],
            "citations": {"$numberLong": "42"}
        });
        let raw = RawRows::Documents(vec![doc.as_object().unwrap().clone()]);
        let schema = FieldSchema::new(vec![
            FieldDef::text("title"),
            FieldDef::integer("year"),
            FieldDef::text("authors"),
            FieldDef::integer("citations"),
        ]);

        let set = normalize(raw, BackendKind::Document, &schema);

        assert_eq!(set.get(0, "year"), Some(&ScalarValue::Null));
        assert_eq!(
            set.get(0, "authors"),
            Some(&ScalarValue::text("Ada Lovelace, Alan Turing"))
        );
        assert_eq!(set.get(0, "citations"), Some(&ScalarValue::Integer(42)));
    }

    #[test]
    fn test_document_dotted_path() {
        let doc = json!({"venue": {"name": "VLDB", "year": "2019"}});
        let raw = RawRows::Documents(vec![doc.as_object().unwrap().clone()]);
        let schema = FieldSchema::new(vec![FieldDef::text("venue.name"), FieldDef::integer("venue.year")]);

        let set = normalize(raw, BackendKind::Document, &schema);
        assert_eq!(set.get(0, "venue.name"), Some(&ScalarValue::text("VLDB")));
        assert_eq!(set.get(0, "venue.year"), Some(&ScalarValue::Integer(2019)));
    }

    #[test]
    fn test_graph_record_projection() {
        let mut record = crate::types::DataRow::new();
        record.insert("collaborator".into(), json!("Grace Hopper"));
        record.insert("collaboration_count".into(), json!(3));
        record.insert("ignored".into(), json!(true));

        let schema = FieldSchema::new(vec![
            FieldDef::text("collaborator"),
            FieldDef::integer("collaboration_count"),
        ]);
        let set = normalize(RawRows::Records(vec![record]), BackendKind::Graph, &schema);

        assert_eq!(set.schema().len(), 2);
        assert_eq!(set.get(0, "collaboration_count"), Some(&ScalarValue::Integer(3)));
    }

    #[test]
    fn test_date_coercion_across_representations() {
        let expected = ScalarValue::Date(NaiveDate::from_ymd_opt(2021, 3, 14).unwrap());

        assert_eq!(coerce(&json!("2021-03-14"), FieldType::Date), expected);
        assert_eq!(coerce(&json!("2021-03-14T09:26:53Z"), FieldType::Date), expected);
        assert_eq!(coerce(&json!("2021-03-14 09:26:53.589"), FieldType::Date), expected);
        assert_eq!(
            coerce(&json!({"$date": "2021-03-14T09:26:53.589Z"}), FieldType::Date),
            expected
        );
        assert_eq!(
            coerce(&json!({"$date": {"$numberLong": "1615713000000"}}), FieldType::Date),
            expected
        );
    }

    #[test]
    fn test_unparseable_values_become_null() {
        assert_eq!(coerce(&json!("not a date"), FieldType::Date), ScalarValue::Null);
        assert_eq!(coerce(&json!("many"), FieldType::Integer), ScalarValue::Null);
        assert_eq!(coerce(&json!({"nested": 1}), FieldType::Float), ScalarValue::Null);
        assert_eq!(coerce(&json!(null), FieldType::Text), ScalarValue::Null);
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        assert_eq!(coerce(&json!("150"), FieldType::Integer), ScalarValue::Integer(150));
        assert_eq!(coerce(&json!("12.5"), FieldType::Float), ScalarValue::Float(12.5));
        assert_eq!(coerce(&json!(12.0), FieldType::Integer), ScalarValue::Integer(12));
        assert_eq!(coerce(&json!(7), FieldType::Float), ScalarValue::Float(7.0));
    }
}

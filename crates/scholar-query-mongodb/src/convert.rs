//! JSON <-> BSON conversion for filters, pipelines and results

use mongodb::bson::{Bson, Document};
use scholar_query::QueryError;
use serde_json::{Map, Value};

/// Parse an extended-JSON object into a BSON document; null is the empty document
pub fn to_document(value: &Value, what: &str) -> Result<Document, QueryError> {
    if value.is_null() {
        return Ok(Document::new());
    }

    match Bson::try_from(value.clone()) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(other) => Err(QueryError::Malformed(format!(
            "{} must be an object, got {:?}",
            what,
            other.element_type()
        ))),
        Err(e) => Err(QueryError::Serialization(format!("invalid {}: {}", what, e))),
    }
}

pub fn to_documents(values: &[Value], what: &str) -> Result<Vec<Document>, QueryError> {
    values.iter().map(|v| to_document(v, what)).collect()
}

/// Render a document as relaxed extended JSON
///
/// ObjectIds become `{"$oid": ..}`, dates `{"$date": ..}` and numbers plain
/// JSON numbers where they fit.
pub fn to_json_object(doc: Document) -> Map<String, Value> {
    match Bson::Document(doc).into_relaxed_extjson() {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

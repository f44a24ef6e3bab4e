//! Backend-native query and command descriptions
//!
//! Every query handed to an adapter is one of these values. User input only
//! ever travels as a bound parameter; the few names that must be spliced into
//! query text (tables, collections, labels, relationship types) go through
//! [`Identifier`] first.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::error::ValidationError;
use crate::types::{BackendKind, ScalarValue};

const MAX_IDENTIFIER_LEN: usize = 64;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
    })
}

/// A name that passed the allow-list and may be interpolated into query text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.len() > MAX_IDENTIFIER_LEN || !identifier_pattern().is_match(raw) {
            return Err(ValidationError::InvalidIdentifier(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Identifier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::parse(s)
    }
}

/// Named Cypher parameters
pub type NamedParams = BTreeMap<String, ScalarValue>;

/// Case-insensitive substring match for a document filter
///
/// The user text is regex-escaped, so `"C++ (ML)"` matches literally.
pub fn regex_contains(text: &str) -> serde_json::Value {
    serde_json::json!({ "$regex": regex::escape(text), "$options": "i" })
}

/// Document `find` with filter, projection, sort and limit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindQuery {
    pub collection: Identifier,
    pub filter: serde_json::Value,
    pub projection: Option<serde_json::Value>,
    pub sort: Option<serde_json::Value>,
    pub limit: Option<i64>,
}

impl FindQuery {
    pub fn new(collection: Identifier, filter: serde_json::Value) -> Self {
        Self {
            collection,
            filter,
            projection: None,
            sort: None,
            limit: None,
        }
    }

    pub fn with_projection(mut self, projection: serde_json::Value) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_sort(mut self, sort: serde_json::Value) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A read in the backend's own language
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NativeQuery {
    /// SQL text with `$1..$n` positional parameters
    Sql {
        text: String,
        params: Vec<ScalarValue>,
    },
    /// Document filter + projection
    Find(FindQuery),
    /// Document aggregation pipeline
    Aggregate {
        collection: Identifier,
        pipeline: Vec<serde_json::Value>,
    },
    /// Cypher text with `$name` parameters
    Cypher { text: String, params: NamedParams },
}

impl NativeQuery {
    pub fn sql(text: impl Into<String>, params: Vec<ScalarValue>) -> Self {
        NativeQuery::Sql {
            text: text.into(),
            params,
        }
    }

    pub fn cypher(text: impl Into<String>) -> Self {
        NativeQuery::Cypher {
            text: text.into(),
            params: NamedParams::new(),
        }
    }

    /// Bind a named parameter; no-op on non-Cypher queries
    pub fn param(mut self, name: &str, value: impl Into<ScalarValue>) -> Self {
        if let NativeQuery::Cypher { params, .. } = &mut self {
            params.insert(name.to_string(), value.into());
        }
        self
    }

    /// Backend whose language this query is written in
    pub fn backend(&self) -> BackendKind {
        match self {
            NativeQuery::Sql { .. } => BackendKind::Relational,
            NativeQuery::Find(_) | NativeQuery::Aggregate { .. } => BackendKind::Document,
            NativeQuery::Cypher { .. } => BackendKind::Graph,
        }
    }
}

impl fmt::Display for NativeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeQuery::Sql { text, .. } | NativeQuery::Cypher { text, .. } => {
                write!(f, "{}", text.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            NativeQuery::Find(find) => write!(f, "find {} {}", find.collection, find.filter),
            NativeQuery::Aggregate {
                collection,
                pipeline,
            } => write!(f, "aggregate {} ({} stages)", collection, pipeline.len()),
        }
    }
}

/// A mutation in the backend's own language
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NativeCommand {
    Sql {
        text: String,
        params: Vec<ScalarValue>,
    },
    InsertDocuments {
        collection: Identifier,
        documents: Vec<serde_json::Value>,
    },
    UpdateDocuments {
        collection: Identifier,
        filter: serde_json::Value,
        update: serde_json::Value,
        upsert: bool,
    },
    DeleteDocuments {
        collection: Identifier,
        filter: serde_json::Value,
    },
    /// Runs inside a write transaction
    Cypher { text: String, params: NamedParams },
}

impl NativeCommand {
    pub fn backend(&self) -> BackendKind {
        match self {
            NativeCommand::Sql { .. } => BackendKind::Relational,
            NativeCommand::InsertDocuments { .. }
            | NativeCommand::UpdateDocuments { .. }
            | NativeCommand::DeleteDocuments { .. } => BackendKind::Document,
            NativeCommand::Cypher { .. } => BackendKind::Graph,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_allow_list() {
        assert!(Identifier::parse("publication").is_ok());
        assert!(Identifier::parse("publication_author").is_ok());
        assert!(Identifier::parse("_Person2").is_ok());

        for bad in [
            "",
            "2fast",
            "Person) DETACH DELETE (n",
            "publications; DROP TABLE faculty",
            "AUTHORED`",
            "a-b",
        ] {
            assert_eq!(
                Identifier::parse(bad),
                Err(ValidationError::InvalidIdentifier(bad.to_string()))
            );
        }

        assert!(Identifier::parse(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_regex_contains_escapes_user_text() {
        let filter = regex_contains("C++ (ML)");
        assert_eq!(filter["$regex"], r"C\+\+ \(ML\)");
        assert_eq!(filter["$options"], "i");
    }

    #[test]
    fn test_cypher_params_bind() {
        let query = NativeQuery::cypher("MATCH (p:Person) WHERE p.name CONTAINS $name RETURN p")
            .param("name", "Ada");
        match &query {
            NativeQuery::Cypher { params, .. } => {
                assert_eq!(params.get("name"), Some(&ScalarValue::text("Ada")))
            }
            other => panic!("unexpected query {:?}", other),
        }
        assert_eq!(query.backend(), BackendKind::Graph);
    }

    #[test]
    fn test_display_collapses_whitespace() {
        let query = NativeQuery::sql("SELECT 1\n      FROM   dual", vec![]);
        assert_eq!(query.to_string(), "SELECT 1 FROM dual");
    }
}

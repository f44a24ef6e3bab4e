use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The three independently modelled stores
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Row tuples, SQL with positional parameters
    Relational,
    /// Documents, filter + projection
    Document,
    /// Named-field records, Cypher with named parameters
    Graph,
}

impl BackendKind {
    /// Fan-out order used by the federated search
    pub const ALL: [BackendKind; 3] = [
        BackendKind::Relational,
        BackendKind::Document,
        BackendKind::Graph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Relational => "relational",
            BackendKind::Document => "document",
            BackendKind::Graph => "graph",
        }
    }

    /// Product name shown to users
    pub fn label(&self) -> &'static str {
        match self {
            BackendKind::Relational => "PostgreSQL",
            BackendKind::Document => "MongoDB",
            BackendKind::Graph => "Neo4j",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provenance tag carried by every record set
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceTag {
    Relational,
    Document,
    Graph,
    /// Generated substitute, never real data
    SyntheticFallback,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Relational => "relational",
            SourceTag::Document => "document",
            SourceTag::Graph => "graph",
            SourceTag::SyntheticFallback => "synthetic-fallback",
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, SourceTag::SyntheticFallback)
    }

    pub fn backend(&self) -> Option<BackendKind> {
        match self {
            SourceTag::Relational => Some(BackendKind::Relational),
            SourceTag::Document => Some(BackendKind::Document),
            SourceTag::Graph => Some(BackendKind::Graph),
            SourceTag::SyntheticFallback => None,
        }
    }
}

impl From<BackendKind> for SourceTag {
    fn from(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Relational => SourceTag::Relational,
            BackendKind::Document => SourceTag::Document,
            BackendKind::Graph => SourceTag::Graph,
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical semantic type of a projected field
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Float,
    Text,
    /// ISO calendar date, day granularity
    Date,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Integer => write!(f, "integer"),
            FieldType::Float => write!(f, "float"),
            FieldType::Text => write!(f, "text"),
            FieldType::Date => write!(f, "date"),
        }
    }
}

/// Definition of a single field in a projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Float)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Date)
    }
}

/// Ordered field projection shared by every record of a set
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldSchema {
    fields: Vec<FieldDef>,
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<FieldDef> for FieldSchema {
    fn from_iter<I: IntoIterator<Item = FieldDef>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A normalized scalar
///
/// Ordering is total: null sorts first, then numbers (integers and floats
/// compared by value), then dates, then text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    Text(String),
}

impl ScalarValue {
    pub fn text(value: impl Into<String>) -> Self {
        ScalarValue::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Integer(v) => Some(*v as f64),
            ScalarValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Integer(v) => Some(*v),
            ScalarValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            ScalarValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Render for labels; null becomes "N/A"
    pub fn label(&self) -> String {
        match self {
            ScalarValue::Null => "N/A".to_string(),
            other => other.to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            ScalarValue::Null => 0,
            ScalarValue::Integer(_) | ScalarValue::Float(_) => 1,
            ScalarValue::Date(_) => 2,
            ScalarValue::Text(_) => 3,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Integer(v) => write!(f, "{}", v),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            ScalarValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl Ord for ScalarValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use ScalarValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            // Equal magnitudes still need a tie-break so Ord agrees with Eq
            (Integer(a), Float(b)) => (*a as f64).total_cmp(b).then(Ordering::Less),
            (Float(a), Integer(b)) => a.total_cmp(&(*b as f64)).then(Ordering::Greater),
            (Date(a), Date(b)) => a.cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for ScalarValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ScalarValue::Null => {}
            ScalarValue::Integer(v) => v.hash(state),
            ScalarValue::Float(v) => v.to_bits().hash(state),
            ScalarValue::Date(d) => d.hash(state),
            ScalarValue::Text(s) => s.hash(state),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Text(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Text(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Integer(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float(value)
    }
}

impl From<NaiveDate> for ScalarValue {
    fn from(value: NaiveDate) -> Self {
        ScalarValue::Date(value)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ScalarValue::Null)
    }
}

/// Values of one record, positionally aligned with its set's schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Vec<ScalarValue>);

impl Record {
    pub fn new(values: Vec<ScalarValue>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.0
    }

    pub fn value(&self, idx: usize) -> Option<&ScalarValue> {
        self.0.get(idx)
    }
}

/// Homogeneous, provenance-tagged sequence of records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    pub source: SourceTag,
    schema: FieldSchema,
    records: Vec<Record>,
}

impl RecordSet {
    pub fn empty(source: impl Into<SourceTag>, schema: FieldSchema) -> Self {
        Self {
            source: source.into(),
            schema,
            records: Vec::new(),
        }
    }

    /// Append a record, padding with nulls or truncating to the schema width
    pub fn push(&mut self, values: Vec<ScalarValue>) {
        let mut values = values;
        values.resize(self.schema.len(), ScalarValue::Null);
        self.records.push(Record(values));
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Value of `field` in record `row`
    pub fn get(&self, row: usize, field: &str) -> Option<&ScalarValue> {
        let idx = self.schema.index_of(field)?;
        self.records.get(row)?.value(idx)
    }

    /// Iterate one column; `None` if the field is not in the schema
    pub fn column<'a>(&'a self, field: &str) -> Option<impl Iterator<Item = &'a ScalarValue> + 'a> {
        let idx = self.schema.index_of(field)?;
        Some(self.records.iter().filter_map(move |r| r.value(idx)))
    }

    /// Records as JSON objects keyed by field name
    pub fn to_json_rows(&self) -> Vec<serde_json::Value> {
        self.records
            .iter()
            .map(|record| {
                let map: serde_json::Map<String, serde_json::Value> = self
                    .schema
                    .names()
                    .zip(record.values())
                    .map(|(name, value)| {
                        (
                            name.to_string(),
                            serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                        )
                    })
                    .collect();
                serde_json::Value::Object(map)
            })
            .collect()
    }
}

/// A row of a graph record or document keyed by field name
pub type DataRow = HashMap<String, serde_json::Value>;

/// Backend-native result shapes before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum RawRows {
    /// Relational row tuples with the column names reported by the driver
    Tuples {
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    },
    /// Documents in relaxed extended JSON
    Documents(Vec<serde_json::Map<String, serde_json::Value>>),
    /// Graph records keyed by RETURN alias
    Records(Vec<DataRow>),
}

impl RawRows {
    pub fn len(&self) -> usize {
        match self {
            RawRows::Tuples { rows, .. } => rows.len(),
            RawRows::Documents(docs) => docs.len(),
            RawRows::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Native shape produced by a backend, with no rows
    pub fn empty_for(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Relational => RawRows::Tuples {
                columns: Vec::new(),
                rows: Vec::new(),
            },
            BackendKind::Document => RawRows::Documents(Vec::new()),
            BackendKind::Graph => RawRows::Records(Vec::new()),
        }
    }
}

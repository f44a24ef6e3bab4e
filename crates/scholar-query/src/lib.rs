//! # scholar-query
//!
//! Federated query and aggregation core for the scholar dashboard.
//!
//! Three independently modelled stores hold overlapping publication data:
//! - PostgreSQL (relational, SQL with positional parameters)
//! - MongoDB (document, filter + projection or aggregation pipelines)
//! - Neo4j (graph, Cypher with named parameters)
//!
//! ## Architecture
//!
//! - **BackendAdapter**: connect/disconnect lifecycle plus single-attempt
//!   read/write primitives; the provided `execute_*` methods add one lazy
//!   reconnect per query
//! - **Liveness**: `is_live` / `reconnect` capability shared by all adapters
//! - **ConnectionRegistry**: process-wide owner of one adapter per backend,
//!   passed by reference to every query entry point
//! - **normalize**: native rows, documents and graph records to a
//!   provenance-tagged [`RecordSet`]
//! - **aggregate**: group-count, top-N, scalar stats, time buckets and
//!   keyword explosion over a record set
//!
//! ## Example
//!
//! ```rust
//! use scholar_query::{
//!     normalize, BackendKind, ConnectionRegistry, FieldDef, FieldSchema, NativeQuery,
//! };
//!
//! # async fn example(registry: &ConnectionRegistry) -> scholar_query::Result<()> {
//! let schema = FieldSchema::new(vec![FieldDef::text("title"), FieldDef::integer("year")]);
//!
//! if let Some(adapter) = registry.available(BackendKind::Relational).await {
//!     let query = NativeQuery::sql("SELECT title, year FROM publication LIMIT 5", vec![]);
//!     let raw = adapter.execute_read(&query).await?;
//!     let records = normalize(raw, BackendKind::Relational, &schema);
//!     println!("{} publications", records.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Backend crates:
//! - `scholar-query-postgres`
//! - `scholar-query-mongodb`
//! - `scholar-query-neo4j`

pub mod aggregate;
pub mod chart;
pub mod error;
pub mod native;
pub mod normalize;
pub mod registry;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export commonly used items
pub use aggregate::{Partition, ScalarStats};
pub use chart::{AggregationResult, ChartPayload, ScatterPoint, TimePoint, TimeSeries};
pub use error::{AggregationError, ConnectionError, DataError, QueryError, Result, ValidationError};
pub use native::{regex_contains, FindQuery, Identifier, NamedParams, NativeCommand, NativeQuery};
pub use normalize::normalize;
pub use registry::{
    AdapterFactory, BackendStatus, ConnectionDescriptor, ConnectionRegistry,
    DEFAULT_CONNECT_TIMEOUT,
};
pub use traits::{BackendAdapter, Liveness, SessionClock, LIVENESS_WINDOW};
pub use types::{
    BackendKind, DataRow, FieldDef, FieldSchema, FieldType, RawRows, Record, RecordSet,
    ScalarValue, SourceTag,
};

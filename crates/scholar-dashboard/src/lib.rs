//! Scholar dashboard request layer
//!
//! Turns dashboard requests into native queries against the backends held by
//! a [`scholar_query::ConnectionRegistry`], and the normalized results into
//! chart payloads with a one-line summary.
//!
//! - [`config`]: connection descriptors and schema names from the environment
//! - [`queries`]: the native query behind every widget
//! - [`search`]: federated person search across all three backends
//! - [`service`]: request validation and dispatch

pub mod config;
pub mod queries;
pub mod requests;
pub mod search;
pub mod service;

pub use config::{DashboardConfig, SchemaNames};
pub use queries::{Category, Lookup, QueryCatalogue};
pub use requests::{Request, MAX_COMPARISON_TERMS, MIN_COMPARISON_TERMS};
pub use search::{FederatedSearch, PersonReport, ReportSection, SearchOutcome, SearchState};
pub use service::{DashboardService, Response};

//! Dashboard configuration read from the environment
//!
//! Every backend has a set of required variables. When any of them is
//! missing the backend falls back to a built-in descriptor pointing at a
//! local server, so the dashboard still starts and simply reports that
//! backend as unavailable if nothing answers there.

use scholar_query::{BackendKind, ConnectionDescriptor, Identifier, DEFAULT_CONNECT_TIMEOUT};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Database used by the fallback descriptors
pub const DEFAULT_DATABASE: &str = "academicworld";

const DEFAULT_POSTGRES_HOST: &str = "localhost";
const DEFAULT_POSTGRES_PORT: u16 = 5432;
const DEFAULT_POSTGRES_USER: &str = "postgres";

const DEFAULT_MONGODB_HOST: &str = "localhost";
const DEFAULT_MONGODB_PORT: u16 = 27017;
const DEFAULT_MONGODB_AUTH_SOURCE: &str = "admin";
const DEFAULT_MONGODB_AUTH_MECHANISM: &str = "SCRAM-SHA-256";

const DEFAULT_NEO4J_URI: &str = "bolt://localhost:7687";
const DEFAULT_NEO4J_USER: &str = "neo4j";
const DEFAULT_NEO4J_DATABASE: &str = "neo4j";

/// Table and collection names spliced into query text
///
/// Each name has passed the identifier allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaNames {
    pub publication_table: Identifier,
    pub faculty_table: Identifier,
    pub authorship_table: Identifier,
    pub faculty_collection: Identifier,
    pub publication_collection: Identifier,
}

impl SchemaNames {
    fn default_identifier(name: &'static str) -> Identifier {
        match Identifier::parse(name) {
            Ok(identifier) => identifier,
            Err(_) => unreachable!("built-in schema name {name} is a valid identifier"),
        }
    }

    fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            publication_table: schema_name(lookup, "SCHOLAR_PUBLICATION_TABLE", "publication"),
            faculty_table: schema_name(lookup, "SCHOLAR_FACULTY_TABLE", "faculty"),
            authorship_table: schema_name(
                lookup,
                "SCHOLAR_AUTHORSHIP_TABLE",
                "publication_author",
            ),
            faculty_collection: schema_name(lookup, "SCHOLAR_FACULTY_COLLECTION", "faculty"),
            publication_collection: schema_name(
                lookup,
                "SCHOLAR_PUBLICATION_COLLECTION",
                "publications",
            ),
        }
    }
}

impl Default for SchemaNames {
    fn default() -> Self {
        Self {
            publication_table: Self::default_identifier("publication"),
            faculty_table: Self::default_identifier("faculty"),
            authorship_table: Self::default_identifier("publication_author"),
            faculty_collection: Self::default_identifier("faculty"),
            publication_collection: Self::default_identifier("publications"),
        }
    }
}

fn schema_name<F>(lookup: &F, var: &str, default: &'static str) -> Identifier
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, var) {
        Some(raw) => match Identifier::parse(&raw) {
            Ok(identifier) => identifier,
            Err(e) => {
                warn!("Ignoring {}: {}; using '{}'", var, e, default);
                SchemaNames::default_identifier(default)
            }
        },
        None => SchemaNames::default_identifier(default),
    }
}

/// Everything the dashboard needs to reach its three backends
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    pub relational: ConnectionDescriptor,
    pub document: ConnectionDescriptor,
    pub graph: ConnectionDescriptor,
    pub schema: SchemaNames,
    pub connect_timeout: Duration,
}

impl DashboardConfig {
    /// Read the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to
    /// its value
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let connect_timeout = match non_empty(&lookup, "SCHOLAR_CONNECT_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    warn!(
                        "Invalid SCHOLAR_CONNECT_TIMEOUT_SECS '{}', using {}s",
                        raw,
                        DEFAULT_CONNECT_TIMEOUT.as_secs()
                    );
                    DEFAULT_CONNECT_TIMEOUT
                }
            },
            None => DEFAULT_CONNECT_TIMEOUT,
        };

        let config = Self {
            relational: relational_descriptor(&lookup).with_connect_timeout(connect_timeout),
            document: document_descriptor(&lookup).with_connect_timeout(connect_timeout),
            graph: graph_descriptor(&lookup).with_connect_timeout(connect_timeout),
            schema: SchemaNames::from_lookup(&lookup),
            connect_timeout,
        };

        debug!(
            "Dashboard configuration: {}, {}, {}",
            config.relational.connection_string(),
            config.document.connection_string(),
            config.graph.connection_string()
        );
        config
    }

    /// Descriptors in fan-out order
    pub fn descriptors(&self) -> Vec<ConnectionDescriptor> {
        vec![
            self.relational.clone(),
            self.document.clone(),
            self.graph.clone(),
        ]
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn port<F>(lookup: &F, key: &str, default: u16) -> u16
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Invalid {} '{}', using {}", key, raw, default);
            default
        }),
        None => default,
    }
}

fn relational_descriptor<F>(lookup: &F) -> ConnectionDescriptor
where
    F: Fn(&str) -> Option<String>,
{
    let host = non_empty(lookup, "POSTGRES_HOST").unwrap_or_else(|| DEFAULT_POSTGRES_HOST.into());
    let port = port(lookup, "POSTGRES_PORT", DEFAULT_POSTGRES_PORT);

    match (
        non_empty(lookup, "POSTGRES_DATABASE"),
        non_empty(lookup, "POSTGRES_USER"),
        lookup("POSTGRES_PASSWORD"),
    ) {
        (Some(database), Some(user), Some(password)) => {
            ConnectionDescriptor::new(BackendKind::Relational, host)
                .with_port(port)
                .with_database(database)
                .with_username(user)
                .with_password(password)
        }
        _ => {
            warn!(
                "POSTGRES_DATABASE, POSTGRES_USER or POSTGRES_PASSWORD not set, \
                 using the default PostgreSQL descriptor"
            );
            ConnectionDescriptor::new(BackendKind::Relational, DEFAULT_POSTGRES_HOST)
                .with_port(DEFAULT_POSTGRES_PORT)
                .with_database(DEFAULT_DATABASE)
                .with_username(DEFAULT_POSTGRES_USER)
        }
    }
}

fn document_descriptor<F>(lookup: &F) -> ConnectionDescriptor
where
    F: Fn(&str) -> Option<String>,
{
    let auth_source = non_empty(lookup, "MONGODB_AUTH_SOURCE")
        .unwrap_or_else(|| DEFAULT_MONGODB_AUTH_SOURCE.into());
    let auth_mechanism = non_empty(lookup, "MONGODB_AUTH_MECHANISM")
        .unwrap_or_else(|| DEFAULT_MONGODB_AUTH_MECHANISM.into());

    let Some(database) = non_empty(lookup, "MONGODB_DATABASE") else {
        warn!("MONGODB_DATABASE not set, using the default MongoDB descriptor");
        return ConnectionDescriptor::new(BackendKind::Document, DEFAULT_MONGODB_HOST)
            .with_port(DEFAULT_MONGODB_PORT)
            .with_database(DEFAULT_DATABASE)
            .with_option("auth_source", auth_source)
            .with_option("auth_mechanism", auth_mechanism);
    };

    let host = non_empty(lookup, "MONGODB_HOST").unwrap_or_else(|| DEFAULT_MONGODB_HOST.into());
    let mut descriptor = ConnectionDescriptor::new(BackendKind::Document, host)
        .with_port(port(lookup, "MONGODB_PORT", DEFAULT_MONGODB_PORT))
        .with_database(database)
        .with_option("auth_source", auth_source)
        .with_option("auth_mechanism", auth_mechanism);

    // Credentials are optional for a local server
    if let Some(username) = non_empty(lookup, "MONGODB_USERNAME") {
        descriptor = descriptor.with_username(username);
        if let Some(password) = lookup("MONGODB_PASSWORD") {
            descriptor = descriptor.with_password(password);
        }
    }

    descriptor
}

fn graph_descriptor<F>(lookup: &F) -> ConnectionDescriptor
where
    F: Fn(&str) -> Option<String>,
{
    match (
        non_empty(lookup, "NEO4J_URI"),
        non_empty(lookup, "NEO4J_USERNAME"),
        lookup("NEO4J_PASSWORD"),
    ) {
        (Some(uri), Some(username), Some(password)) => {
            let database = non_empty(lookup, "NEO4J_DATABASE")
                .unwrap_or_else(|| DEFAULT_NEO4J_DATABASE.into());
            ConnectionDescriptor::new(BackendKind::Graph, uri)
                .with_username(username)
                .with_password(password)
                .with_database(database)
        }
        _ => {
            warn!(
                "NEO4J_URI, NEO4J_USERNAME or NEO4J_PASSWORD not set, \
                 using the default Neo4j descriptor"
            );
            ConnectionDescriptor::new(BackendKind::Graph, DEFAULT_NEO4J_URI)
                .with_username(DEFAULT_NEO4J_USER)
                .with_database(DEFAULT_DATABASE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = DashboardConfig::from_lookup(|_| None);

        assert_eq!(config.relational.host, "localhost");
        assert_eq!(config.relational.port, Some(5432));
        assert_eq!(config.relational.database.as_deref(), Some(DEFAULT_DATABASE));
        assert_eq!(config.relational.password, None);

        assert_eq!(config.document.port, Some(27017));
        assert_eq!(config.document.option("auth_source"), Some("admin"));
        assert_eq!(config.document.option("auth_mechanism"), Some("SCRAM-SHA-256"));

        assert_eq!(config.graph.host, "bolt://localhost:7687");
        assert_eq!(config.graph.database.as_deref(), Some(DEFAULT_DATABASE));

        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.schema, SchemaNames::default());
    }

    #[test]
    fn test_full_environment() {
        let config = DashboardConfig::from_lookup(lookup_from(&[
            ("POSTGRES_HOST", "pg.internal"),
            ("POSTGRES_PORT", "6543"),
            ("POSTGRES_DATABASE", "scholars"),
            ("POSTGRES_USER", "reader"),
            ("POSTGRES_PASSWORD", "secret"),
            ("MONGODB_HOST", "mongo.internal"),
            ("MONGODB_DATABASE", "scholars"),
            ("MONGODB_USERNAME", "reader"),
            ("MONGODB_PASSWORD", "p@ss"),
            ("MONGODB_AUTH_SOURCE", "scholars"),
            ("NEO4J_URI", "neo4j://graph.internal:7687"),
            ("NEO4J_USERNAME", "neo4j"),
            ("NEO4J_PASSWORD", "secret"),
            ("SCHOLAR_CONNECT_TIMEOUT_SECS", "2"),
        ]));

        assert_eq!(
            config.relational.connection_string(),
            "relational://reader@pg.internal:6543/scholars"
        );
        assert_eq!(config.relational.password.as_deref(), Some("secret"));

        assert_eq!(config.document.host, "mongo.internal");
        assert_eq!(config.document.username.as_deref(), Some("reader"));
        assert_eq!(config.document.password.as_deref(), Some("p@ss"));
        assert_eq!(config.document.option("auth_source"), Some("scholars"));

        assert_eq!(config.graph.host, "neo4j://graph.internal:7687");
        assert_eq!(config.graph.database.as_deref(), Some("neo4j"));

        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert!(config
            .descriptors()
            .iter()
            .all(|d| d.connect_timeout == Duration::from_secs(2)));
    }

    #[test]
    fn test_partial_relational_environment_falls_back() {
        let config = DashboardConfig::from_lookup(lookup_from(&[
            ("POSTGRES_HOST", "pg.internal"),
            ("POSTGRES_DATABASE", "scholars"),
        ]));

        assert_eq!(config.relational.host, "localhost");
        assert_eq!(config.relational.database.as_deref(), Some(DEFAULT_DATABASE));
    }

    #[test]
    fn test_invalid_numbers_keep_defaults() {
        let config = DashboardConfig::from_lookup(lookup_from(&[
            ("MONGODB_DATABASE", "scholars"),
            ("MONGODB_PORT", "not-a-port"),
            ("SCHOLAR_CONNECT_TIMEOUT_SECS", "0"),
        ]));

        assert_eq!(config.document.port, Some(27017));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_schema_name_overrides_are_validated() {
        let config = DashboardConfig::from_lookup(lookup_from(&[
            ("SCHOLAR_PUBLICATION_TABLE", "publications"),
            ("SCHOLAR_FACULTY_TABLE", "faculty; DROP TABLE faculty"),
        ]));

        assert_eq!(config.schema.publication_table.as_str(), "publications");
        assert_eq!(config.schema.faculty_table.as_str(), "faculty");
    }

    #[test]
    fn test_descriptors_in_fan_out_order() {
        let kinds: Vec<BackendKind> = DashboardConfig::default()
            .descriptors()
            .iter()
            .map(|d| d.kind)
            .collect();
        assert_eq!(kinds, BackendKind::ALL.to_vec());
    }
}

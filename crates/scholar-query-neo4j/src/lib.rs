//! Neo4j adapter for scholar-query
//!
//! Graph backend: Cypher with `$name` parameters in, named-field records out.
//! Liveness is proven with `RETURN 1`. Labels and relationship types can't
//! be bound as parameters, so every one spliced into query text is an
//! [`Identifier`].

use async_trait::async_trait;
use neo4rs::{query, BoltNull, BoltType, ConfigBuilder, Graph, Query};
use scholar_query::{
    AdapterFactory, BackendAdapter, BackendKind, ConnectionDescriptor, ConnectionError, DataRow,
    Identifier, Liveness, NamedParams, NativeCommand, NativeQuery, QueryError, RawRows, Result,
    ScalarValue, SessionClock,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

pub const DEFAULT_URI: &str = "bolt://localhost:7687";
pub const DEFAULT_DATABASE: &str = "neo4j";

const KIND: BackendKind = BackendKind::Graph;

/// Neo4j adapter
pub struct Neo4jAdapter {
    descriptor: ConnectionDescriptor,
    graph: RwLock<Option<Graph>>,
    open: AtomicBool,
    generation: AtomicU64,
    reconnect_lock: Mutex<()>,
    clock: SessionClock,
}

fn to_bolt(value: &ScalarValue) -> BoltType {
    match value {
        ScalarValue::Null => BoltType::Null(BoltNull),
        ScalarValue::Integer(v) => BoltType::from(*v),
        ScalarValue::Float(v) => BoltType::from(*v),
        ScalarValue::Date(d) => BoltType::from(*d),
        ScalarValue::Text(s) => BoltType::from(s.as_str()),
    }
}

fn build_query(text: &str, params: &NamedParams) -> Query {
    params
        .iter()
        .fold(query(text), |q, (name, value)| q.param(name, to_bolt(value)))
}

impl Neo4jAdapter {
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self {
            descriptor,
            graph: RwLock::new(None),
            open: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            reconnect_lock: Mutex::new(()),
            clock: SessionClock::new(),
        }
    }

    /// Bolt URI; a bare host gets the descriptor's port appended
    pub fn bolt_uri(&self) -> String {
        let host = self.descriptor.host.as_str();

        if host.is_empty() {
            return DEFAULT_URI.to_string();
        }
        if host.contains("://") {
            return host.to_string();
        }

        match self.descriptor.port {
            Some(port) => format!("{}:{}", host, port),
            None => format!("{}:7687", host),
        }
    }

    pub fn database_name(&self) -> &str {
        self.descriptor.database.as_deref().unwrap_or(DEFAULT_DATABASE)
    }

    fn timeout_error(&self) -> ConnectionError {
        ConnectionError::Timeout {
            backend: KIND,
            timeout_ms: self.descriptor.connect_timeout.as_millis() as u64,
        }
    }

    async fn open_session(&self) -> std::result::Result<Graph, ConnectionError> {
        let timeout = self.descriptor.connect_timeout;

        let config = ConfigBuilder::default()
            .uri(self.bolt_uri())
            .user(self.descriptor.username.as_deref().unwrap_or("neo4j"))
            .password(self.descriptor.password.as_deref().unwrap_or(""))
            .db(self.database_name())
            .build()
            .map_err(|e| ConnectionError::invalid_configuration(KIND, e.to_string()))?;

        debug!(
            "Connecting to Neo4j: {}",
            self.descriptor.connection_string()
        );

        let graph = match tokio::time::timeout(timeout, Graph::connect(config)).await {
            Ok(Ok(graph)) => graph,
            Ok(Err(e)) => return Err(classify_connect_error(&e)),
            Err(_) => return Err(self.timeout_error()),
        };

        match tokio::time::timeout(timeout, graph.run(query("RETURN 1"))).await {
            Ok(Ok(())) => Ok(graph),
            Ok(Err(e)) => Err(classify_connect_error(&e)),
            Err(_) => Err(self.timeout_error()),
        }
    }

    async fn session(&self) -> std::result::Result<Graph, QueryError> {
        self.graph
            .read()
            .await
            .clone()
            .ok_or_else(|| QueryError::NotConnected("Neo4j session is closed".to_string()))
    }

    async fn single_count(&self, text: String) -> Result<u64> {
        let raw = self.execute_read(&NativeQuery::cypher(text)).await?;
        let count = match raw {
            RawRows::Records(records) => records
                .first()
                .and_then(|r| r.get("count"))
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0),
            _ => 0,
        };
        Ok(count)
    }

    async fn string_column(&self, text: &str, column: &str) -> Result<Vec<String>> {
        let raw = self.execute_read(&NativeQuery::cypher(text)).await?;
        let values = match raw {
            RawRows::Records(records) => records
                .iter()
                .filter_map(|r| r.get(column).and_then(|v| v.as_str()).map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        Ok(values)
    }

    /// Nodes, optionally restricted to one label
    pub async fn node_count(&self, label: Option<&str>) -> Result<u64> {
        let text = match label {
            Some(label) => format!(
                "MATCH (n:{}) RETURN count(n) AS count",
                Identifier::parse(label)?
            ),
            None => "MATCH (n) RETURN count(n) AS count".to_string(),
        };
        self.single_count(text).await
    }

    /// Relationships, optionally restricted to one type
    pub async fn relationship_count(&self, rel_type: Option<&str>) -> Result<u64> {
        let text = match rel_type {
            Some(rel_type) => format!(
                "MATCH ()-[r:{}]->() RETURN count(r) AS count",
                Identifier::parse(rel_type)?
            ),
            None => "MATCH ()-[r]->() RETURN count(r) AS count".to_string(),
        };
        self.single_count(text).await
    }

    pub async fn labels(&self) -> Result<Vec<String>> {
        self.string_column(
            "CALL db.labels() YIELD label RETURN label ORDER BY label",
            "label",
        )
        .await
    }

    pub async fn relationship_types(&self) -> Result<Vec<String>> {
        self.string_column(
            "CALL db.relationshipTypes() YIELD relationshipType \
             RETURN relationshipType ORDER BY relationshipType",
            "relationshipType",
        )
        .await
    }
}

fn classify_connect_error(e: &neo4rs::Error) -> ConnectionError {
    match e {
        neo4rs::Error::AuthenticationError(message) => {
            ConnectionError::auth_rejected(KIND, message.clone())
        }
        neo4rs::Error::IOError { .. } | neo4rs::Error::ConnectionError => {
            ConnectionError::unreachable(KIND, e.to_string())
        }
        _ => ConnectionError::probe_failed(KIND, e.to_string()),
    }
}

fn classify_query_error(e: &neo4rs::Error, cypher: &str) -> QueryError {
    match e {
        neo4rs::Error::IOError { .. } | neo4rs::Error::ConnectionError => {
            QueryError::ConnectionLost(e.to_string())
        }
        _ => {
            let message = e.to_string();
            error!("Neo4j query failed: {}", message);
            error!("Failed Cypher: {}", cypher);

            if message.contains("SyntaxError") || message.contains("Neo.ClientError.Statement") {
                QueryError::Malformed(format!("{}\n\nQuery: {}", message, cypher))
            } else {
                QueryError::Failed(format!("{}\n\nQuery: {}", message, cypher))
            }
        }
    }
}

fn row_to_record(row: &neo4rs::Row) -> std::result::Result<DataRow, QueryError> {
    row.to::<DataRow>()
        .map_err(|e| QueryError::Serialization(format!("Neo4j record: {}", e)))
}

#[async_trait]
impl Liveness for Neo4jAdapter {
    async fn is_live(&self) -> bool {
        let Ok(graph) = self.session().await else {
            return false;
        };

        matches!(
            tokio::time::timeout(
                self.descriptor.connect_timeout,
                graph.run(query("RETURN 1"))
            )
            .await,
            Ok(Ok(()))
        )
    }

    async fn reconnect(&self) -> std::result::Result<(), ConnectionError> {
        let seen = self.generation.load(Ordering::SeqCst);
        let _guard = self.reconnect_lock.lock().await;

        if self.generation.load(Ordering::SeqCst) != seen && self.is_live().await {
            debug!("Neo4j session already re-opened");
            return Ok(());
        }

        info!("Reconnecting to Neo4j");
        self.disconnect().await;
        self.connect().await
    }
}

#[async_trait]
impl BackendAdapter for Neo4jAdapter {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    async fn connect(&self) -> std::result::Result<(), ConnectionError> {
        let graph = self.open_session().await?;

        *self.graph.write().await = Some(graph);
        self.open.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);

        debug!("Connected to Neo4j database: {}", self.database_name());
        Ok(())
    }

    async fn disconnect(&self) {
        self.open.store(false, Ordering::SeqCst);

        if self.graph.write().await.take().is_some() {
            debug!("Closing Neo4j connection pool");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn session_clock(&self) -> &SessionClock {
        &self.clock
    }

    async fn read_once(&self, native: &NativeQuery) -> std::result::Result<RawRows, QueryError> {
        let NativeQuery::Cypher { text, params } = native else {
            return Err(QueryError::unsupported(format!(
                "Neo4j cannot run: {}",
                native
            )));
        };

        let graph = self.session().await?;
        let mut stream = graph
            .execute(build_query(text, params))
            .await
            .map_err(|e| classify_query_error(&e, text))?;

        let mut records = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| classify_query_error(&e, text))?
        {
            records.push(row_to_record(&row)?);
        }

        debug!("Cypher returned {} records", records.len());
        Ok(RawRows::Records(records))
    }

    /// Runs the statement in its own transaction; the affected count is the
    /// number of rows the statement returns
    async fn write_once(&self, command: &NativeCommand) -> std::result::Result<u64, QueryError> {
        let NativeCommand::Cypher { text, params } = command else {
            return Err(QueryError::unsupported(
                "Neo4j only executes Cypher commands",
            ));
        };

        let graph = self.session().await?;
        let mut txn = graph
            .start_txn()
            .await
            .map_err(|e| classify_query_error(&e, text))?;

        let mut stream = txn
            .execute(build_query(text, params))
            .await
            .map_err(|e| classify_query_error(&e, text))?;

        let mut affected = 0u64;
        while stream
            .next(txn.handle())
            .await
            .map_err(|e| classify_query_error(&e, text))?
            .is_some()
        {
            affected += 1;
        }

        txn.commit()
            .await
            .map_err(|e| classify_query_error(&e, text))?;
        Ok(affected)
    }
}

/// Factory for Neo4j adapters
pub struct Neo4jAdapterFactory;

impl AdapterFactory for Neo4jAdapterFactory {
    fn backend_kind(&self) -> BackendKind {
        KIND
    }

    fn create_adapter(&self, descriptor: ConnectionDescriptor) -> Arc<dyn BackendAdapter> {
        Arc::new(Neo4jAdapter::new(descriptor))
    }
}

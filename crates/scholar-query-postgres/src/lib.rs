//! PostgreSQL adapter for scholar-query
//!
//! Relational backend: SQL text with positional `$n` parameters in, row
//! tuples out. Liveness is proven with `SELECT 1`.

mod convert;

use async_trait::async_trait;
use scholar_query::{
    AdapterFactory, BackendAdapter, BackendKind, ConnectionDescriptor, ConnectionError,
    Identifier, Liveness, NativeCommand, NativeQuery, QueryError, RawRows, Result, SessionClock,
};
use std::error::Error as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio_postgres::error::{DbError, SqlState};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config, NoTls};
use tracing::{debug, error, info, warn};

pub use convert::{FiniteNumeric, SqlParam};

pub const DEFAULT_PORT: u16 = 5432;

const KIND: BackendKind = BackendKind::Relational;

/// PostgreSQL adapter
pub struct PostgresAdapter {
    descriptor: ConnectionDescriptor,
    client: RwLock<Option<Client>>,
    open: AtomicBool,
    /// Bumped on every successful connect
    generation: AtomicU64,
    reconnect_lock: Mutex<()>,
    clock: SessionClock,
}

impl PostgresAdapter {
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self {
            descriptor,
            client: RwLock::new(None),
            open: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            reconnect_lock: Mutex::new(()),
            clock: SessionClock::new(),
        }
    }

    /// Driver configuration built from the descriptor
    pub fn pg_config(&self) -> Config {
        let descriptor = &self.descriptor;
        let mut config = Config::new();

        config
            .host(descriptor.host.as_str())
            .port(descriptor.port.unwrap_or(DEFAULT_PORT))
            .connect_timeout(descriptor.connect_timeout)
            .application_name("scholar-dashboard");

        if let Some(user) = &descriptor.username {
            config.user(user.as_str());
        }
        if let Some(password) = &descriptor.password {
            config.password(password.as_str());
        }
        if let Some(database) = &descriptor.database {
            config.dbname(database.as_str());
        }

        config
    }

    fn timeout_error(&self) -> ConnectionError {
        ConnectionError::Timeout {
            backend: KIND,
            timeout_ms: self.descriptor.connect_timeout.as_millis() as u64,
        }
    }

    async fn open_session(&self) -> std::result::Result<Client, ConnectionError> {
        let timeout = self.descriptor.connect_timeout;
        let config = self.pg_config();

        debug!(
            "Connecting to PostgreSQL: {}",
            self.descriptor.connection_string()
        );

        let (client, connection) = tokio::time::timeout(timeout, config.connect(NoTls))
            .await
            .map_err(|_| self.timeout_error())?
            .map_err(|e| classify_connect_error(&e))?;

        // Spawn connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        match tokio::time::timeout(timeout, client.simple_query("SELECT 1")).await {
            Ok(Ok(_)) => Ok(client),
            Ok(Err(e)) => Err(ConnectionError::probe_failed(KIND, describe(&e))),
            Err(_) => Err(self.timeout_error()),
        }
    }

    /// Base tables of the current schema
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let query = NativeQuery::sql(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
            vec![],
        );

        let raw = self.execute_read(&query).await?;
        let tables = first_column(raw)
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect::<Vec<_>>();

        debug!("Found {} tables", tables.len());
        Ok(tables)
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let table = Identifier::parse(table)?;
        let query = NativeQuery::sql(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )
            "#,
            vec![table.as_str().into()],
        );

        let raw = self.execute_read(&query).await?;
        Ok(first_column(raw).next().and_then(|v| v.as_bool()).unwrap_or(false))
    }

    pub async fn row_count(&self, table: &str) -> Result<i64> {
        let table = Identifier::parse(table)?;
        let query = NativeQuery::sql(format!("SELECT COUNT(*) FROM {}", table), vec![]);

        let raw = self.execute_read(&query).await?;
        Ok(first_column(raw).next().and_then(|v| v.as_i64()).unwrap_or(0))
    }
}

fn first_column(raw: RawRows) -> impl Iterator<Item = serde_json::Value> {
    let rows = match raw {
        RawRows::Tuples { rows, .. } => rows,
        _ => Vec::new(),
    };
    rows.into_iter().filter_map(|row| row.into_iter().next())
}

/// Detailed message from a PostgreSQL error
fn describe(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db_error) => describe_db_error(db_error),
        // Non-database error (connection error, etc.)
        None => e.to_string(),
    }
}

fn describe_db_error(db_error: &DbError) -> String {
    let mut msg = db_error.message().to_string();

    if let Some(detail) = db_error.detail() {
        msg.push_str(&format!("\nDetail: {}", detail));
    }

    if let Some(hint) = db_error.hint() {
        msg.push_str(&format!("\nHint: {}", hint));
    }

    if let Some(position) = db_error.position() {
        msg.push_str(&format!("\nPosition: {:?}", position));
    }

    msg
}

fn classify_connect_error(e: &tokio_postgres::Error) -> ConnectionError {
    let message = describe(e);

    match e.code() {
        Some(code)
            if *code == SqlState::INVALID_PASSWORD
                || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION =>
        {
            ConnectionError::auth_rejected(KIND, message)
        }
        Some(code) if *code == SqlState::INVALID_CATALOG_NAME => {
            ConnectionError::invalid_configuration(KIND, message)
        }
        _ => ConnectionError::unreachable(KIND, message),
    }
}

fn classify_query_error(e: &tokio_postgres::Error, sql: &str) -> QueryError {
    if e.is_closed() {
        return QueryError::ConnectionLost(e.to_string());
    }

    let Some(db_error) = e.as_db_error() else {
        let io_failure = e
            .source()
            .and_then(|source| source.downcast_ref::<std::io::Error>())
            .is_some();
        return if io_failure {
            QueryError::ConnectionLost(e.to_string())
        } else {
            QueryError::Failed(e.to_string())
        };
    };

    let msg = describe_db_error(db_error);
    error!("PostgreSQL query failed: {}", msg);
    error!("Failed SQL: {}", sql);

    let class = &db_error.code().code()[..2];
    match class {
        // syntax error or access rule violation
        "42" => QueryError::Malformed(format!("{}\n\nQuery: {}", msg, sql)),
        // connection exception, operator intervention
        "08" | "57" => QueryError::ConnectionLost(msg),
        _ => QueryError::Failed(format!("{}\n\nQuery: {}", msg, sql)),
    }
}

fn not_connected() -> QueryError {
    QueryError::NotConnected("PostgreSQL session is closed".to_string())
}

fn bind(params: &[scholar_query::ScalarValue]) -> Vec<SqlParam<'_>> {
    params.iter().map(SqlParam).collect()
}

fn as_refs<'a>(bound: &'a [SqlParam<'a>]) -> Vec<&'a (dyn ToSql + Sync)> {
    bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

#[async_trait]
impl Liveness for PostgresAdapter {
    async fn is_live(&self) -> bool {
        let guard = self.client.read().await;
        let Some(client) = guard.as_ref() else {
            return false;
        };

        if client.is_closed() {
            return false;
        }

        matches!(
            tokio::time::timeout(self.descriptor.connect_timeout, client.simple_query("SELECT 1"))
                .await,
            Ok(Ok(_))
        )
    }

    async fn reconnect(&self) -> std::result::Result<(), ConnectionError> {
        let seen = self.generation.load(Ordering::SeqCst);
        let _guard = self.reconnect_lock.lock().await;

        if self.generation.load(Ordering::SeqCst) != seen && self.is_live().await {
            debug!("PostgreSQL session already re-opened");
            return Ok(());
        }

        info!("Reconnecting to PostgreSQL");
        self.disconnect().await;
        self.connect().await
    }
}

#[async_trait]
impl BackendAdapter for PostgresAdapter {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    async fn connect(&self) -> std::result::Result<(), ConnectionError> {
        let client = self.open_session().await?;

        *self.client.write().await = Some(client);
        self.open.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);

        debug!(
            "Successfully connected to PostgreSQL database: {}",
            self.descriptor.database.as_deref().unwrap_or("postgres")
        );
        Ok(())
    }

    async fn disconnect(&self) {
        self.open.store(false, Ordering::SeqCst);

        if self.client.write().await.take().is_some() {
            debug!("Closing PostgreSQL connection");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn session_clock(&self) -> &SessionClock {
        &self.clock
    }

    async fn read_once(&self, query: &NativeQuery) -> std::result::Result<RawRows, QueryError> {
        let NativeQuery::Sql { text, params } = query else {
            return Err(QueryError::unsupported(format!(
                "PostgreSQL cannot run: {}",
                query
            )));
        };

        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or_else(not_connected)?;

        let bound = bind(params);
        let start = Instant::now();

        let rows = client
            .query(text.as_str(), &as_refs(&bound))
            .await
            .map_err(|e| classify_query_error(&e, text))?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows: Vec<Vec<serde_json::Value>> = rows.iter().map(convert::row_values).collect();

        debug!(
            "SQL returned {} rows in {}ms",
            rows.len(),
            start.elapsed().as_millis()
        );

        Ok(RawRows::Tuples { columns, rows })
    }

    async fn write_once(&self, command: &NativeCommand) -> std::result::Result<u64, QueryError> {
        let NativeCommand::Sql { text, params } = command else {
            return Err(QueryError::unsupported(
                "PostgreSQL only executes SQL commands",
            ));
        };

        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or_else(not_connected)?;

        let bound = bind(params);
        let affected = client
            .execute(text.as_str(), &as_refs(&bound))
            .await
            .map_err(|e| classify_query_error(&e, text))?;

        if affected == 0 {
            warn!("SQL command affected no rows");
        }
        Ok(affected)
    }
}

/// Factory for PostgreSQL adapters
pub struct PostgresAdapterFactory;

impl AdapterFactory for PostgresAdapterFactory {
    fn backend_kind(&self) -> BackendKind {
        KIND
    }

    fn create_adapter(&self, descriptor: ConnectionDescriptor) -> Arc<dyn BackendAdapter> {
        Arc::new(PostgresAdapter::new(descriptor))
    }
}

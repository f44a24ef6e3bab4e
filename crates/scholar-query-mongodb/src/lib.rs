//! MongoDB adapter for scholar-query
//!
//! Document backend: filter + projection finds and aggregation pipelines in,
//! documents (relaxed extended JSON) out. Liveness is proven with an
//! administrative `ping`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use scholar_query::{BackendAdapter, BackendKind, ConnectionDescriptor};
//! use scholar_query_mongodb::MongoAdapter;
//!
//! # async fn example() -> scholar_query::Result<()> {
//! let descriptor = ConnectionDescriptor::new(BackendKind::Document, "localhost")
//!     .with_port(27017)
//!     .with_database("academicworld");
//! let adapter = MongoAdapter::new(descriptor);
//! adapter.connect().await?;
//!
//! let collections = adapter.list_collections().await?;
//! # Ok(())
//! # }
//! ```

mod convert;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use scholar_query::{
    AdapterFactory, BackendAdapter, BackendKind, ConnectionDescriptor, ConnectionError,
    FindQuery, Identifier, Liveness, NativeCommand, NativeQuery, QueryError, RawRows, Result,
    SessionClock,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

pub use convert::{to_document, to_json_object};

pub const DEFAULT_PORT: u16 = 27017;
pub const DEFAULT_AUTH_SOURCE: &str = "admin";
pub const DEFAULT_AUTH_MECHANISM: &str = "SCRAM-SHA-256";
const DEFAULT_DATABASE: &str = "test";

const KIND: BackendKind = BackendKind::Document;

/// MongoDB adapter
pub struct MongoAdapter {
    descriptor: ConnectionDescriptor,
    client: RwLock<Option<Client>>,
    open: AtomicBool,
    generation: AtomicU64,
    reconnect_lock: Mutex<()>,
    clock: SessionClock,
}

impl MongoAdapter {
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

    /// Connection URI including credentials; never log this
    ///
    /// A host that already is a `mongodb://` or `mongodb+srv://` URI is used
    /// as given.
    pub fn connection_uri(&self) -> String {
        let descriptor = &self.descriptor;

        if descriptor.host.starts_with("mongodb://") || descriptor.host.starts_with("mongodb+srv://")
        {
            return descriptor.host.clone();
        }

        let port = descriptor.port.unwrap_or(DEFAULT_PORT);

        match (&descriptor.username, &descriptor.password) {
            (Some(username), Some(password)) => format!(
                "mongodb://{}:{}@{}:{}/?authSource={}&authMechanism={}",
                urlencoding::encode(username),
                urlencoding::encode(password),
                descriptor.host,
                port,
                descriptor
                    .option("auth_source")
                    .unwrap_or(DEFAULT_AUTH_SOURCE),
                descriptor
                    .option("auth_mechanism")
                    .unwrap_or(DEFAULT_AUTH_MECHANISM),
            ),
            _ => format!("mongodb://{}:{}/", descriptor.host, port),
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

    async fn open_session(&self) -> std::result::Result<Client, ConnectionError> {
        let timeout = self.descriptor.connect_timeout;

        debug!(
            "Creating MongoDB client for {}",
            self.descriptor.connection_string()
        );

        let mut options = ClientOptions::parse(self.connection_uri())
            .await
            .map_err(|e| {
                error!("Failed to parse MongoDB URL: {}", e);
                ConnectionError::invalid_configuration(KIND, e.to_string())
            })?;
        options.server_selection_timeout = Some(timeout);
        options.connect_timeout = Some(timeout);
        options.app_name = Some("scholar-dashboard".to_string());

        let client = Client::with_options(options)
            .map_err(|e| ConnectionError::invalid_configuration(KIND, e.to_string()))?;

        match tokio::time::timeout(timeout, ping(&client)).await {
            Ok(Ok(())) => Ok(client),
            Ok(Err(e)) => Err(classify_connect_error(&e)),
            Err(_) => Err(self.timeout_error()),
        }
    }

    async fn session(&self) -> std::result::Result<Client, QueryError> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| QueryError::NotConnected("MongoDB session is closed".to_string()))
    }

    /// Database handle, reconnecting a stale session first
    async fn live_database(&self) -> std::result::Result<Database, QueryError> {
        if !(self.is_open() && self.is_live().await) {
            self.reconnect().await?;
        }
        Ok(self.session().await?.database(self.database_name()))
    }

    /// Collection names of the configured database, sorted
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        let db = self.live_database().await?;

        debug!("Listing collections in database: {}", self.database_name());
        let mut names = db
            .list_collection_names()
            .await
            .map_err(|e| classify_query_error(&e))?;
        names.sort();

        debug!("Found {} collections", names.len());
        Ok(names)
    }

    /// Number of documents matching `filter`
    pub async fn count_documents(&self, collection: &str, filter: serde_json::Value) -> Result<u64> {
        let collection = Identifier::parse(collection)?;
        let query = NativeQuery::Aggregate {
            collection,
            pipeline: vec![json!({ "$match": filter }), json!({ "$count": "n" })],
        };

        let count = match self.execute_read(&query).await? {
            RawRows::Documents(docs) => docs
                .first()
                .and_then(|doc| doc.get("n"))
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0),
            _ => 0,
        };
        Ok(count)
    }

    async fn find(&self, db: &Database, query: &FindQuery) -> std::result::Result<Vec<Document>, QueryError> {
        let collection = db.collection::<Document>(query.collection.as_str());
        let filter = convert::to_document(&query.filter, "filter")?;

        let mut action = collection.find(filter);
        if let Some(projection) = &query.projection {
            action = action.projection(convert::to_document(projection, "projection")?);
        }
        if let Some(sort) = &query.sort {
            action = action.sort(convert::to_document(sort, "sort")?);
        }
        if let Some(limit) = query.limit {
            action = action.limit(limit);
        }

        let cursor = action.await.map_err(|e| classify_query_error(&e))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| classify_query_error(&e))
    }
}

async fn ping(client: &Client) -> std::result::Result<(), MongoError> {
    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await
        .map(|_| ())
}

fn classify_connect_error(e: &MongoError) -> ConnectionError {
    match e.kind.as_ref() {
        ErrorKind::Authentication { .. } => ConnectionError::auth_rejected(KIND, e.to_string()),
        ErrorKind::InvalidArgument { .. } => {
            ConnectionError::invalid_configuration(KIND, e.to_string())
        }
        ErrorKind::Command(_) => ConnectionError::probe_failed(KIND, e.to_string()),
        _ => ConnectionError::unreachable(KIND, e.to_string()),
    }
}

fn classify_query_error(e: &MongoError) -> QueryError {
    match e.kind.as_ref() {
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. } => {
            QueryError::ConnectionLost(e.to_string())
        }
        ErrorKind::InvalidArgument { .. } => QueryError::Malformed(e.to_string()),
        // BadValue, FailedToParse
        ErrorKind::Command(command) if matches!(command.code, 2 | 9) => {
            QueryError::Malformed(e.to_string())
        }
        ErrorKind::BsonDeserialization(_) | ErrorKind::BsonSerialization(_) => {
            QueryError::Serialization(e.to_string())
        }
        _ => {
            error!("MongoDB operation failed: {}", e);
            QueryError::Failed(e.to_string())
        }
    }
}

#[async_trait]
impl Liveness for MongoAdapter {
    async fn is_live(&self) -> bool {
        let Ok(client) = self.session().await else {
            return false;
        };

        matches!(
            tokio::time::timeout(self.descriptor.connect_timeout, ping(&client)).await,
            Ok(Ok(()))
        )
    }

    async fn reconnect(&self) -> std::result::Result<(), ConnectionError> {
        let seen = self.generation.load(Ordering::SeqCst);
        let _guard = self.reconnect_lock.lock().await;

        if self.generation.load(Ordering::SeqCst) != seen && self.is_live().await {
            debug!("MongoDB session already re-opened");
            return Ok(());
        }

        info!("Reconnecting to MongoDB");
        self.disconnect().await;
        self.connect().await
    }
}

#[async_trait]
impl BackendAdapter for MongoAdapter {
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

        debug!("MongoDB client created successfully");
        Ok(())
    }

    async fn disconnect(&self) {
        self.open.store(false, Ordering::SeqCst);

        if self.client.write().await.take().is_some() {
            debug!("Closing MongoDB connection");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn session_clock(&self) -> &SessionClock {
        &self.clock
    }

    async fn read_once(&self, query: &NativeQuery) -> std::result::Result<RawRows, QueryError> {
        let db = self.session().await?.database(self.database_name());

        let docs = match query {
            NativeQuery::Find(find) => self.find(&db, find).await?,
            NativeQuery::Aggregate {
                collection,
                pipeline,
            } => {
                let pipeline = convert::to_documents(pipeline, "pipeline stage")?;
                let cursor = db
                    .collection::<Document>(collection.as_str())
                    .aggregate(pipeline)
                    .await
                    .map_err(|e| classify_query_error(&e))?;
                cursor
                    .try_collect::<Vec<Document>>()
                    .await
                    .map_err(|e| classify_query_error(&e))?
            }
            other => {
                return Err(QueryError::unsupported(format!(
                    "MongoDB cannot run: {}",
                    other
                )))
            }
        };

        debug!("MongoDB returned {} documents for {}", docs.len(), query);
        Ok(RawRows::Documents(
            docs.into_iter().map(convert::to_json_object).collect(),
        ))
    }

    async fn write_once(&self, command: &NativeCommand) -> std::result::Result<u64, QueryError> {
        let db = self.session().await?.database(self.database_name());

        match command {
            NativeCommand::InsertDocuments {
                collection,
                documents,
            } => {
                let documents = convert::to_documents(documents, "document")?;
                if documents.is_empty() {
                    return Ok(0);
                }
                let result = db
                    .collection::<Document>(collection.as_str())
                    .insert_many(documents)
                    .await
                    .map_err(|e| classify_query_error(&e))?;
                Ok(result.inserted_ids.len() as u64)
            }
            NativeCommand::UpdateDocuments {
                collection,
                filter,
                update,
                upsert,
            } => {
                let filter = convert::to_document(filter, "filter")?;
                let update = convert::to_document(update, "update")?;
                let result = db
                    .collection::<Document>(collection.as_str())
                    .update_many(filter, update)
                    .upsert(*upsert)
                    .await
                    .map_err(|e| classify_query_error(&e))?;
                Ok(result.modified_count + u64::from(result.upserted_id.is_some()))
            }
            NativeCommand::DeleteDocuments { collection, filter } => {
                let filter = convert::to_document(filter, "filter")?;
                let result = db
                    .collection::<Document>(collection.as_str())
                    .delete_many(filter)
                    .await
                    .map_err(|e| classify_query_error(&e))?;
                Ok(result.deleted_count)
            }
            other => Err(QueryError::unsupported(format!(
                "MongoDB cannot run {:?} commands",
                other.backend()
            ))),
        }
    }
}

/// Factory for MongoDB adapters
pub struct MongoAdapterFactory;

impl AdapterFactory for MongoAdapterFactory {
    fn backend_kind(&self) -> BackendKind {
        KIND
    }

    fn create_adapter(&self, descriptor: ConnectionDescriptor) -> Arc<dyn BackendAdapter> {
        Arc::new(MongoAdapter::new(descriptor))
    }
}

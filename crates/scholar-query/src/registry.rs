use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::ConnectionError;
use crate::traits::BackendAdapter;
use crate::types::BackendKind;

/// Default bound on connect and liveness probe
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Immutable description of how to reach one backend
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDescriptor {
    pub kind: BackendKind,
    /// Host name, or a full URI for backends addressed that way
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Database, schema or graph namespace
    pub database: Option<String>,
    /// Auth options such as `auth_source` and `auth_mechanism`
    pub options: BTreeMap<String, String>,
    pub connect_timeout: Duration,
}

impl ConnectionDescriptor {
    pub fn new(kind: BackendKind, host: impl Into<String>) -> Self {
        Self {
            kind,
            host: host.into(),
            port: None,
            username: None,
            password: None,
            database: None,
            options: BTreeMap::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Get connection string for display purposes (without password)
    pub fn connection_string(&self) -> String {
        let mut parts = vec![format!("{}://", self.kind)];

        if let Some(username) = &self.username {
            parts.push(format!("{}@", username));
        }

        parts.push(self.host.clone());

        if let Some(port) = self.port {
            parts.push(format!(":{}", port));
        }

        if let Some(database) = &self.database {
            parts.push(format!("/{}", database));
        }

        parts.join("")
    }
}

/// Factory trait for creating adapters from descriptors
pub trait AdapterFactory: Send + Sync {
    fn backend_kind(&self) -> BackendKind;

    /// Build a disconnected adapter; `connect` is called by the registry
    fn create_adapter(&self, descriptor: ConnectionDescriptor) -> Arc<dyn BackendAdapter>;
}

/// Snapshot of one backend's connection state
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub kind: BackendKind,
    pub endpoint: String,
    pub open: bool,
    pub live: bool,
}

/// Process-wide owner of the connection handles
///
/// Exactly one adapter per backend kind. Query entry points receive the
/// registry by reference and look adapters up per request.
pub struct ConnectionRegistry {
    factories: Arc<RwLock<HashMap<BackendKind, Arc<dyn AdapterFactory>>>>,
    adapters: Arc<RwLock<HashMap<BackendKind, Arc<dyn BackendAdapter>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            factories: Arc::new(RwLock::new(HashMap::new())),
            adapters: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a factory for a backend kind
    pub async fn register_factory(&self, factory: Arc<dyn AdapterFactory>) {
        let kind = factory.backend_kind();
        let mut factories = self.factories.write().await;

        if factories.contains_key(&kind) {
            warn!("Overwriting existing factory for backend: {}", kind);
        }

        factories.insert(kind, factory);
        debug!("Registered factory for backend: {}", kind);
    }

    /// Create and connect one adapter per descriptor
    ///
    /// A failed connect is logged and the adapter is kept in its
    /// disconnected state, so the backend reports as unavailable without
    /// failing the other two.
    pub async fn init(
        &self,
        descriptors: Vec<ConnectionDescriptor>,
    ) -> Vec<(BackendKind, Result<(), ConnectionError>)> {
        let mut outcomes = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let kind = descriptor.kind;
            let factory = self.factories.read().await.get(&kind).cloned();

            let Some(factory) = factory else {
                let err = ConnectionError::invalid_configuration(
                    kind,
                    format!("No factory registered for backend: {}", kind),
                );
                warn!("{}", err);
                outcomes.push((kind, Err(err)));
                continue;
            };

            debug!("Creating {} adapter for {}", kind, descriptor.connection_string());
            let adapter = factory.create_adapter(descriptor);
            let outcome = self.attach(adapter).await;
            outcomes.push((kind, outcome));
        }

        outcomes
    }

    /// Connect an adapter and make it the handle for its backend kind
    pub async fn attach(&self, adapter: Arc<dyn BackendAdapter>) -> Result<(), ConnectionError> {
        let kind = adapter.kind();
        let outcome = adapter.connect().await;

        match &outcome {
            Ok(()) => info!("{} connection established", kind.label()),
            Err(e) => warn!("Failed to connect to {}: {}", kind.label(), e),
        }

        let previous = self.adapters.write().await.insert(kind, adapter);
        if let Some(previous) = previous {
            previous.disconnect().await;
        }

        outcome
    }

    /// Adapter for a backend, open or not
    pub async fn get(&self, kind: BackendKind) -> Option<Arc<dyn BackendAdapter>> {
        self.adapters.read().await.get(&kind).cloned()
    }

    /// Adapter for a backend only if it holds a session handle
    pub async fn available(&self, kind: BackendKind) -> Option<Arc<dyn BackendAdapter>> {
        self.get(kind).await.filter(|adapter| adapter.is_open())
    }

    /// Explicitly re-open one backend
    pub async fn reconnect(&self, kind: BackendKind) -> Result<(), ConnectionError> {
        match self.get(kind).await {
            Some(adapter) => adapter.reconnect().await,
            None => Err(ConnectionError::invalid_configuration(
                kind,
                "backend was never initialised",
            )),
        }
    }

    /// Disconnect and forget every adapter
    pub async fn reset(&self) {
        let mut adapters = self.adapters.write().await;

        for (kind, adapter) in adapters.drain() {
            debug!("Closing {} adapter", kind);
            adapter.disconnect().await;
        }
    }

    pub async fn status(&self) -> Vec<BackendStatus> {
        let adapters: Vec<Arc<dyn BackendAdapter>> =
            self.adapters.read().await.values().cloned().collect();

        let mut statuses = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let open = adapter.is_open();
            statuses.push(BackendStatus {
                kind: adapter.kind(),
                endpoint: adapter.descriptor().connection_string(),
                open,
                live: open && adapter.is_live().await,
            });
        }

        statuses.sort_by_key(|s| s.kind);
        statuses
    }

    /// List registered backend kinds
    pub async fn list_backends(&self) -> Vec<BackendKind> {
        let mut kinds: Vec<BackendKind> = self.factories.read().await.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

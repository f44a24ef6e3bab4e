pub mod request;
pub mod status;

pub use request::RequestCommand;
pub use status::StatusCommand;

use scholar_dashboard::DashboardConfig;
use scholar_query::ConnectionRegistry;
use scholar_query_mongodb::MongoAdapterFactory;
use scholar_query_neo4j::Neo4jAdapterFactory;
use scholar_query_postgres::PostgresAdapterFactory;
use std::sync::Arc;
use tracing::{info, warn};

/// Registry with one adapter per backend, connected where possible
///
/// A backend that fails to connect stays registered as unavailable; the
/// requests that need it answer with an explanation instead of data.
pub(crate) async fn connect(config: &DashboardConfig) -> Arc<ConnectionRegistry> {
    let registry = Arc::new(ConnectionRegistry::new());

    registry
        .register_factory(Arc::new(PostgresAdapterFactory))
        .await;
    registry.register_factory(Arc::new(MongoAdapterFactory)).await;
    registry.register_factory(Arc::new(Neo4jAdapterFactory)).await;

    let mut connected = 0;
    for (kind, outcome) in registry.init(config.descriptors()).await {
        match outcome {
            Ok(()) => connected += 1,
            Err(e) => warn!("{} unavailable: {}", kind.label(), e),
        }
    }
    info!("{} of 3 backends connected", connected);

    registry
}

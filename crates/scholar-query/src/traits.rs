use async_trait::async_trait;
use downcast_rs::{impl_downcast, DowncastSync};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{ConnectionError, QueryError};
use crate::native::{NativeCommand, NativeQuery};
use crate::registry::ConnectionDescriptor;
use crate::types::{BackendKind, RawRows};

/// A session that answered within this window is used without a probe
pub const LIVENESS_WINDOW: Duration = Duration::from_secs(30);

/// When the session last completed a round trip
#[derive(Debug, Default)]
pub struct SessionClock {
    last_seen: Mutex<Option<Instant>>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self) {
        *self.slot() = Some(Instant::now());
    }

    pub fn clear(&self) {
        *self.slot() = None;
    }

    pub fn is_recent(&self, window: Duration) -> bool {
        let last_seen = *self.slot();
        last_seen.is_some_and(|seen| seen.elapsed() < window)
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.last_seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Liveness capability shared by every adapter
#[async_trait]
pub trait Liveness: Send + Sync {
    /// Whether the current session answers; never reconnects
    async fn is_live(&self) -> bool;

    /// Drop the current session (if any) and open a fresh one
    ///
    /// Concurrent callers are serialised by the adapter; a second caller
    /// that finds a live session after waiting returns immediately.
    async fn reconnect(&self) -> Result<(), ConnectionError>;
}

/// Core trait every backend adapter implements
///
/// Implementors provide the single-attempt primitives `read_once` and
/// `write_once`; the provided `execute_read`/`execute_write` add the lazy
/// reconnect: a stale handle gets exactly one reconnect before the query is
/// attempted, and a query that fails with a retryable error after a live
/// handle is reconnected once and retried once.
///
/// The liveness probe is skipped while the session clock is within
/// [`LIVENESS_WINDOW`]; a session that died in the meantime surfaces as a
/// retryable error and takes the reconnect-once path instead.
#[async_trait]
pub trait BackendAdapter: Liveness + DowncastSync {
    fn kind(&self) -> BackendKind;

    fn descriptor(&self) -> &ConnectionDescriptor;

    /// Open the session and prove it with the backend's liveness probe
    async fn connect(&self) -> Result<(), ConnectionError>;

    /// Release the session; idempotent
    async fn disconnect(&self);

    /// Whether a session handle exists (it may still be stale)
    fn is_open(&self) -> bool;

    fn session_clock(&self) -> &SessionClock;

    async fn read_once(&self, query: &NativeQuery) -> Result<RawRows, QueryError>;

    async fn write_once(&self, command: &NativeCommand) -> Result<u64, QueryError>;

    async fn execute_read(&self, query: &NativeQuery) -> Result<RawRows, QueryError> {
        if query.backend() != self.kind() {
            return Err(QueryError::unsupported(format!(
                "{} query sent to {} adapter",
                query.backend(),
                self.kind()
            )));
        }

        let reconnected = ensure_live(self).await?;
        debug!("{} read: {}", self.kind(), query);

        let outcome = match self.read_once(query).await {
            Err(err) if err.is_retryable() && !reconnected => {
                warn!("{} read failed ({}), reconnecting once", self.kind(), err);
                self.session_clock().clear();
                self.reconnect().await?;
                self.read_once(query).await
            }
            other => other,
        };

        record_outcome(self.session_clock(), &outcome);
        outcome
    }

    async fn execute_write(&self, command: &NativeCommand) -> Result<u64, QueryError> {
        if command.backend() != self.kind() {
            return Err(QueryError::unsupported(format!(
                "{} command sent to {} adapter",
                command.backend(),
                self.kind()
            )));
        }

        let reconnected = ensure_live(self).await?;

        let outcome = match self.write_once(command).await {
            Err(err) if err.is_retryable() && !reconnected => {
                warn!("{} write failed ({}), reconnecting once", self.kind(), err);
                self.session_clock().clear();
                self.reconnect().await?;
                self.write_once(command).await
            }
            other => other,
        };

        record_outcome(self.session_clock(), &outcome);
        outcome
    }
}

impl_downcast!(sync BackendAdapter);

/// Reconnect a stale handle; returns whether a reconnect happened
async fn ensure_live<A: BackendAdapter + ?Sized>(adapter: &A) -> Result<bool, QueryError> {
    if adapter.is_open() {
        if adapter.session_clock().is_recent(LIVENESS_WINDOW) {
            return Ok(false);
        }
        if adapter.is_live().await {
            adapter.session_clock().touch();
            return Ok(false);
        }
    }

    debug!("{} handle is stale, reconnecting", adapter.kind());
    adapter.session_clock().clear();
    adapter.reconnect().await?;
    adapter.session_clock().touch();
    Ok(true)
}

fn record_outcome<T>(clock: &SessionClock, outcome: &Result<T, QueryError>) {
    match outcome {
        Ok(_) => clock.touch(),
        Err(err) if err.is_retryable() => clock.clear(),
        Err(_) => {}
    }
}

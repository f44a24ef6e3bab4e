//! Scripted in-memory adapter for tests
//!
//! Responses are matched by substring against the query's display text; the
//! first matching rule wins and unmatched queries return an empty result in
//! the backend's native shape.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::{ConnectionError, QueryError};
use crate::native::{NativeCommand, NativeQuery};
use crate::registry::ConnectionDescriptor;
use crate::traits::{BackendAdapter, Liveness, SessionClock};
use crate::types::{BackendKind, RawRows};

pub struct ScriptedAdapter {
    kind: BackendKind,
    descriptor: ConnectionDescriptor,
    reachable: AtomicBool,
    open: AtomicBool,
    live: AtomicBool,
    rules: Mutex<Vec<(String, Result<RawRows, QueryError>)>>,
    injected_failures: Mutex<VecDeque<QueryError>>,
    executed: Mutex<Vec<String>>,
    connects: AtomicUsize,
    probes: AtomicUsize,
    writes: AtomicUsize,
    clock: SessionClock,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedAdapter {
    /// Reachable adapter with no scripted responses
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            descriptor: ConnectionDescriptor::new(kind, "scripted"),
            reachable: AtomicBool::new(true),
            open: AtomicBool::new(false),
            live: AtomicBool::new(false),
            rules: Mutex::new(Vec::new()),
            injected_failures: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            clock: SessionClock::new(),
        }
    }

    /// Adapter whose every connect attempt fails
    pub fn unreachable(kind: BackendKind) -> Self {
        let adapter = Self::new(kind);
        adapter.reachable.store(false, Ordering::SeqCst);
        adapter
    }

    /// Answer queries whose text contains `needle` with `rows`
    pub fn respond(self, needle: &str, rows: RawRows) -> Self {
        lock(&self.rules).push((needle.to_string(), Ok(rows)));
        self
    }

    /// Fail queries whose text contains `needle`
    pub fn fail(self, needle: &str, err: QueryError) -> Self {
        lock(&self.rules).push((needle.to_string(), Err(err)));
        self
    }

    /// Fail the next read or write with `err`, whatever it is
    pub fn fail_next(&self, err: QueryError) {
        lock(&self.injected_failures).push_back(err);
    }

    /// Simulate a silent network drop: the handle stays, the session dies
    pub fn drop_session(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of successful and failed connect attempts
    pub fn connect_attempts(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of liveness round trips
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Display text of every query that reached `read_once`
    pub fn executed(&self) -> Vec<String> {
        lock(&self.executed).clone()
    }

    fn take_injected(&self) -> Option<QueryError> {
        lock(&self.injected_failures).pop_front()
    }
}

#[async_trait]
impl Liveness for ScriptedAdapter {
    async fn is_live(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.open.load(Ordering::SeqCst) && self.live.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<(), ConnectionError> {
        self.disconnect().await;
        self.connect().await
    }
}

#[async_trait]
impl BackendAdapter for ScriptedAdapter {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(ConnectionError::unreachable(self.kind, "scripted outage"));
        }

        self.open.store(true, Ordering::SeqCst);
        self.live.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn session_clock(&self) -> &SessionClock {
        &self.clock
    }

    async fn read_once(&self, query: &NativeQuery) -> Result<RawRows, QueryError> {
        let text = query.to_string();
        lock(&self.executed).push(text.clone());

        if let Some(err) = self.take_injected() {
            return Err(err);
        }

        if !self.live.load(Ordering::SeqCst) {
            return Err(QueryError::ConnectionLost("scripted session dropped".into()));
        }

        let rules = lock(&self.rules);
        rules
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| Ok(RawRows::empty_for(self.kind)))
    }

    async fn write_once(&self, _command: &NativeCommand) -> Result<u64, QueryError> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    }
}

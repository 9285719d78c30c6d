//! Request correlator: matches inbound responses to outstanding requests.
//!
//! Every entry is completed exactly once. Completion always goes through
//! removal from the table, so whichever path removes the entry first
//! (response, timeout, sweep, close) is the only one that resolves it.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use {
    dashmap::{DashMap, mapref::entry::Entry},
    naia_protocol::ResponseFrame,
    tokio::{sync::oneshot, time::Instant},
    tracing::{debug, warn},
};

use crate::error::{ClientError, Result};

pub type Completion = oneshot::Sender<Result<serde_json::Value>>;

/// A request waiting for its response.
pub struct PendingRequest {
    pub id: String,
    pub method: String,
    pub issued_at: Instant,
    pub timeout: Duration,
    completion: Completion,
}

impl PendingRequest {
    pub fn deadline(&self) -> Instant {
        self.issued_at + self.timeout
    }

    fn complete(self, outcome: Result<serde_json::Value>) {
        // The caller may have gone away; nothing else to do then.
        let _ = self.completion.send(outcome);
    }

    fn timeout_error(&self) -> ClientError {
        ClientError::Timeout {
            method: self.method.clone(),
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }
}

/// Pending table keyed by correlation id.
pub struct Correlator {
    next_id: AtomicU64,
    pending: DashMap<String, PendingRequest>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
        }
    }

    /// Allocate an id and record a pending entry for it.
    pub fn register(
        &self,
        method: &str,
        timeout: Duration,
    ) -> (String, oneshot::Receiver<Result<serde_json::Value>>) {
        let (tx, rx) = oneshot::channel();
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
            match self.pending.entry(id.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    slot.insert(PendingRequest {
                        id: id.clone(),
                        method: method.to_string(),
                        issued_at: Instant::now(),
                        timeout,
                        completion: tx,
                    });
                    debug!(id = %id, method, "registered pending request");
                    return (id, rx);
                },
            }
        }
    }

    /// Resolve the entry matching `frame.id`. Returns false when no request
    /// with that id is pending.
    pub fn resolve(&self, frame: ResponseFrame) -> bool {
        let Some((_, request)) = self.pending.remove(&frame.id) else {
            warn!(id = %frame.id, "received response for unknown request id");
            return false;
        };
        let outcome = frame.into_outcome().map_err(ClientError::from);
        debug!(id = %request.id, method = %request.method, ok = outcome.is_ok(), "resolved request");
        request.complete(outcome);
        true
    }

    /// Drop an entry without completing it.
    pub fn cancel(&self, id: &str) -> Option<PendingRequest> {
        self.pending.remove(id).map(|(_, request)| request)
    }

    /// Fail every pending entry. Returns how many were failed.
    pub fn fail_all(&self, error: impl Fn() -> ClientError) -> usize {
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, request)) = self.pending.remove(&id) {
                request.complete(Err(error()));
                failed += 1;
            }
        }
        failed
    }

    /// Time out every entry whose deadline has passed.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|e| e.value().deadline() <= now)
            .map(|e| e.key().clone())
            .collect();
        let mut swept = 0;
        for id in expired {
            if let Some((_, request)) = self.pending.remove(&id) {
                warn!(id = %id, method = %request.method, "expiring orphaned request");
                let error = request.timeout_error();
                request.complete(Err(error));
                swept += 1;
            }
        }
        swept
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Removes a pending entry when the awaiting future goes away.
pub(crate) struct PendingGuard<'a> {
    correlator: &'a Correlator,
    id: String,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(correlator: &'a Correlator, id: String) -> Self {
        Self { correlator, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.cancel(&self.id);
    }
}

//! Correlation of outbound requests with the peer's responses.
//!
//! Each outbound request registers a oneshot channel under a host-generated
//! id. The read loop completes the channel when a Response or ResponseError
//! with that id arrives. Closing the table drops every sender, so waiters
//! observe the connection as closed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{HostError, Result};
use crate::protocol::{ErrorBody, MessageId};

/// Outcome of an outbound request as reported by the peer.
pub(crate) type Reply = std::result::Result<Value, ErrorBody>;

/// Table of outbound requests awaiting a response.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    next_id: AtomicU64,
    waiting: Mutex<HashMap<MessageId, oneshot::Sender<Reply>>>,
    closed: AtomicBool,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MessageId, oneshot::Sender<Reply>>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate an id and a receiver for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::ConnectionClosed`] once the table is closed.
    pub(crate) fn register(&self) -> Result<(MessageId, oneshot::Receiver<Reply>)> {
        let mut waiting = self.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(HostError::ConnectionClosed);
        }

        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let id = MessageId::new(format!("host-{}", n));
        let (tx, rx) = oneshot::channel();
        waiting.insert(id.clone(), tx);
        Ok((id, rx))
    }

    /// Deliver a reply. Returns `false` if no request with `id` is waiting.
    pub(crate) fn complete(&self, id: &MessageId, reply: Reply) -> bool {
        let Some(tx) = self.lock().remove(id) else {
            return false;
        };
        // Receiver may have been dropped by a cancelled caller.
        let _ = tx.send(reply);
        true
    }

    /// Forget a request nobody waits for anymore.
    pub(crate) fn remove(&self, id: &MessageId) {
        self.lock().remove(id);
    }

    /// Fail every waiting request and refuse new ones.
    pub(crate) fn close(&self) {
        let mut waiting = self.lock();
        self.closed.store(true, Ordering::Release);
        if !waiting.is_empty() {
            tracing::debug!(count = waiting.len(), "abandoning outbound requests");
        }
        waiting.clear();
    }

    /// Number of requests awaiting a reply.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Removes one request from the table when dropped.
///
/// Held by the waiting caller; a cancelled caller leaves no entry behind.
pub(crate) struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    id: MessageId,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(pending: &'a PendingRequests, id: MessageId) -> Self {
        Self { pending, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

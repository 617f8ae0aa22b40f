use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::PeerError;

/// Generates pairwise-distinct correlation ids for outbound calls from a
/// single `Peer`. A monotonic counter is sufficient within one peer's
/// lifetime, matching `JsonRpcTransport::next_id` in spirit.
#[derive(Default)]
pub(crate) struct IdGenerator(AtomicU64);

impl IdGenerator {
    pub(crate) fn next(&self) -> String {
        self.0.fetch_add(1, Ordering::SeqCst).to_string()
    }
}

/// An outbound call awaiting its correlated response. Removed exactly once —
/// on response, on error, on timeout, or on close — with its timer cancelled
/// at removal (unless the timer itself is the one removing it).
pub(crate) struct PendingRequest {
    pub(crate) method: String,
    pub(crate) resolve: oneshot::Sender<Result<Value, PeerError>>,
    pub(crate) timer: JoinHandle<()>,
}

impl PendingRequest {
    /// Cancels the timeout timer and delivers a terminal result.
    pub(crate) fn settle(self, result: Result<Value, PeerError>) {
        self.timer.abort();
        let _ = self.resolve.send(result);
    }
}

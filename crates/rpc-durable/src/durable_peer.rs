use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rpc_peer::{Peer, PeerConfig, PeerError, Transport};
use rpc_wire::{Frame, Message, Protocol};
use serde_json::Value;
use tracing::warn;

use crate::callback::{CallContext, CallbackPayload, CallbackRegistry};
use crate::error::DurableError;
use crate::storage::{PendingCall, SyncPendingCallStorage};

fn clock_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Configuration for constructing a [`DurablePeer`].
pub struct DurablePeerConfig {
    pub peer: PeerConfig,
    pub storage: Arc<dyn SyncPendingCallStorage>,
    pub callbacks: Arc<CallbackRegistry>,
    /// Default timeout for durable calls, independent of the underlying
    /// `Peer`'s own default (a durable call may be allowed to live far
    /// longer than a promise-based one).
    pub durable_timeout: Duration,
}

/// Specialization of [`Peer`] for hosts whose process may be suspended with
/// the transport still open: outgoing calls persist their pending state to
/// [`SyncPendingCallStorage`] and complete into a named host callback rather
/// than an in-memory future, so a freshly recreated peer sharing the same
/// storage and callbacks can deliver the result after a hibernate/resume
/// cycle.
pub struct DurablePeer {
    peer: Peer,
    transport: Arc<dyn Transport>,
    protocol: Arc<Protocol>,
    storage: Arc<dyn SyncPendingCallStorage>,
    callbacks: Arc<CallbackRegistry>,
    durable_timeout: Duration,
    ids: AtomicU64,
}

impl DurablePeer {
    pub fn new(config: DurablePeerConfig) -> Self {
        let transport = config.peer.transport.clone();
        let protocol = config.peer.protocol.clone();
        Self {
            peer: Peer::new(config.peer),
            transport,
            protocol,
            storage: config.storage,
            callbacks: config.callbacks,
            durable_timeout: config.durable_timeout,
            ids: AtomicU64::new(0),
        }
    }

    /// The underlying promise-based peer, for ordinary (non-durable) calls,
    /// emits, and introspection.
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    fn next_durable_id(&self) -> String {
        format!("durable-{}", self.ids.fetch_add(1, Ordering::SeqCst))
    }

    /// Issues a durable call: `callbackName` must already be registered, the
    /// call is persisted before it is sent, and its eventual completion
    /// (on this peer or a later recreated one sharing `storage`/`callbacks`)
    /// invokes that callback rather than resolving a future.
    pub async fn call_with_callback(
        &self,
        method: &str,
        params: Value,
        callback_name: &str,
        timeout: Option<Duration>,
    ) -> Result<String, DurableError> {
        if !self.callbacks.contains(callback_name) {
            return Err(DurableError::UnknownCallback(callback_name.to_string()));
        }

        let now = clock_ms();
        let timeout_ms = timeout.unwrap_or(self.durable_timeout).as_millis() as i64;
        let call = PendingCall {
            id: self.next_durable_id(),
            method: method.to_string(),
            params: params.clone(),
            callback: callback_name.to_string(),
            sent_at_ms: now,
            timeout_at_ms: now + timeout_ms,
        };

        // Persist before send: a crash between these two steps must leave a
        // recoverable continuation, not a sent-but-unpersisted call.
        self.storage.save(call.clone())?;

        if self.peer.is_open() {
            let message = self.protocol.create_request(call.id.clone(), method, params);
            match self.protocol.encode_message(&message) {
                Ok(frame) => {
                    if let Err(err) = self.transport.send(frame).await {
                        warn!(%err, method, id = %call.id, "durable call send failed; left persisted for retry");
                    }
                }
                Err(err) => warn!(%err, method, "failed to encode durable call"),
            }
        } else {
            warn!(method, id = %call.id, "transport not open; durable call left persisted");
        }

        Ok(call.id)
    }

    /// Decodes `frame`; if it is a `Response`/`Error` whose id matches a
    /// durable row, completes that row's callback and returns. Otherwise
    /// delegates to the wrapped peer's standard dispatch.
    pub async fn handle_message(&self, frame: Frame) {
        if let Some(message) = self.protocol.safe_decode_message(frame.clone()) {
            let durable_id = match &message {
                Message::Response { id, .. } | Message::Error { id, .. } => Some(id.clone()),
                _ => None,
            };

            if let Some(id) = durable_id {
                match self.storage.get(&id) {
                    Ok(Some(call)) => {
                        self.complete_durable_call(call, message).await;
                        return;
                    }
                    Ok(None) => {}
                    Err(err) => warn!(%err, %id, "durable storage lookup failed"),
                }
            }
        }

        self.peer.handle_message(frame).await;
    }

    async fn complete_durable_call(&self, call: PendingCall, message: Message) {
        if let Err(err) = self.storage.delete(&call.id) {
            warn!(%err, id = %call.id, "failed to delete completed durable call");
        }

        let Some(callback) = self.callbacks.get(&call.callback) else {
            warn!(callback = %call.callback, id = %call.id, "durable completion for unregistered callback");
            return;
        };

        let latency_ms = clock_ms() - call.sent_at_ms;
        let payload = match message {
            Message::Response { result, .. } => CallbackPayload::Success(result),
            Message::Error {
                code, message, data, ..
            } => CallbackPayload::Failure { code, message, data },
            _ => unreachable!("durable_id is only set for Response/Error"),
        };
        let context = CallContext { call, latency_ms };
        callback(payload, context);
    }

    pub fn get_pending_calls(&self) -> Result<Vec<PendingCall>, DurableError> {
        self.storage.list_all()
    }

    pub fn get_expired_calls(&self) -> Result<Vec<PendingCall>, DurableError> {
        self.storage.list_expired(clock_ms())
    }

    /// Removes and returns every expired call. The caller decides whether to
    /// synthesize a timeout callback invocation for each.
    pub fn cleanup_expired(&self) -> Result<Vec<PendingCall>, DurableError> {
        let expired = self.storage.list_expired(clock_ms())?;
        for call in &expired {
            self.storage.delete(&call.id)?;
        }
        Ok(expired)
    }

    pub fn clear_pending_calls(&self) -> Result<(), DurableError> {
        self.storage.clear()
    }

    /// Closes the in-memory peer (rejecting its promise-based pending calls
    /// with `ConnectionClosed`) but does NOT clear durable storage: those
    /// rows remain for a subsequently recreated peer to complete.
    pub async fn close(&self) {
        self.peer.close().await;
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, PeerError> {
        self.peer.call(method, params).await
    }

    pub async fn emit(&self, event: &str, data: Value) {
        self.peer.emit(event, data).await;
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rpc_wire::{ErrorCode, Frame, Message, Protocol};
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tracing::warn;

use crate::error::PeerError;
use crate::pending::{IdGenerator, PendingRequest};
use crate::provider::Provider;
use crate::schema::Schema;
use crate::transport::{ReadyState, Transport};

pub type PeerId = String;

type EventHandler = Box<dyn Fn(String, Value) + Send + Sync>;
type PendingMap = Arc<Mutex<HashMap<String, PendingRequest>>>;

/// Configuration for constructing a [`Peer`].
pub struct PeerConfig {
    pub id: PeerId,
    pub transport: Arc<dyn Transport>,
    pub protocol: Arc<Protocol>,
    pub local_schema: Arc<Schema>,
    pub remote_schema: Arc<Schema>,
    pub provider: Arc<Provider>,
    pub default_timeout: Duration,
    /// Receives validated inbound events. If absent, inbound events are
    /// dropped if there is no user handler.
    pub event_handler: Option<EventHandler>,
}

/// One-to-one RPC endpoint: outbound calls, inbound dispatch, event
/// emit/receive, and cancellation on close.
pub struct Peer {
    id: PeerId,
    transport: Arc<dyn Transport>,
    protocol: Arc<Protocol>,
    local_schema: Arc<Schema>,
    remote_schema: Arc<Schema>,
    provider: Arc<Provider>,
    event_handler: Option<EventHandler>,
    default_timeout: Duration,
    pending: PendingMap,
    closed: AtomicBool,
    ids: IdGenerator,
}

impl Peer {
    pub fn new(config: PeerConfig) -> Self {
        Self {
            id: config.id,
            transport: config.transport,
            protocol: config.protocol,
            local_schema: config.local_schema,
            remote_schema: config.remote_schema,
            provider: config.provider,
            event_handler: config.event_handler,
            default_timeout: config.default_timeout,
            pending: Arc::new(Mutex::new(HashMap::new())),
            closed: AtomicBool::new(false),
            ids: IdGenerator::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The transport this peer sends over. Exposed for hosts that need to
    /// observe or hand off the raw transport — e.g. `MultiPeer` firing
    /// `on_peer_recreated(peer, transport)` after lazy recreation.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.transport.ready_state() == ReadyState::Open
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Invokes a remote method, validating `params` against the remote
    /// schema's declared input shape and racing the call against
    /// `timeout.unwrap_or(self.default_timeout)`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, PeerError> {
        self.call_with_timeout(method, params, None).await
    }

    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, PeerError> {
        if !self.is_open() {
            return Err(PeerError::ConnectionClosed);
        }

        let method_schema = self
            .remote_schema
            .method(method)
            .ok_or_else(|| PeerError::MethodNotFound {
                method: method.to_string(),
            })?;

        let validated = method_schema
            .input
            .validate(params)
            .map_err(|issues| PeerError::ValidationError {
                method: method.to_string(),
                issues,
            })?;

        let id = self.ids.next();
        let timeout = timeout.unwrap_or(self.default_timeout);
        let (tx, rx) = oneshot::channel();

        let timer = {
            let pending = self.pending.clone();
            let id = id.clone();
            let method_owned = method.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let entry = pending.lock().await.remove(&id);
                if let Some(entry) = entry {
                    entry.settle(Err(PeerError::TimeoutError {
                        method: method_owned,
                        timeout,
                    }));
                }
            })
        };

        // Register before sending: closes the race where a response for
        // this id could arrive before the entry exists.
        self.pending.lock().await.insert(
            id.clone(),
            PendingRequest {
                method: method.to_string(),
                resolve: tx,
                timer,
            },
        );

        let message = self.protocol.create_request(id.clone(), method, validated);
        let frame = self
            .protocol
            .encode_message(&message)
            .map_err(|err| PeerError::ParseError(err.to_string()))?;

        if let Err(err) = self.transport.send(frame).await {
            if let Some(entry) = self.pending.lock().await.remove(&id) {
                entry.settle(Err(PeerError::ConnectionClosed));
            }
            warn!(%err, method, "send failed after registering pending request");
            return Err(PeerError::ConnectionClosed);
        }

        rx.await.unwrap_or(Err(PeerError::ConnectionClosed))
    }

    /// Fire-and-forget event emission. Never fails: an unknown event, an
    /// invalid payload, or a closed transport all result in a dropped emit,
    /// logged at `warn`.
    pub async fn emit(&self, event: &str, data: Value) {
        if !self.is_open() {
            warn!(event, "emit dropped: connection closed");
            return;
        }

        let Some(validator) = self.local_schema.event(event) else {
            warn!(event, "emit dropped: event not declared in local schema");
            return;
        };

        let validated = match validator.validate(data) {
            Ok(value) => value,
            Err(issues) => {
                warn!(event, %issues, "emit dropped: validation failed");
                return;
            }
        };

        let message = self.protocol.create_event(event, validated);
        match self.protocol.encode_message(&message) {
            Ok(frame) => {
                if let Err(err) = self.transport.send(frame).await {
                    warn!(event, %err, "emit dropped: send failed");
                }
            }
            Err(err) => warn!(event, %err, "emit dropped: encode failed"),
        }
    }

    /// Normalizes and decodes `frame`, then dispatches it. Malformed frames
    /// are logged and dropped; they never propagate to the caller.
    pub async fn handle_message(&self, frame: Frame) {
        let Some(message) = self.protocol.safe_decode_message(frame) else {
            warn!("dropping malformed inbound frame");
            return;
        };

        match message {
            Message::Request { id, method, params } => self.handle_request(id, method, params).await,
            Message::Response { id, result } => self.handle_response(id, result).await,
            Message::Error {
                id,
                code,
                message,
                data,
            } => {
                self.handle_error_for(id, code, message, data).await;
            }
            Message::Event { event, data } => self.handle_event(event, data).await,
        }
    }

    async fn handle_request(&self, id: String, method: String, params: Value) {
        let Some(method_schema) = self.local_schema.method(&method) else {
            self.send_error(
                id,
                ErrorCode::MethodNotFound.as_i32(),
                format!("Method '{method}' not found"),
                None,
            )
            .await;
            return;
        };

        let validated_params = match method_schema.input.validate(params) {
            Ok(value) => value,
            Err(issues) => {
                self.send_error(
                    id,
                    ErrorCode::InvalidParams.as_i32(),
                    format!("Invalid params for '{method}'"),
                    Some(Value::from(issues.0)),
                )
                .await;
                return;
            }
        };

        let Some(handler) = self.provider.get(&method) else {
            self.send_error(
                id,
                ErrorCode::MethodNotFound.as_i32(),
                format!("Method '{method}' not implemented"),
                None,
            )
            .await;
            return;
        };

        let output = match handler(validated_params).await {
            Ok(value) => value,
            Err(message) => {
                self.send_error(id, ErrorCode::InternalError.as_i32(), message, None)
                    .await;
                return;
            }
        };

        match method_schema.output.validate(output) {
            Ok(validated_output) => {
                let message = self.protocol.create_response(id, validated_output);
                self.send(message).await;
            }
            Err(issues) => {
                self.send_error(
                    id,
                    ErrorCode::InternalError.as_i32(),
                    format!("Invalid output from '{method}'"),
                    Some(Value::from(issues.0)),
                )
                .await;
            }
        }
    }

    async fn handle_response(&self, id: String, result: Value) {
        let entry = self.pending.lock().await.remove(&id);
        match entry {
            Some(entry) => entry.settle(Ok(result)),
            None => warn!(%id, "dropping response for unknown or already-settled id"),
        }
    }

    async fn handle_error_for(&self, id: String, code: i32, message: String, data: Option<Value>) {
        let entry = self.pending.lock().await.remove(&id);
        let Some(entry) = entry else {
            warn!(%id, "dropping error for unknown or already-settled id");
            return;
        };
        let method = entry.method.clone();
        entry.settle(Err(PeerError::RemoteError {
            method,
            code,
            message,
            data,
        }));
    }

    async fn handle_event(&self, event: String, data: Value) {
        let Some(handler) = &self.event_handler else {
            return;
        };

        let Some(validator) = self.remote_schema.event(&event) else {
            warn!(%event, "dropping event: not declared in remote schema");
            return;
        };

        match validator.validate(data) {
            Ok(validated) => handler(event, validated),
            Err(issues) => warn!(%event, %issues, "dropping event: validation failed"),
        }
    }

    async fn send(&self, message: Message) {
        match self.protocol.encode_message(&message) {
            Ok(frame) => {
                if let Err(err) = self.transport.send(frame).await {
                    warn!(%err, "failed to send message");
                }
            }
            Err(err) => warn!(%err, "failed to encode message"),
        }
    }

    async fn send_error(&self, id: String, code: i32, message: String, data: Option<Value>) {
        let message = self.protocol.create_error(id, code, message, data);
        self.send(message).await;
    }

    /// Rejects every pending call with `ConnectionClosed` and marks the peer
    /// closed. Idempotent.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut guard = self.pending.lock().await;
        for (_, entry) in guard.drain() {
            entry.settle(Err(PeerError::ConnectionClosed));
        }
        drop(guard);
        self.transport.close(None, None).await;
    }
}


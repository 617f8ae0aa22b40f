use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rpc_peer::{PeerConfig, PeerError, Provider, ReadyState, Schema, Transport};
use rpc_wire::{Frame, JsonCodec, Protocol};
use serde_json::json;

use crate::callback::{CallbackPayload, CallbackRegistry};
use crate::durable_peer::{DurablePeer, DurablePeerConfig};
use crate::storage::{MemoryPendingCallStorage, SyncPendingCallStorage};

struct LoopbackTransport {
    outbox: Mutex<Vec<Frame>>,
    open: AtomicBool,
}

impl LoopbackTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            outbox: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
        })
    }

    fn drain(&self) -> Vec<Frame> {
        std::mem::take(&mut *self.outbox.lock().unwrap())
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, frame: Frame) -> Result<(), String> {
        if !self.open.load(Ordering::SeqCst) {
            return Err("closed".to_string());
        }
        self.outbox.lock().unwrap().push(frame);
        Ok(())
    }

    async fn close(&self, _code: Option<u16>, _reason: Option<String>) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn ready_state(&self) -> ReadyState {
        if self.open.load(Ordering::SeqCst) {
            ReadyState::Open
        } else {
            ReadyState::Closed
        }
    }
}

/// Observes, at the moment a frame is sent, whether the given id is already
/// visible in storage — proves the save-before-send ordering rather than
/// just asserting the end state.
struct ObservingTransport {
    inner: Arc<LoopbackTransport>,
    storage: Arc<dyn SyncPendingCallStorage>,
    observed_saved_before_send: AtomicBool,
}

#[async_trait]
impl Transport for ObservingTransport {
    async fn send(&self, frame: Frame) -> Result<(), String> {
        if let Frame::Text(text) = &frame {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
                if let Some(id) = value.get("id").and_then(|v| v.as_str()) {
                    if self.storage.get(id).unwrap().is_some() {
                        self.observed_saved_before_send.store(true, Ordering::SeqCst);
                    }
                }
            }
        }
        self.inner.send(frame).await
    }

    async fn close(&self, code: Option<u16>, reason: Option<String>) {
        self.inner.close(code, reason).await;
    }

    fn ready_state(&self) -> ReadyState {
        self.inner.ready_state()
    }
}

fn durable_peer_config(
    transport: Arc<dyn Transport>,
    storage: Arc<dyn SyncPendingCallStorage>,
    callbacks: Arc<CallbackRegistry>,
) -> DurablePeerConfig {
    DurablePeerConfig {
        peer: PeerConfig {
            id: "durable".into(),
            transport,
            protocol: Arc::new(Protocol::text(JsonCodec)),
            local_schema: Arc::new(Schema::new()),
            remote_schema: Arc::new(Schema::new()),
            provider: Arc::new(Provider::new()),
            default_timeout: Duration::from_millis(200),
            event_handler: None,
        },
        storage,
        callbacks,
        durable_timeout: Duration::from_secs(30),
    }
}

#[tokio::test]
async fn call_with_callback_persists_before_sending() {
    let storage: Arc<dyn SyncPendingCallStorage> = Arc::new(MemoryPendingCallStorage::new());
    let loopback = LoopbackTransport::new();
    let observing = Arc::new(ObservingTransport {
        inner: loopback.clone(),
        storage: storage.clone(),
        observed_saved_before_send: AtomicBool::new(false),
    });
    let callbacks = Arc::new(CallbackRegistry::new().register("onDone", |_payload, _ctx| {}));
    let durable = DurablePeer::new(durable_peer_config(observing.clone(), storage.clone(), callbacks));

    let id = durable
        .call_with_callback("getUser", json!({"id": "1"}), "onDone", None)
        .await
        .unwrap();

    assert!(observing.observed_saved_before_send.load(Ordering::SeqCst));
    assert!(storage.get(&id).unwrap().is_some());
    assert_eq!(loopback.drain().len(), 1);
}

#[tokio::test]
async fn unknown_callback_is_rejected_before_any_persist_or_send() {
    let storage: Arc<dyn SyncPendingCallStorage> = Arc::new(MemoryPendingCallStorage::new());
    let loopback = LoopbackTransport::new();
    let callbacks = Arc::new(CallbackRegistry::new());
    let durable = DurablePeer::new(durable_peer_config(loopback.clone(), storage.clone(), callbacks));

    let err = durable
        .call_with_callback("getUser", json!({}), "noSuchCallback", None)
        .await
        .unwrap_err();

    assert!(matches!(err, crate::error::DurableError::UnknownCallback(_)));
    assert!(storage.list_all().unwrap().is_empty());
    assert!(loopback.drain().is_empty());
}

#[tokio::test]
async fn durable_completion_invokes_callback_and_deletes_row() {
    let storage: Arc<dyn SyncPendingCallStorage> = Arc::new(MemoryPendingCallStorage::new());
    let loopback = LoopbackTransport::new();
    let seen = Arc::new(Mutex::new(None));
    let seen_for_callback = seen.clone();
    let callbacks = Arc::new(CallbackRegistry::new().register("onDone", move |payload, ctx| {
        *seen_for_callback.lock().unwrap() = Some((payload_to_json(payload), ctx.latency_ms >= 0));
    }));
    let durable = DurablePeer::new(durable_peer_config(
        loopback.clone(),
        storage.clone(),
        callbacks,
    ));

    let id = durable
        .call_with_callback("getUser", json!({"id": "1"}), "onDone", None)
        .await
        .unwrap();
    loopback.drain();

    let protocol = Protocol::text(JsonCodec);
    let response = protocol.create_response(id.clone(), json!({"name": "R"}));
    let frame = protocol.encode_message(&response).unwrap();
    durable.handle_message(frame).await;

    let (value, latency_non_negative) = seen.lock().unwrap().clone().expect("callback ran");
    assert_eq!(value["name"], "R");
    assert!(latency_non_negative);
    assert!(storage.get(&id).unwrap().is_none());
}

fn payload_to_json(payload: CallbackPayload) -> serde_json::Value {
    match payload {
        CallbackPayload::Success(value) => value,
        CallbackPayload::Failure { code, message, .. } => {
            json!({ "code": code, "message": message })
        }
    }
}

#[tokio::test]
async fn durable_error_frame_invokes_same_callback_with_failure_payload() {
    let storage: Arc<dyn SyncPendingCallStorage> = Arc::new(MemoryPendingCallStorage::new());
    let loopback = LoopbackTransport::new();
    let seen = Arc::new(Mutex::new(None));
    let seen_for_callback = seen.clone();
    let callbacks = Arc::new(CallbackRegistry::new().register("onDone", move |payload, _ctx| {
        *seen_for_callback.lock().unwrap() = Some(matches!(payload, CallbackPayload::Failure { .. }));
    }));
    let durable = DurablePeer::new(durable_peer_config(
        loopback.clone(),
        storage.clone(),
        callbacks,
    ));

    let id = durable
        .call_with_callback("getUser", json!({}), "onDone", None)
        .await
        .unwrap();
    loopback.drain();

    let protocol = Protocol::text(JsonCodec);
    let error = protocol.create_error(id.clone(), -32603, "boom", None);
    let frame = protocol.encode_message(&error).unwrap();
    durable.handle_message(frame).await;

    assert_eq!(*seen.lock().unwrap(), Some(true));
    assert!(storage.get(&id).unwrap().is_none());
}

#[tokio::test]
async fn non_durable_response_falls_through_to_promise_based_dispatch() {
    let storage: Arc<dyn SyncPendingCallStorage> = Arc::new(MemoryPendingCallStorage::new());
    let loopback = LoopbackTransport::new();
    let callbacks = Arc::new(CallbackRegistry::new());
    let durable = DurablePeer::new(durable_peer_config(loopback.clone(), storage.clone(), callbacks));

    let call = {
        let peer = durable.peer();
        peer.call("missing", json!({}))
    };
    let err = call.await.unwrap_err();
    assert!(matches!(err, PeerError::MethodNotFound { .. }));
}

#[tokio::test]
async fn close_does_not_clear_durable_storage() {
    let storage: Arc<dyn SyncPendingCallStorage> = Arc::new(MemoryPendingCallStorage::new());
    let loopback = LoopbackTransport::new();
    let callbacks = Arc::new(CallbackRegistry::new().register("onDone", |_p, _c| {}));
    let durable = DurablePeer::new(durable_peer_config(loopback.clone(), storage.clone(), callbacks));

    durable
        .call_with_callback("getUser", json!({}), "onDone", None)
        .await
        .unwrap();
    assert_eq!(storage.list_all().unwrap().len(), 1);

    durable.close().await;
    assert_eq!(storage.list_all().unwrap().len(), 1);
}

#[tokio::test]
async fn cleanup_expired_removes_and_returns_only_expired_rows() {
    let storage: Arc<dyn SyncPendingCallStorage> = Arc::new(MemoryPendingCallStorage::new());
    let loopback = LoopbackTransport::new();
    let callbacks = Arc::new(CallbackRegistry::new().register("onDone", |_p, _c| {}));
    let durable = DurablePeer::new(durable_peer_config(loopback.clone(), storage.clone(), callbacks));

    durable
        .call_with_callback("getUser", json!({}), "onDone", Some(Duration::from_secs(0)))
        .await
        .unwrap();
    durable
        .call_with_callback("getUser", json!({}), "onDone", Some(Duration::from_secs(60)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let expired = durable.cleanup_expired().unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(storage.list_all().unwrap().len(), 1);
}

//! End-to-end partial fan-out: a driver call targets three connections,
//! one of which never responds and one of which has already disconnected,
//! and the caller still gets a per-connection result array rather than one
//! failure sinking the whole call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rpc_multipeer::{CallOutcome, DriverOptions, MultiPeer, MultiPeerConfig, NoopHooks};
use rpc_peer::{AnyValidator, Peer, PeerConfig, PeerError, Provider, ReadyState, Schema, Transport};
use rpc_wire::{Frame, JsonCodec, Message, Protocol};
use serde_json::json;

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

fn client_peer(id: &str, transport: Arc<dyn Transport>) -> Peer {
    let remote_schema = Schema::new().with_method("ping", AnyValidator, AnyValidator);
    Peer::new(PeerConfig {
        id: id.to_string(),
        transport,
        protocol: Arc::new(Protocol::text(JsonCodec)),
        local_schema: Arc::new(Schema::new()),
        remote_schema: Arc::new(remote_schema),
        provider: Arc::new(Provider::new()),
        default_timeout: Duration::from_millis(500),
        event_handler: None,
    })
}

#[tokio::test]
async fn partial_fan_out_preserves_per_connection_results() {
    let multi = MultiPeer::new(MultiPeerConfig {
        factory: Arc::new(|id| client_peer(id, LoopbackTransport::new())),
        hooks: Arc::new(NoopHooks),
        default_timeout: Duration::from_millis(500),
        protocol: Arc::new(Protocol::text(JsonCodec)),
        local_schema: Arc::new(Schema::new()),
    });

    let responsive_transport = LoopbackTransport::new();
    let silent_transport = LoopbackTransport::new();
    let gone_transport = LoopbackTransport::new();
    let responsive = Arc::new(client_peer("responsive", responsive_transport.clone()));
    let silent = Arc::new(client_peer("silent", silent_transport.clone()));
    let gone = Arc::new(client_peer("gone", gone_transport));
    gone.close().await;

    multi.register_peer("responsive", responsive.clone()).await;
    multi.register_peer("silent", silent).await;
    multi.register_peer("gone", gone).await;

    assert_eq!(multi.get_connection_count().await, 3);

    let multi = Arc::new(multi);
    let driver = tokio::spawn({
        let multi = multi.clone();
        async move {
            multi
                .call_many(
                    "ping",
                    json!({}),
                    DriverOptions {
                        ids: None,
                        timeout: Some(Duration::from_millis(40)),
                    },
                )
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    let protocol = Protocol::text(JsonCodec);
    for frame in responsive_transport.drain() {
        if let Some(Message::Request { id, .. }) = protocol.safe_decode_message(frame) {
            let response = protocol.create_response(id, json!({"pong": true}));
            let frame = protocol.encode_message(&response).unwrap();
            responsive.handle_message(frame).await;
        }
    }
    // silent_transport is left unanswered on purpose.

    let results = driver.await.unwrap();

    // "gone" never entered the target set: a closed peer is excluded before
    // any call is issued, so only two results come back.
    assert_eq!(results.len(), 2);

    let responsive_result = results.iter().find(|r| r.id == "responsive").unwrap();
    assert!(matches!(responsive_result.outcome, CallOutcome::Ok(_)));

    let silent_result = results.iter().find(|r| r.id == "silent").unwrap();
    assert!(matches!(
        silent_result.outcome,
        CallOutcome::Err(PeerError::TimeoutError { .. })
    ));
}

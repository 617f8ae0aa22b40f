use std::sync::Arc;

use async_trait::async_trait;
use rpc_peer::{Peer, Transport};
use serde_json::Value;

/// Lifecycle callbacks a host can override selectively; every method has a
/// no-op default, mirroring how `AppRuntimeLauncher` lets callers inherit
/// defaults and only override the fields they care about.
#[async_trait]
pub trait Hooks: Send + Sync {
    async fn on_connect(&self, _peer: &Peer) {}
    async fn on_disconnect(&self, _peer: &Peer) {}
    async fn on_event(&self, _peer: &Peer, _event: &str, _data: &Value) {}
    async fn on_error(&self, _peer_id: Option<&str>, _error: &str) {}
    async fn on_close(&self) {}
    /// Fired after hibernation recovery lazily recreates a peer for a
    /// connection handle the multi-peer hadn't seen yet.
    async fn on_peer_recreated(&self, _peer: &Peer, _transport: &Arc<dyn Transport>) {}
}

/// The default no-op implementation, used when a host doesn't care about
/// any lifecycle event.
#[derive(Default)]
pub struct NoopHooks;

impl Hooks for NoopHooks {}

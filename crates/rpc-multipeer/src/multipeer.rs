use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use rpc_peer::{Peer, PeerError, Schema};
use rpc_wire::{Frame, Message, Protocol};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::hooks::Hooks;

/// A connection handle: opaque to `MultiPeer`, meaningful only to the host
/// and the transport layer that produces one per socket.
pub type ConnectionKey = String;

/// Builds a `Peer` for a connection handle that doesn't have one yet — used
/// both for ordinary connects and for hibernation recovery.
pub type PeerFactory = Arc<dyn Fn(&str) -> Peer + Send + Sync>;

/// Which peers a driver call or emit targets.
#[derive(Clone, Debug)]
pub enum IdsSpec {
    Single(String),
    Many(Vec<String>),
}

/// Per-target options for a fan-out driver call.
#[derive(Clone, Debug, Default)]
pub struct DriverOptions {
    pub ids: Option<IdsSpec>,
    pub timeout: Option<Duration>,
}

/// What a single target's call resolved to.
#[derive(Debug)]
pub enum CallOutcome {
    Ok(Value),
    Err(PeerError),
}

#[derive(Debug)]
pub struct DriverResult {
    pub id: ConnectionKey,
    pub outcome: CallOutcome,
}

pub struct MultiPeerConfig {
    pub factory: PeerFactory,
    pub hooks: Arc<dyn Hooks>,
    pub default_timeout: Duration,
    /// The protocol `emit` encodes through and inbound frames are peeked
    /// through to fire `on_event`. Shared with whatever protocol the peers
    /// the factory builds use — `MultiPeer` holds one shared wire encoding
    /// for the whole fleet, not one per peer.
    pub protocol: Arc<Protocol>,
    /// The single validation gate `emit` consults before fan-out, so every
    /// target peer sees the same accept/reject decision for a given event —
    /// not each peer's own (possibly differently declared) local schema.
    pub local_schema: Arc<Schema>,
}

/// Supervises a set of `Peer`s keyed by connection handle: fan-out driver
/// calls with per-call timeout racing, targeted `emit`, lifecycle hooks, and
/// lazy peer recreation for hibernation recovery.
pub struct MultiPeer {
    peers: Mutex<BTreeMap<ConnectionKey, Arc<Peer>>>,
    factory: PeerFactory,
    hooks: Arc<dyn Hooks>,
    default_timeout: Duration,
    protocol: Arc<Protocol>,
    local_schema: Arc<Schema>,
}

impl MultiPeer {
    pub fn new(config: MultiPeerConfig) -> Self {
        Self {
            peers: Mutex::new(BTreeMap::new()),
            factory: config.factory,
            hooks: config.hooks,
            default_timeout: config.default_timeout,
            protocol: config.protocol,
            local_schema: config.local_schema,
        }
    }

    /// Registers an already-constructed peer for `id` — the ordinary connect
    /// path, as opposed to lazy recreation in [`MultiPeer::handle_message`].
    pub async fn register_peer(&self, id: impl Into<ConnectionKey>, peer: Arc<Peer>) {
        let id = id.into();
        self.peers.lock().await.insert(id, peer.clone());
        self.hooks.on_connect(&peer).await;
    }

    pub async fn get_peer(&self, id: &str) -> Option<Arc<Peer>> {
        self.peers.lock().await.get(id).cloned()
    }

    pub async fn get_connection_count(&self) -> usize {
        self.peers.lock().await.len()
    }

    pub async fn get_connection_ids(&self) -> Vec<ConnectionKey> {
        self.peers.lock().await.keys().cloned().collect()
    }

    pub async fn close_peer(&self, id: &str) {
        let peer = self.peers.lock().await.remove(id);
        if let Some(peer) = peer {
            peer.close().await;
            self.hooks.on_disconnect(&peer).await;
        }
    }

    /// Closes and drops every peer, then fires `on_close`.
    pub async fn close_all(&self) {
        let mut guard = self.peers.lock().await;
        let peers: Vec<_> = guard.drain().map(|(_, peer)| peer).collect();
        drop(guard);
        for peer in &peers {
            peer.close().await;
        }
        self.hooks.on_close().await;
    }

    /// Routes an inbound frame for `id`. If no peer is registered for `id`
    /// yet, lazily creates one via the factory (hibernation recovery) and
    /// fires `on_peer_recreated` before dispatching. An `Event` frame also
    /// fires `on_event` with its raw (pre-peer-validation) payload, so a
    /// host observing fan-out traffic sees it regardless of whether that
    /// peer's own event handler is wired up.
    pub async fn handle_message(&self, id: &str, frame: Frame) {
        let existing = self.peers.lock().await.get(id).cloned();
        let peer = match existing {
            Some(peer) => peer,
            None => {
                let peer = Arc::new((self.factory)(id));
                self.peers.lock().await.insert(id.to_string(), peer.clone());
                self.hooks.on_peer_recreated(&peer, peer.transport()).await;
                peer
            }
        };

        if let Some(Message::Event { event, data }) = self.protocol.safe_decode_message(frame.clone()) {
            self.hooks.on_event(&peer, &event, &data).await;
        }

        peer.handle_message(frame).await;
    }

    async fn resolve_targets(&self, ids: &Option<IdsSpec>) -> Vec<(ConnectionKey, Arc<Peer>)> {
        let peers = self.peers.lock().await;
        match ids {
            None => peers
                .iter()
                .filter(|(_, peer)| peer.is_open())
                .map(|(id, peer)| (id.clone(), peer.clone()))
                .collect(),
            Some(IdsSpec::Single(id)) => peers
                .get(id)
                .filter(|peer| peer.is_open())
                .map(|peer| vec![(id.clone(), peer.clone())])
                .unwrap_or_default(),
            Some(IdsSpec::Many(ids)) => ids
                .iter()
                .filter_map(|id| {
                    peers
                        .get(id)
                        .filter(|peer| peer.is_open())
                        .map(|peer| (id.clone(), peer.clone()))
                })
                .collect(),
        }
    }

    /// Calls `method` on every peer the target set resolves to, in parallel,
    /// each raced against its own timeout. The result array preserves the
    /// order of target resolution.
    pub async fn call_many(&self, method: &str, params: Value, options: DriverOptions) -> Vec<DriverResult> {
        let targets = self.resolve_targets(&options.ids).await;
        let timeout = options.timeout.unwrap_or(self.default_timeout);

        let calls = targets.into_iter().map(|(id, peer)| {
            let method = method.to_string();
            let params = params.clone();
            async move {
                let outcome = match tokio::time::timeout(timeout, peer.call(&method, params)).await {
                    Ok(Ok(value)) => CallOutcome::Ok(value),
                    Ok(Err(err)) => CallOutcome::Err(err),
                    Err(_elapsed) => CallOutcome::Err(PeerError::TimeoutError { method, timeout }),
                };
                DriverResult { id, outcome }
            }
        });

        join_all(calls).await
    }

    /// Validates `data` once against the multi-peer's own declared event
    /// schema, then dispatches the single validated payload to every
    /// matching open peer — one central gate, not one re-validation per
    /// peer. A send failure for an individual peer is surfaced via
    /// `on_error` rather than failing the whole emit; the other targets
    /// still receive it.
    pub async fn emit(&self, event: &str, data: Value, ids: Option<IdsSpec>) {
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
        let frame = match self.protocol.encode_message(&message) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(event, %err, "emit dropped: encode failed");
                return;
            }
        };

        let targets = self.resolve_targets(&ids).await;
        let emits = targets.into_iter().map(|(id, peer)| {
            let frame = frame.clone();
            async move {
                if let Err(err) = peer.transport().send(frame).await {
                    warn!(%id, %err, "emit failed for peer");
                    self.hooks.on_error(Some(id.as_str()), &err).await;
                }
            }
        });
        join_all(emits).await;
    }
}

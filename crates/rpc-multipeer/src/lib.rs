#![forbid(unsafe_code)]
//! Supervises a set of [`rpc_peer::Peer`]s keyed by an opaque connection
//! handle: fan-out driver calls raced against per-call timeouts, targeted
//! event emission, lifecycle hooks, and lazy peer recreation so durable
//! callbacks keep reaching their continuations across a hibernate/resume
//! cycle.

mod hooks;
mod multipeer;

pub use hooks::{Hooks, NoopHooks};
pub use multipeer::{
    CallOutcome, ConnectionKey, DriverOptions, DriverResult, IdsSpec, MultiPeer, MultiPeerConfig,
    PeerFactory,
};

#![forbid(unsafe_code)]
//! One-to-one RPC endpoint: outbound calls with timeout scheduling, inbound
//! dispatch against a local provider, event emit/receive, and cancellation
//! on close.
//!
//! Builds on [`rpc_wire`] for the message shapes and codec/protocol layer.
//! The transport itself — the message-framed duplex a `Peer` sends frames
//! over and receives frames from — is consumed as the [`Transport`] trait;
//! see `rpc-transport-ws` for the WebSocket reference adapter.

mod error;
mod pending;
mod peer;
mod provider;
mod schema;
mod transport;

pub use error::PeerError;
pub use peer::{Peer, PeerConfig, PeerId};
pub use provider::{Handler, Provider};
pub use schema::{AnyValidator, JsonSchemaValidator, Schema, ValidationIssues, Validator};
pub use transport::{ReadyState, Transport};

#![forbid(unsafe_code)]
//! Durable continuation-passing calls: outgoing calls whose pending state
//! survives process hibernation by living in external synchronous storage
//! and completing into a named host callback instead of an in-memory
//! future.
//!
//! Builds on [`rpc_peer::Peer`] for everything that doesn't need to survive
//! a restart (promise-based calls, inbound dispatch, events).

mod callback;
mod durable_peer;
mod error;
mod storage;

pub use callback::{CallContext, CallbackPayload, CallbackRegistry};
pub use durable_peer::{DurablePeer, DurablePeerConfig};
pub use error::DurableError;
pub use storage::{
    JsonParamsCodec, MemoryPendingCallStorage, ParamsCodec, PendingCall,
    SqlitePendingCallStorage, SyncPendingCallStorage,
};

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use rpc_wire::Frame;

/// Mirrors the WebSocket `readyState` values a transport exposes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// The abstract message-duplex a `Peer` sends frames over. The transport
/// itself (the socket) is an external collaborator; only this interface is
/// consumed.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one frame. Implementations should treat a failed send the same
    /// way a fallible `send` should: surface it to the caller, don't
    /// silently retry.
    async fn send(&self, frame: Frame) -> Result<(), String>;

    /// Requests the transport close; idempotent.
    async fn close(&self, code: Option<u16>, reason: Option<String>);

    /// Current readiness, consulted before every outbound send.
    fn ready_state(&self) -> ReadyState;
}

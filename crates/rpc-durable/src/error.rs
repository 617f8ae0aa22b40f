use thiserror::Error;

/// Failure taxonomy specific to the durable layer. Ordinary call failures
/// still flow through [`rpc_peer::PeerError`]; this enum covers the
/// durable-only surface (callback resolution, storage).
#[derive(Debug, Error)]
pub enum DurableError {
    #[error("callback '{0}' is not registered")]
    UnknownCallback(String),

    #[error("durable storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for DurableError {
    fn from(err: rusqlite::Error) -> Self {
        DurableError::Storage(err.to_string())
    }
}

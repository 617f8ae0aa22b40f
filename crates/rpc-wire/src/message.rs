use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four-variant message union carried by the protocol, discriminated on
/// the wire by a `type` field (`rpc:request`, `rpc:response`, `rpc:error`,
/// `rpc:event`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "rpc:request")]
    Request {
        id: String,
        method: String,
        params: Value,
    },
    #[serde(rename = "rpc:response")]
    Response { id: String, result: Value },
    #[serde(rename = "rpc:error")]
    Error {
        id: String,
        code: i32,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    #[serde(rename = "rpc:event")]
    Event { event: String, data: Value },
}

impl Message {
    /// The correlation id for `Request`/`Response`/`Error`; `None` for `Event`,
    /// which is not correlated to a caller.
    pub fn id(&self) -> Option<&str> {
        match self {
            Message::Request { id, .. } => Some(id),
            Message::Response { id, .. } => Some(id),
            Message::Error { id, .. } => Some(id),
            Message::Event { .. } => None,
        }
    }
}

#![forbid(unsafe_code)]
//! Wire message shapes, pluggable codecs, and frame normalization for the
//! bidirectional RPC protocol.
//!
//! This crate owns components A (Codec) and B (Protocol): the four-variant
//! message union, JSON/MessagePack/CBOR encodings of it, and the logic that
//! turns a raw inbound frame (text, a single binary buffer, or a sequence of
//! binary chunks) into a normalized buffer ready for codec decoding.

mod codec;
mod error;
mod frame;
mod message;
mod protocol;

pub use codec::{BinaryCodec, CborCodec, JsonCodec, MsgPackCodec, TextCodec};
pub use error::{CodecError, ErrorCode};
pub use frame::Frame;
pub use message::Message;
pub use protocol::Protocol;

use crate::{CodecError, Message};

/// A codec whose wire representation is human-readable text.
pub trait TextCodec {
    fn encode(&self, message: &Message) -> Result<String, CodecError>;
    fn decode(&self, text: &str) -> Result<Message, CodecError>;
}

/// A codec whose wire representation is raw bytes.
pub trait BinaryCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError>;
}

/// Canonical text codec: JSON, matching the wire shapes in the external
/// interface's documented wire shapes byte-for-byte.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl TextCodec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<String, CodecError> {
        serde_json::to_string(message).map_err(|err| CodecError::Encode(err.to_string()))
    }

    fn decode(&self, text: &str) -> Result<Message, CodecError> {
        serde_json::from_str(text).map_err(|err| CodecError::Decode(err.to_string()))
    }
}

/// MessagePack binary codec, same logical object shape as `JsonCodec`.
#[derive(Clone, Copy, Debug, Default)]
pub struct MsgPackCodec;

impl BinaryCodec for MsgPackCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(message).map_err(|err| CodecError::Encode(err.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError> {
        rmp_serde::from_slice(bytes).map_err(|err| CodecError::Decode(err.to_string()))
    }
}

/// CBOR binary codec, same logical object shape as `JsonCodec`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CborCodec;

impl BinaryCodec for CborCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        ciborium::into_writer(message, &mut buf).map_err(|err| CodecError::Encode(err.to_string()))?;
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError> {
        ciborium::from_reader(bytes).map_err(|err| CodecError::Decode(err.to_string()))
    }
}

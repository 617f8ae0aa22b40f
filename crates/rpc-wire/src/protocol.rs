use serde_json::Value;

use crate::{BinaryCodec, CodecError, Frame, Message, TextCodec};

/// Either side of the codec split: a protocol is built around exactly one
/// codec, text or binary, chosen once at construction.
enum AnyCodec {
    Text(Box<dyn TextCodec + Send + Sync>),
    Binary(Box<dyn BinaryCodec + Send + Sync>),
}

/// Wraps a single codec and exposes typed message construction plus frame
/// normalization, independent of whether the underlying encoding is text or
/// binary.
pub struct Protocol {
    codec: AnyCodec,
}

impl Protocol {
    /// Build a protocol around a text codec (e.g. [`crate::JsonCodec`]).
    pub fn text(codec: impl TextCodec + Send + Sync + 'static) -> Self {
        Self {
            codec: AnyCodec::Text(Box::new(codec)),
        }
    }

    /// Build a protocol around a binary codec (e.g. [`crate::MsgPackCodec`]).
    pub fn binary(codec: impl BinaryCodec + Send + Sync + 'static) -> Self {
        Self {
            codec: AnyCodec::Binary(Box::new(codec)),
        }
    }

    pub fn create_request(&self, id: impl Into<String>, method: impl Into<String>, params: Value) -> Message {
        Message::Request {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    pub fn create_response(&self, id: impl Into<String>, result: Value) -> Message {
        Message::Response {
            id: id.into(),
            result,
        }
    }

    pub fn create_error(
        &self,
        id: impl Into<String>,
        code: i32,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Message {
        Message::Error {
            id: id.into(),
            code,
            message: message.into(),
            data,
        }
    }

    pub fn create_event(&self, event: impl Into<String>, data: Value) -> Message {
        Message::Event {
            event: event.into(),
            data,
        }
    }

    /// Encode a message into the wire frame this protocol's codec produces.
    pub fn encode_message(&self, message: &Message) -> Result<Frame, CodecError> {
        match &self.codec {
            AnyCodec::Text(codec) => codec.encode(message).map(Frame::Text),
            AnyCodec::Binary(codec) => codec.encode(message).map(Frame::Binary),
        }
    }

    /// Decode a message from a raw inbound frame, normalizing it first
    /// first: chunk sequences are reassembled, and a frame/codec kind
    /// mismatch is bridged via UTF-8 transcoding rather than rejected.
    pub fn decode_message(&self, frame: Frame) -> Result<Message, CodecError> {
        let frame = frame.reassembled();
        match (&self.codec, frame) {
            (AnyCodec::Text(codec), Frame::Text(text)) => codec.decode(&text),
            (AnyCodec::Text(codec), Frame::Binary(bytes)) => {
                let text = String::from_utf8(bytes)?;
                codec.decode(&text)
            }
            (AnyCodec::Binary(codec), Frame::Binary(bytes)) => codec.decode(&bytes),
            (AnyCodec::Binary(codec), Frame::Text(text)) => codec.decode(text.as_bytes()),
            (_, Frame::Chunks(_)) => unreachable!("reassembled() removes Frame::Chunks"),
        }
    }

    /// Same as [`Protocol::decode_message`] but swallows the error, returning
    /// `None` on any malformed frame. Callers on the inbound dispatch path
    /// use this and drop silently on any decode failure.
    pub fn safe_decode_message(&self, frame: Frame) -> Option<Message> {
        self.decode_message(frame).ok()
    }
}

/// A raw inbound frame as delivered by the transport, before codec decoding.
///
/// Mirrors the shapes a `tokio-tungstenite`-style duplex hands back: a text
/// frame, a single binary buffer, or — for fragmented messages — a sequence
/// of binary chunks that must be reassembled in order before decoding.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Chunks(Vec<Vec<u8>>),
}

impl Frame {
    /// Concatenates `Chunks` into a single `Binary` frame, preserving order.
    /// Other variants pass through unchanged.
    pub fn reassembled(self) -> Frame {
        match self {
            Frame::Chunks(chunks) => {
                let mut buf = Vec::with_capacity(chunks.iter().map(Vec::len).sum());
                for chunk in chunks {
                    buf.extend_from_slice(&chunk);
                }
                Frame::Binary(buf)
            }
            other => other,
        }
    }
}

#![forbid(unsafe_code)]
//! WebSocket [`Transport`](rpc_peer::Transport) adapter, built on
//! `tokio-tungstenite`. The socket itself stays an external collaborator:
//! `rpc-peer` never depends on this crate, only the other way around.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use rpc_peer::{Peer, ReadyState, Transport};
use rpc_wire::Frame;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message as WsMessage,
    MaybeTlsStream, WebSocketStream,
};
use tracing::warn;

#[derive(Debug, Error)]
pub enum WsTransportError {
    #[error("failed to connect: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Writer = SplitSink<WsStream, WsMessage>;

/// Transport half: owns the write side of the socket and tracks readiness.
pub struct WsTransport {
    writer: Mutex<Writer>,
    open: AtomicBool,
}

/// Reader half: drives inbound frames into a [`Peer`] until the socket
/// closes. Spawned separately from `WsTransport` construction so a `Peer`
/// (which needs the transport to already exist) can be built in between.
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
    transport: Arc<WsTransport>,
}

/// Connects to `url` and splits the socket into a sendable [`WsTransport`]
/// and a [`WsReader`] to be driven against a [`Peer`] once one exists.
pub async fn connect(url: &str) -> Result<(Arc<WsTransport>, WsReader), WsTransportError> {
    let (ws, _response) = connect_async(url).await?;
    let (writer, reader) = ws.split();
    let transport = Arc::new(WsTransport {
        writer: Mutex::new(writer),
        open: AtomicBool::new(true),
    });
    let reader = WsReader {
        stream: reader,
        transport: transport.clone(),
    };
    Ok((transport, reader))
}

impl WsReader {
    /// Runs the read loop, delivering every inbound frame to `peer` and
    /// closing `peer` when the socket ends, which cancels all of its
    /// pending calls.
    pub async fn run(mut self, peer: Arc<Peer>) {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(WsMessage::Text(text)) => peer.handle_message(Frame::Text(text)).await,
                Ok(WsMessage::Binary(bytes)) => peer.handle_message(Frame::Binary(bytes)).await,
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
                Ok(WsMessage::Close(_)) => break,
                Ok(WsMessage::Frame(_)) => {}
                Err(err) => {
                    warn!(%err, "websocket read error; closing peer");
                    break;
                }
            }
        }
        self.transport.open.store(false, Ordering::SeqCst);
        peer.close().await;
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, frame: Frame) -> Result<(), String> {
        if !self.open.load(Ordering::SeqCst) {
            return Err("transport is closed".to_string());
        }
        let message = match frame.reassembled() {
            Frame::Text(text) => WsMessage::Text(text),
            Frame::Binary(bytes) => WsMessage::Binary(bytes),
            Frame::Chunks(_) => unreachable!("reassembled() removes Frame::Chunks"),
        };
        self.writer
            .lock()
            .await
            .send(message)
            .await
            .map_err(|err| err.to_string())
    }

    async fn close(&self, code: Option<u16>, reason: Option<String>) {
        self.open.store(false, Ordering::SeqCst);
        let frame = code.map(|code| tokio_tungstenite::tungstenite::protocol::CloseFrame {
            code: code.into(),
            reason: reason.unwrap_or_default().into(),
        });
        let _ = self.writer.lock().await.send(WsMessage::Close(frame)).await;
    }

    fn ready_state(&self) -> ReadyState {
        if self.open.load(Ordering::SeqCst) {
            ReadyState::Open
        } else {
            ReadyState::Closed
        }
    }
}

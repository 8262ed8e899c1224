//! WebSocket transport over axum's upgraded socket.
//!
//! Events go out as JSON text frames. Heartbeats become ping frames; the
//! client's pongs (and any other frame) count as liveness.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use crate::application::ports::{
    Connection, Inbound, SessionEvent, TransportError, TransportReader, TransportWriter,
};

/// Split an upgraded socket into a session [`Connection`].
#[must_use]
pub fn connection(socket: WebSocket, peer: impl Into<String>) -> Connection {
    let (sink, stream) = socket.split();
    Connection::new(
        peer,
        Box::new(WsWriter { sink }),
        Box::new(WsReader { stream }),
    )
}

/// Encode an event as a WebSocket frame.
fn encode(event: &SessionEvent) -> Result<Message, TransportError> {
    match event {
        SessionEvent::Heartbeat => Ok(Message::Ping(Bytes::new())),
        other => serde_json::to_string(other)
            .map(|json| Message::Text(json.into()))
            .map_err(|e| TransportError::Encode(e.to_string())),
    }
}

/// Outbound half.
pub struct WsWriter {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl TransportWriter for WsWriter {
    async fn send(&mut self, event: &SessionEvent) -> Result<(), TransportError> {
        let frame = encode(event)?;
        self.sink
            .send(frame)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // The peer may already be gone; a failed close frame is not an error.
        let _ = self.sink.send(Message::Close(None)).await;
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

/// Inbound half.
pub struct WsReader {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl TransportReader for WsReader {
    async fn recv(&mut self) -> Result<Inbound, TransportError> {
        match self.stream.next().await {
            Some(Ok(Message::Close(_))) | None => Ok(Inbound::Closed),
            Some(Ok(_)) => Ok(Inbound::Frame),
            Some(Err(e)) => Err(TransportError::Io(e.to_string())),
        }
    }
}

//! In-process transport.
//!
//! [`pair`] returns a session [`Connection`] and the [`MemoryClient`] that
//! sits on the other end of it.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::application::ports::{
    Connection, Inbound, SessionEvent, TransportError, TransportReader, TransportWriter,
};

/// Create a connected pair. `capacity` bounds the events buffered toward
/// the client before writes start to block.
#[must_use]
pub fn pair(peer: impl Into<String>, capacity: usize) -> (Connection, MemoryClient) {
    let (event_tx, event_rx) = mpsc::channel(capacity.max(1));
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();

    let connection = Connection::new(
        peer,
        Box::new(MemoryWriter { events: event_tx }),
        Box::new(MemoryReader { frames: frame_rx }),
    );
    let client = MemoryClient {
        events: event_rx,
        frames: Some(frame_tx),
    };
    (connection, client)
}

struct MemoryWriter {
    events: mpsc::Sender<SessionEvent>,
}

#[async_trait]
impl TransportWriter for MemoryWriter {
    async fn send(&mut self, event: &SessionEvent) -> Result<(), TransportError> {
        self.events
            .send(event.clone())
            .await
            .map_err(|_| TransportError::Closed)
    }
}

struct MemoryReader {
    frames: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl TransportReader for MemoryReader {
    async fn recv(&mut self) -> Result<Inbound, TransportError> {
        Ok(self.frames.recv().await.unwrap_or(Inbound::Closed))
    }
}

/// Client end of an in-process connection.
#[derive(Debug)]
pub struct MemoryClient {
    events: mpsc::Receiver<SessionEvent>,
    frames: Option<mpsc::UnboundedSender<Inbound>>,
}

impl MemoryClient {
    /// Next event other than a heartbeat, or `None` once the session has
    /// stopped writing.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            match self.events.recv().await? {
                SessionEvent::Heartbeat => {}
                event => return Some(event),
            }
        }
    }

    /// Next event of any kind, including heartbeats.
    pub async fn next_raw(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Send a liveness frame (e.g. a pong).
    pub fn touch(&self) {
        if let Some(frames) = &self.frames {
            let _ = frames.send(Inbound::Frame);
        }
    }

    /// Close the connection from the client side.
    pub fn close(&mut self) {
        if let Some(frames) = self.frames.take() {
            let _ = frames.send(Inbound::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_flow_to_the_client() {
        let (mut connection, mut client) = pair("mem", 4);
        connection.writer.send(&SessionEvent::Heartbeat).await.unwrap();
        connection
            .writer
            .send(&SessionEvent::info("hello"))
            .await
            .unwrap();

        assert_eq!(client.next_event().await, Some(SessionEvent::info("hello")));
    }

    #[tokio::test]
    async fn close_is_seen_by_the_reader() {
        let (mut connection, mut client) = pair("mem", 4);
        client.touch();
        client.close();

        assert_eq!(connection.reader.recv().await.unwrap(), Inbound::Frame);
        assert_eq!(connection.reader.recv().await.unwrap(), Inbound::Closed);
        assert_eq!(connection.reader.recv().await.unwrap(), Inbound::Closed);
    }

    #[tokio::test]
    async fn dropped_client_fails_writes() {
        let (mut connection, client) = pair("mem", 4);
        drop(client);
        assert!(matches!(
            connection.writer.send(&SessionEvent::info("x")).await,
            Err(TransportError::Closed)
        ));
    }
}

//! Outbound event delivery.
//!
//! A bounded queue sits between the session and its peer; a dedicated writer
//! task drains it into a [`PeerSink`]. The coordinating loop only ever
//! enqueues without waiting, so a slow peer cannot stall it.

use crate::error::{Result, SessionError};
use crate::session::protocol::ServerEvent;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Destination for events addressed to one peer (usually a socket writer).
#[async_trait]
pub trait PeerSink: Send + 'static {
    async fn send(&mut self, event: ServerEvent) -> Result<()>;

    /// Name for logging.
    fn name(&self) -> &'static str {
        "peer"
    }
}

/// Sink that forwards events to an unbounded channel. Used by tests and by
/// transports that do their own framing.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl PeerSink for ChannelSink {
    async fn send(&mut self, event: ServerEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| SessionError::Transport {
            message: "peer channel closed".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Producer side of the outbound queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<ServerEvent>,
}

impl EventSender {
    /// Best-effort notification. Dropped with a warning when the queue is full.
    pub fn notify(&self, event: ServerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Outbound queue full, dropping {:?}", event.as_status());
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Outbound queue closed, dropping event");
            }
        }
    }

    /// Enqueue, waiting for queue capacity. Used for audio, which must not be
    /// dropped out of the middle of a stream.
    pub async fn send(&self, event: ServerEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| SessionError::Transport {
            message: "outbound queue closed".to_string(),
        })
    }
}

/// Create the outbound queue and spawn its writer task.
///
/// The writer exits once every [`EventSender`] clone is dropped and the
/// queue is drained. Delivery failures are logged and swallowed.
pub fn spawn_writer(
    sink: Box<dyn PeerSink>,
    capacity: usize,
) -> (EventSender, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(write_loop(sink, rx));
    (EventSender { tx }, handle)
}

async fn write_loop(mut sink: Box<dyn PeerSink>, mut rx: mpsc::Receiver<ServerEvent>) {
    let mut dropped = 0usize;
    while let Some(event) = rx.recv().await {
        if let Err(e) = sink.send(event).await {
            dropped += 1;
            debug!("Failed to deliver event to {}: {}", sink.name(), e);
        }
    }
    if dropped > 0 {
        debug!("Writer for {} finished, {} event(s) undelivered", sink.name(), dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::protocol::Status;

    struct FailingSink;

    #[async_trait]
    impl PeerSink for FailingSink {
        async fn send(&mut self, _event: ServerEvent) -> Result<()> {
            Err(SessionError::Transport {
                message: "broken pipe".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        let (sender, writer) = spawn_writer(Box::new(sink), 8);

        sender.notify(ServerEvent::status(Status::Connected, "hi"));
        sender.send(ServerEvent::Pong).await.unwrap();
        drop(sender);
        writer.await.unwrap();

        assert_eq!(rx.recv().await.unwrap().as_status(), Some(Status::Connected));
        assert_eq!(rx.recv().await.unwrap(), ServerEvent::Pong);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_is_swallowed() {
        let (sender, writer) = spawn_writer(Box::new(FailingSink), 4);
        sender.notify(ServerEvent::Pong);
        sender.send(ServerEvent::Pong).await.unwrap();
        drop(sender);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_notify_drops_when_full() {
        // No writer: fill the queue directly.
        let (tx, mut rx) = mpsc::channel(1);
        let sender = EventSender { tx };
        sender.notify(ServerEvent::Pong);
        sender.notify(ServerEvent::status(Status::Idle, "dropped"));
        drop(sender);

        assert_eq!(rx.recv().await, Some(ServerEvent::Pong));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_closed_peer_does_not_block_sender() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        let (sender, writer) = spawn_writer(Box::new(sink), 2);
        for _ in 0..10 {
            sender.send(ServerEvent::Pong).await.unwrap();
        }
        drop(sender);
        writer.await.unwrap();
    }
}

//! ReviewDock Transport
//!
//! Owns the lifecycle of one persistent connection to the analysis
//! pipeline: open, send, receive, close. No business logic lives here.
//!
//! Connection progress is reported asynchronously as [`TransportEvent`]s
//! pushed into a channel supplied by the caller. Every event is tagged with
//! the [`Generation`] of the handle that produced it so the consumer can
//! discard notifications from handles it has already abandoned.

pub mod memory;
pub mod websocket;

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::{MemoryServer, MemoryTransport};
pub use websocket::WsTransport;

/// Errors that can occur on a transport handle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Failed to send: {0}")]
    Send(String),
}

/// Monotonic tag identifying one opened handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Generation {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Notification emitted by a transport handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub generation: Generation,
    pub kind: TransportEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// Connection established; outbound sends are now delivered
    Opened,

    /// One inbound text frame
    Frame(String),

    /// Connection failed or dropped
    Error(String),

    /// Peer closed the connection
    Closed { reason: Option<String> },
}

impl TransportEvent {
    pub fn new(generation: Generation, kind: TransportEventKind) -> Self {
        Self { generation, kind }
    }
}

/// Sink the transport pushes notifications into
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Opens connections.
///
/// `open` never blocks: it returns a handle immediately and reports
/// progress through `events`.
pub trait Transport: Send + Sync {
    fn open(&self, url: &str, generation: Generation, events: EventSender)
        -> Box<dyn TransportHandle>;
}

/// One live (or pending) connection
pub trait TransportHandle: Send {
    fn generation(&self) -> Generation;

    /// Queue a text message. Messages sent before `Opened` are held until
    /// the connection is established.
    fn send(&self, text: String) -> Result<(), TransportError>;

    /// Best-effort close; does not wait for acknowledgment and emits no
    /// further notifications the caller needs to act on.
    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generations_increase() {
        let first = Generation::default();
        let second = first.next();
        assert!(second > first);
        assert_eq!(second, Generation(1));
        assert_eq!(second.to_string(), "gen-1");
    }
}

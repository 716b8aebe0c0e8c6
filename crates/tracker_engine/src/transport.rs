use tracker_core::CloseKind;

use crate::TransportError;

/// One inbound event from an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Text(String),
    /// The connection ended; no further events follow.
    Closed(CloseKind),
}

/// Opens progress streams addressed by task id.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, task_id: &str) -> Result<Box<dyn Connection>, TransportError>;
}

/// An open progress stream.
///
/// `recv` must be cancel-safe: the connection driver races it against
/// outbound commands and shutdown.
#[async_trait::async_trait]
pub trait Connection: Send {
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    async fn recv(&mut self) -> TransportEvent;

    /// Graceful client-side close.
    async fn close(&mut self) -> Result<(), TransportError>;
}

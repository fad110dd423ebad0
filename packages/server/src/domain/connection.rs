//! Both directions of a chat connection as the core sees them.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::RenderError;

/// Per-recipient delivery failure. Only ever logged by the fan-out.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("connection closed")]
    Closed,

    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

/// A handle the room keeps for each registered connection.
///
/// Implementations own the transport; the room only pushes rendered payloads.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send(&self, payload: String) -> Result<(), DeliveryError>;
}

/// Fatal receive failure; ends the affected session only.
#[derive(Debug, Error)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

/// One inbound unit from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A candidate chat message
    Chat(String),
    /// A frame that could not be decoded; carries the decoder's reason
    Malformed(String),
    EndOfStream,
}

/// Inbound side of a chat connection.
#[async_trait]
pub trait FrameSource: Send {
    async fn receive(&mut self) -> Result<Inbound, TransportError>;
}

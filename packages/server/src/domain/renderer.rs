//! Rendering collaborator.
//!
//! The core decides *what* each connection is told and *when*; the
//! renderer owns the output format.

use std::sync::Arc;

use thiserror::Error;

use super::{ChatError, Message, Participant};

#[derive(Debug, Error)]
#[error("failed to render payload: {0}")]
pub struct RenderError(pub String);

pub trait Renderer: Send + Sync {
    /// A newly committed message as seen by `recipient`
    fn message(&self, recipient: &Participant, message: &Message) -> Result<String, RenderError>;

    /// The history snapshot sent to a freshly connected participant
    fn history(
        &self,
        recipient: &Participant,
        messages: &[Arc<Message>],
    ) -> Result<String, RenderError>;

    /// Current number of participants in the room
    fn participants(&self, count: usize) -> Result<String, RenderError>;

    /// An error for the acting connection, or `None` to clear the shown error
    fn error(&self, error: Option<&ChatError>) -> Result<String, RenderError>;

    /// Enable or disable the sender's input form
    fn form(&self, disabled: bool) -> Result<String, RenderError>;
}

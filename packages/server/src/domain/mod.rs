//! ドメイン層
//!
//! Immutable values (`Participant`, `Message`), the chat error taxonomy and
//! the traits the room uses to reach the outside world (`Connection`,
//! `Renderer`).

pub mod connection;
pub mod error;
pub mod message;
pub mod participant;
pub mod renderer;
pub mod sanitize;

pub use connection::{Connection, DeliveryError, FrameSource, Inbound, TransportError};
pub use error::{ChatError, Scope, Severity};
pub use message::{MAX_MESSAGE_CHARS, Message, TRUNCATION_MARKER};
pub use participant::{Participant, ParticipantId};
pub use renderer::{RenderError, Renderer};

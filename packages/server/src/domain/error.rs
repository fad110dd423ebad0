//! Chat error taxonomy.
//!
//! Every error a connection can see carries two orthogonal tags: a
//! [`Severity`] and a [`Scope`]. `Local` errors concern only the acting
//! connection's next action; `Global` errors concern the viability of the
//! whole connection and suppress further interaction until cleared.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Local,
    Global,
}

/// Errors surfaced to a chat connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Trimmed content was empty
    #[error("message content cannot be empty")]
    MessageEmpty,

    /// The participant already holds a live connection
    #[error("you can only have one instance of the chat")]
    ExistingSession,

    /// The registry is at capacity
    #[error("room is full. please retry later")]
    RoomFull,

    /// The participant's token bucket is exhausted
    #[error("why so fast? please wait a moment")]
    RateLimited,

    /// Undecodable frame or any other processing failure
    #[error("could not read your message")]
    Unknown,
}

impl ChatError {
    pub fn severity(&self) -> Severity {
        match self {
            ChatError::RateLimited => Severity::Warning,
            ChatError::MessageEmpty
            | ChatError::ExistingSession
            | ChatError::RoomFull
            | ChatError::Unknown => Severity::Error,
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            ChatError::MessageEmpty | ChatError::RateLimited => Scope::Local,
            ChatError::ExistingSession | ChatError::RoomFull | ChatError::Unknown => Scope::Global,
        }
    }
}

//! HTTP API response DTOs.

use serde::{Deserialize, Serialize};

use super::websocket::MessageDto;

/// Read-only snapshot of the room
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSnapshotDto {
    pub participants: usize,
    pub messages: Vec<MessageDto>,
}

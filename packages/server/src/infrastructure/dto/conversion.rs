//! Domain Model と DTO の変換

use hiroba_shared::time::format_rfc3339;

use crate::domain::{ChatError, Message, ParticipantId};

use super::websocket::{MessageDto, ServerEvent};

impl MessageDto {
    /// Message（Domain Model）から MessageDto へ変換
    ///
    /// # Arguments
    ///
    /// * `message` - 変換するメッセージ
    /// * `recipient` - 受信者の ID（`own` フラグを決める。`None` は匿名の閲覧者）
    pub fn from_message(message: &Message, recipient: Option<&ParticipantId>) -> Self {
        let author = message.author();
        Self {
            author_id: author.id().to_string(),
            author_name: author.name().to_string(),
            content: message.content().to_string(),
            created_at: format_rfc3339(&message.created_at()),
            own: recipient.is_some_and(|id| *id == author.id()),
        }
    }
}

impl From<Option<&ChatError>> for ServerEvent {
    fn from(error: Option<&ChatError>) -> Self {
        match error {
            Some(error) => ServerEvent::Error {
                message: Some(error.to_string()),
                severity: Some(error.severity()),
                scope: Some(error.scope()),
            },
            None => ServerEvent::Error {
                message: None,
                severity: None,
                scope: None,
            },
        }
    }
}

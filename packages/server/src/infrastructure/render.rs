//! WebSocket 用の JSON Renderer

use std::sync::Arc;

use crate::domain::{ChatError, Message, Participant, RenderError, Renderer};

use super::dto::websocket::{MessageDto, ServerEvent};

/// 各イベントを 1 つの JSON テキストフレームとして描画する
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl JsonRenderer {
    fn encode(event: &ServerEvent) -> Result<String, RenderError> {
        serde_json::to_string(event).map_err(|e| RenderError(e.to_string()))
    }
}

impl Renderer for JsonRenderer {
    fn message(&self, recipient: &Participant, message: &Message) -> Result<String, RenderError> {
        Self::encode(&ServerEvent::Message(MessageDto::from_message(
            message,
            Some(&recipient.id()),
        )))
    }

    fn history(
        &self,
        recipient: &Participant,
        messages: &[Arc<Message>],
    ) -> Result<String, RenderError> {
        let messages = messages
            .iter()
            .map(|m| MessageDto::from_message(m, Some(&recipient.id())))
            .collect();
        Self::encode(&ServerEvent::History { messages })
    }

    fn participants(&self, count: usize) -> Result<String, RenderError> {
        Self::encode(&ServerEvent::Participants { count })
    }

    fn error(&self, error: Option<&ChatError>) -> Result<String, RenderError> {
        Self::encode(&ServerEvent::from(error))
    }

    fn form(&self, disabled: bool) -> Result<String, RenderError> {
        Self::encode(&ServerEvent::Form { disabled })
    }
}

//! WebSocket message DTOs.

use serde::{Deserialize, Serialize};

use crate::domain::{Scope, Severity};

/// Inbound frame: `{"chat_message": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatInput {
    pub chat_message: String,
}

/// 受信者 1 人から見たチャットメッセージ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageDto {
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    /// RFC 3339, UTC
    pub created_at: String,
    /// 受信者自身が書いたメッセージか
    pub own: bool,
}

/// 送信イベント（`type` でタグ付け）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    Message(MessageDto),
    History {
        messages: Vec<MessageDto>,
    },
    Participants {
        count: usize,
    },
    /// `message: None` は表示中のエラーを消す
    Error {
        message: Option<String>,
        severity: Option<Severity>,
        scope: Option<Scope>,
    },
    Form {
        disabled: bool,
    },
}

//! UseCase: 全セッションで共有する状態

use std::sync::Arc;

use crate::{
    config::ChatConfig,
    domain::Renderer,
    infrastructure::{RateLimiterRegistry, Room},
};

/// 全セッションで共有する Room・リミッター・Renderer
pub struct ChatContext {
    /// Room（参加者の登録とメッセージ履歴）
    pub room: Room,
    /// RateLimiterRegistry（参加者ごとのトークンバケット）
    pub limiters: RateLimiterRegistry,
    /// Renderer（送信フォーマットの抽象化）
    pub renderer: Arc<dyn Renderer>,
    pub config: ChatConfig,
}

impl ChatContext {
    /// 新しい ChatContext を作成
    pub fn new(config: ChatConfig, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            room: Room::new(&config),
            limiters: RateLimiterRegistry::new(),
            renderer,
            config,
        }
    }
}

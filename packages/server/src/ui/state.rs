//! Shared application state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{config::ChatConfig, infrastructure::JsonRenderer, usecase::ChatContext};

pub struct AppState {
    /// The room every WebSocket session joins
    pub context: Arc<ChatContext>,
    /// Parent of every session's cancellation token; cancelled on shutdown
    pub shutdown: CancellationToken,
}

impl AppState {
    /// State with the bundled JSON renderer
    pub fn new(config: ChatConfig) -> Self {
        Self {
            context: Arc::new(ChatContext::new(config, Arc::new(JsonRenderer))),
            shutdown: CancellationToken::new(),
        }
    }
}

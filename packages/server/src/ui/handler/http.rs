//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::{
    infrastructure::dto::{http::RoomSnapshotDto, websocket::MessageDto},
    ui::state::AppState,
};

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Participant count and history, oldest first
pub async fn room_snapshot(State(state): State<Arc<AppState>>) -> Json<RoomSnapshotDto> {
    let room = &state.context.room;
    let participants = room.num_participants().await;
    let messages = room
        .history()
        .await
        .iter()
        .map(|m| MessageDto::from_message(m, None))
        .collect();

    Json(RoomSnapshotDto {
        participants,
        messages,
    })
}

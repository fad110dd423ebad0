//! WebSocket connection handlers.
//!
//! Each socket is split into a reader task feeding a bounded inbound queue
//! and a writer task draining a bounded outbound queue. The chat session in
//! between only sees a `FrameSource` and a `Connection`.

use std::{str::FromStr, sync::Arc};

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use serde::Deserialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{Connection, Inbound, Participant, ParticipantId, TransportError},
    infrastructure::{ChannelConnection, ChannelFrameSource, dto::websocket::ChatInput},
    ui::state::AppState,
    usecase::ChatSession,
};

/// Display names longer than this are cut
pub const MAX_NAME_CHARS: usize = 32;

/// Query parameters for WebSocket connection
///
/// Both are optional: a missing id is generated, a missing name is derived
/// from the id.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl ConnectQuery {
    /// Resolve the participant this connection speaks for
    pub fn into_participant(self) -> Result<Participant, uuid::Error> {
        let id = match self.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => ParticipantId::from_str(raw)?,
            None => ParticipantId::generate(),
        };

        let name: String = self
            .name
            .as_deref()
            .unwrap_or_default()
            .trim()
            .chars()
            .take(MAX_NAME_CHARS)
            .collect();
        let name = if name.is_empty() { guest_name(&id) } else { name };

        Ok(Participant::new(id, name))
    }
}

/// `guest-` followed by the first four hex digits of the id
fn guest_name(id: &ParticipantId) -> String {
    let suffix: String = id.as_uuid().simple().to_string().chars().take(4).collect();
    format!("guest-{}", suffix)
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let raw_id = query.id.clone();
    let participant = match query.into_participant() {
        Ok(participant) => participant,
        Err(e) => {
            tracing::warn!(participant.id = ?raw_id, error = %e, "Invalid participant id");
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, participant)))
}

/// Decode one text frame. Anything that is not a chat input is malformed.
fn decode_frame(text: &str) -> Inbound {
    match serde_json::from_str::<ChatInput>(text) {
        Ok(input) => Inbound::Chat(input.chat_message),
        Err(e) => Inbound::Malformed(e.to_string()),
    }
}

/// Spawns a task that pushes queued payloads to the WebSocket sender.
///
/// Ends once every `Connection` handle has been dropped and the queue is
/// drained, or when the socket stops accepting writes. A write failure
/// cancels the session.
fn pusher_loop(
    mut rx: mpsc::Receiver<String>,
    mut sender: SplitSink<WebSocket, Message>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if let Err(e) = sender.send(Message::Text(payload.into())).await {
                tracing::debug!(error = %e, "WebSocket write failed");
                cancel.cancel();
                return;
            }
        }
        let _ = sender.close().await;
    })
}

/// Spawns a task that turns socket frames into `Inbound` values.
///
/// Close, end of stream and read errors are forwarded as the final item;
/// the session's cancellation token is then cancelled so a pending
/// rate-limit wait does not outlive the peer.
fn reader_loop(
    mut receiver: SplitStream<WebSocket>,
    frames: mpsc::Sender<Result<Inbound, TransportError>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let terminal = loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                frame = receiver.next() => frame,
            };

            let inbound = match frame {
                Some(Ok(Message::Text(text))) => decode_frame(text.as_str()),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => decode_frame(text),
                    Err(e) => Inbound::Malformed(e.to_string()),
                },
                // answered by the protocol layer
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => break Ok(Inbound::EndOfStream),
                Some(Err(e)) => break Err(TransportError(e.to_string())),
            };

            if frames.send(Ok(inbound)).await.is_err() {
                return;
            }
        };

        let _ = frames.send(terminal).await;
        cancel.cancel();
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, participant: Participant) {
    let context = state.context.clone();
    let buffer = context.config.outbound_buffer.max(1);
    let send_timeout = context.config.send_timeout;

    let (sender, receiver) = socket.split();
    let cancel = state.shutdown.child_token();
    let (outbound_tx, outbound_rx) = mpsc::channel(buffer);
    let (inbound_tx, inbound_rx) = mpsc::channel(buffer);

    let mut writer = pusher_loop(outbound_rx, sender, cancel.clone());
    let reader = reader_loop(receiver, inbound_tx, cancel.clone());

    tracing::info!(
        participant.id = %participant.id(),
        participant.name = %participant.name(),
        "WebSocket connected"
    );

    let connection: Arc<dyn Connection> = Arc::new(ChannelConnection::new(outbound_tx));
    let session = ChatSession::new(
        context,
        participant,
        connection,
        ChannelFrameSource::new(inbound_rx),
        cancel.clone(),
    );
    let participant_id = session.participant().id();
    let reason = session.run().await;

    cancel.cancel();
    reader.abort();

    // the session dropped its handle; flush what is still queued
    if tokio::time::timeout(send_timeout, &mut writer).await.is_err() {
        tracing::warn!(participant.id = %participant_id, "Outbound flush timed out");
        writer.abort();
    }

    tracing::info!(participant.id = %participant_id, ?reason, "WebSocket closed");
}

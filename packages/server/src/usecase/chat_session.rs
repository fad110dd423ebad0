//! UseCase: チャット接続のプロトコル処理
//!
//! 1 つの `ChatSession` が 1 接続を
//! `Connecting → Active → Draining(reason) → Closed` の順に進める。
//!
//! 受信したチャットフレームは、レート制限 → メッセージ生成 → 履歴への追加 →
//! ブロードキャスト → 送信者への応答、の順に処理される。`Draining` での
//! 後始末はどの終了経路でも必ず実行される。
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ChatSession::run() の状態遷移と 1 フレームごとの処理
//!
//! ### なぜこのテストが必要か
//! - 不正なフレームや検証エラーで接続が切れないことを保証
//! - レート制限中の待機と、その後の同じ内容の再処理を保証
//! - 切断時の後始末（登録解除、リミッター解放、参加者数の通知）を保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：接続、送信、ブロードキャスト、切断
//! - 異常系：重複セッション、不正フレーム、空メッセージ、転送エラー
//! - エッジケース：レート制限待機中の切断

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::domain::{
    ChatError, Connection, DeliveryError, FrameSource, Inbound, Message, Participant,
    RenderError, Scope,
};

use super::ChatContext;

/// セッションが `Active` 状態を抜けた理由
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainReason {
    /// 相手がストリームを閉じた
    Normal,
    /// 登録に失敗した（エラーは相手に送信済み）
    Rejected(ChatError),
    /// 回復できない受信エラー
    Transport(String),
    /// キャンセルトークンが発火した
    Cancelled,
}

/// セッションの状態（前方向にのみ遷移する）
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionState {
    Connecting,
    Active,
    Draining(DrainReason),
    Closed,
}

/// 接続相手と Room へ送信するためのハンドル一式
struct Outbox {
    /// ChatContext（Room・リミッター・Renderer の共有状態）
    context: Arc<ChatContext>,
    /// このセッションの参加者（Domain Model）
    participant: Participant,
    /// この接続への送信ハンドル
    connection: Arc<dyn Connection>,
}

impl Outbox {
    /// 描画済みのペイロードをこの接続にだけ送信
    async fn reply(&self, payload: Result<String, RenderError>) {
        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(participant.id = %self.participant.id(), error = %e, "Failed to render reply");
                return;
            }
        };

        let timeout = self.context.config.send_timeout;
        match tokio::time::timeout(timeout, self.connection.send(payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(participant.id = %self.participant.id(), error = %e, "Failed to send reply");
            }
            Err(_) => {
                tracing::warn!(participant.id = %self.participant.id(), ?timeout, "Reply timed out");
            }
        }
    }

    async fn reply_error(&self, error: &ChatError) {
        match error.scope() {
            Scope::Global => {
                tracing::warn!(participant.id = %self.participant.id(), %error, "Global chat error")
            }
            Scope::Local => {
                tracing::debug!(participant.id = %self.participant.id(), %error, "Local chat error")
            }
        }
        self.reply(self.context.renderer.error(Some(error))).await;
    }

    /// エラー表示を消し、入力フォームを再び有効にする
    async fn reset_form(&self) {
        self.reply(self.context.renderer.form(false)).await;
        self.reply(self.context.renderer.error(None)).await;
    }

    async fn broadcast_participants(&self) {
        let count = self.context.room.num_participants().await;
        let payload = match self.context.renderer.participants(count) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to render participant count");
                return;
            }
        };

        self.context
            .room
            .broadcast(self.context.config.send_timeout, move |_, connection| {
                let payload = payload.clone();
                async move { connection.send(payload).await }
            })
            .await;
    }

    async fn broadcast_message(&self, message: Arc<Message>) {
        let renderer = self.context.renderer.clone();
        let report = self
            .context
            .room
            .broadcast(self.context.config.send_timeout, move |recipient, connection| {
                let renderer = renderer.clone();
                let message = message.clone();
                async move {
                    match renderer.message(&recipient, &message) {
                        Ok(payload) => connection.send(payload).await,
                        Err(e) => Err(DeliveryError::from(e)),
                    }
                }
            })
            .await;

        tracing::debug!(
            participant.id = %self.participant.id(),
            delivered = report.delivered,
            failed = report.failed,
            "Message broadcast"
        );
    }
}

/// 1 接続分のチャットプロトコル
pub struct ChatSession<S> {
    outbox: Outbox,
    source: S,
    cancel: CancellationToken,
    state: SessionState,
    registered: bool,
}

impl<S: FrameSource> ChatSession<S> {
    /// 新しい ChatSession を作成
    ///
    /// # Arguments
    ///
    /// * `context` - 全セッションで共有する ChatContext
    /// * `participant` - 接続してきた参加者（Domain Model）
    /// * `connection` - この接続への送信ハンドル
    /// * `source` - この接続からの受信フレーム
    /// * `cancel` - セッションを中断するトークン（レート制限の待機も中断する）
    pub fn new(
        context: Arc<ChatContext>,
        participant: Participant,
        connection: Arc<dyn Connection>,
        source: S,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            outbox: Outbox {
                context,
                participant,
                connection,
            },
            source,
            cancel,
            state: SessionState::Connecting,
            registered: false,
        }
    }

    pub fn participant(&self) -> &Participant {
        &self.outbox.participant
    }

    /// セッションを `Closed` になるまで実行
    ///
    /// # Returns
    ///
    /// * `DrainReason` - `Active` 状態を抜けた理由
    pub async fn run(mut self) -> DrainReason {
        let reason = match self.connect().await {
            Ok(()) => self.serve().await,
            Err(error) => {
                self.outbox.reply_error(&error).await;
                DrainReason::Rejected(error)
            }
        };

        self.transition(SessionState::Draining(reason.clone()));
        self.close().await;
        self.transition(SessionState::Closed);

        tracing::info!(
            participant.id = %self.outbox.participant.id(),
            ?reason,
            "Session closed"
        );

        reason
    }

    async fn connect(&mut self) -> Result<(), ChatError> {
        let outbox = &self.outbox;
        outbox
            .context
            .room
            .add_client(outbox.participant.clone(), outbox.connection.clone())
            .await?;
        self.registered = true;
        self.transition(SessionState::Active);

        tracing::info!(
            participant.id = %self.outbox.participant.id(),
            participant.name = %self.outbox.participant.name(),
            "Participant joined"
        );

        let outbox = &self.outbox;
        let history = outbox.context.room.history().await;
        outbox
            .reply(outbox.context.renderer.history(&outbox.participant, &history))
            .await;
        outbox.broadcast_participants().await;

        Ok(())
    }

    async fn serve(&mut self) -> DrainReason {
        loop {
            let inbound = tokio::select! {
                biased;
                inbound = self.source.receive() => inbound,
                _ = self.cancel.cancelled() => return DrainReason::Cancelled,
            };

            match inbound {
                Ok(Inbound::Chat(content)) => {
                    if let Err(reason) = handle_chat(&self.outbox, &self.cancel, content).await {
                        return reason;
                    }
                }
                Ok(Inbound::Malformed(reason)) => {
                    tracing::warn!(participant.id = %self.outbox.participant.id(), %reason, "Malformed frame");
                    self.outbox.reply_error(&ChatError::Unknown).await;
                }
                Ok(Inbound::EndOfStream) => return DrainReason::Normal,
                Err(e) => {
                    tracing::error!(participant.id = %self.outbox.participant.id(), error = %e, "Receive failed");
                    return DrainReason::Transport(e.to_string());
                }
            }
        }
    }

    async fn close(&mut self) {
        if !self.registered {
            return;
        }
        self.registered = false;

        let outbox = &self.outbox;
        let id = outbox.participant.id();
        if outbox.context.room.remove_client(&id).await {
            outbox.context.limiters.release(&id);
            outbox.broadcast_participants().await;
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(
            participant.id = %self.outbox.participant.id(),
            from = ?self.state,
            to = ?next,
            "Session state changed"
        );
        self.state = next;
    }
}

/// チャットフレームを 1 つ処理する
///
/// # Arguments
///
/// * `outbox` - 送信者への応答とブロードキャストに使うハンドル
/// * `cancel` - レート制限の待機を中断するトークン
/// * `content` - 受信したメッセージ本文（未検証）
///
/// # Returns
///
/// * `Ok(())` - 処理を続行（検証エラーも含む）
/// * `Err(DrainReason::Cancelled)` - レート制限の待機中にキャンセルされた
async fn handle_chat(
    outbox: &Outbox,
    cancel: &CancellationToken,
    content: String,
) -> Result<(), DrainReason> {
    let context = &outbox.context;
    let id = outbox.participant.id();

    let limiter =
        context
            .limiters
            .acquire(&id, context.config.rate_refill, context.config.rate_burst);
    if !limiter.try_consume() {
        outbox.reply_error(&ChatError::RateLimited).await;
        outbox.reply(context.renderer.form(true)).await;

        if limiter.wait_until_available(cancel).await.is_err() {
            return Err(DrainReason::Cancelled);
        }
        outbox.reset_form().await;
    }

    let message = match Message::new(outbox.participant.clone(), &content) {
        Ok(message) => Arc::new(message),
        Err(error) => {
            outbox.reply_error(&error).await;
            return Ok(());
        }
    };

    tracing::debug!(participant.id = %id, content = %message.content(), "Message committed");
    context.room.add_message(message.clone()).await;
    outbox.broadcast_message(message).await;
    outbox.reset_form().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{sync::mpsc, task::JoinHandle};

    use super::*;
    use crate::{
        config::ChatConfig,
        domain::{ParticipantId, TransportError},
        infrastructure::{
            ChannelConnection, ChannelFrameSource, JsonRenderer,
            dto::websocket::{MessageDto, ServerEvent},
        },
    };

    /// Test peer: feeds frames into a session and reads what it is sent.
    struct TestClient {
        frames: mpsc::Sender<Result<Inbound, TransportError>>,
        events: mpsc::Receiver<String>,
        cancel: CancellationToken,
        session: JoinHandle<DrainReason>,
    }

    impl TestClient {
        fn connect(context: &Arc<ChatContext>, participant: Participant) -> Self {
            let (frames, frame_rx) = mpsc::channel(16);
            let (event_tx, events) = mpsc::channel(64);
            let cancel = CancellationToken::new();
            let session = ChatSession::new(
                context.clone(),
                participant,
                Arc::new(ChannelConnection::new(event_tx)),
                ChannelFrameSource::new(frame_rx),
                cancel.clone(),
            );

            Self {
                frames,
                events,
                cancel,
                session: tokio::spawn(session.run()),
            }
        }

        async fn send(&self, inbound: Inbound) {
            self.frames.send(Ok(inbound)).await.unwrap();
        }

        async fn chat(&self, text: &str) {
            self.send(Inbound::Chat(text.to_string())).await;
        }

        async fn next_event(&mut self) -> ServerEvent {
            let raw = tokio::time::timeout(Duration::from_secs(60), self.events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("session closed its outbound channel");
            serde_json::from_str(&raw).unwrap()
        }

        /// Skip the history snapshot and participant count sent on connect.
        async fn joined(mut self) -> Self {
            assert!(matches!(self.next_event().await, ServerEvent::History { .. }));
            assert!(matches!(
                self.next_event().await,
                ServerEvent::Participants { .. }
            ));
            self
        }

        async fn next_message(&mut self) -> MessageDto {
            match self.next_event().await {
                ServerEvent::Message(dto) => dto,
                other => panic!("expected message event, got {other:?}"),
            }
        }

        async fn expect_form_reset(&mut self) {
            assert_eq!(
                self.next_event().await,
                ServerEvent::Form { disabled: false }
            );
            assert!(matches!(
                self.next_event().await,
                ServerEvent::Error { message: None, .. }
            ));
        }

        async fn disconnect(self) -> DrainReason {
            let TestClient {
                frames, session, ..
            } = self;
            drop(frames);
            session.await.unwrap()
        }
    }

    fn context_with(config: ChatConfig) -> Arc<ChatContext> {
        Arc::new(ChatContext::new(config, Arc::new(JsonRenderer)))
    }

    fn context() -> Arc<ChatContext> {
        context_with(ChatConfig::default())
    }

    fn participant(name: &str) -> Participant {
        Participant::new(ParticipantId::generate(), name)
    }

    fn error_message(error: ChatError) -> ServerEvent {
        ServerEvent::Error {
            message: Some(error.to_string()),
            severity: Some(error.severity()),
            scope: Some(error.scope()),
        }
    }

    #[tokio::test]
    async fn test_connect_sends_history_and_participant_count() {
        // テスト項目: 接続すると履歴と参加者数が送られる
        // given (前提条件):
        let context = context();
        let author = participant("alice");
        context
            .room
            .add_message(Arc::new(Message::new(author, "earlier").unwrap()))
            .await;

        // when (操作):
        let mut bob = TestClient::connect(&context, participant("bob"));

        // then (期待する結果):
        match bob.next_event().await {
            ServerEvent::History { messages } => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].content, "earlier");
            }
            other => panic!("expected history, got {other:?}"),
        }
        assert_eq!(
            bob.next_event().await,
            ServerEvent::Participants { count: 1 }
        );
    }

    #[tokio::test]
    async fn test_message_is_broadcast_and_sender_acknowledged() {
        // テスト項目: 送信したメッセージが全員に届き、送信者のフォームがリセットされる
        // given (前提条件):
        let context = context();
        let mut alice = TestClient::connect(&context, participant("alice"))
            .joined()
            .await;
        let mut bob = TestClient::connect(&context, participant("bob"))
            .joined()
            .await;
        // alice is told that bob joined
        assert_eq!(
            alice.next_event().await,
            ServerEvent::Participants { count: 2 }
        );

        // when (操作):
        alice.chat("  hello :smile:  ").await;

        // then (期待する結果):
        let own = alice.next_message().await;
        assert_eq!(own.content, "hello 😄");
        assert!(own.own);
        alice.expect_form_reset().await;

        let seen_by_bob = bob.next_message().await;
        assert_eq!(seen_by_bob.content, "hello 😄");
        assert!(!seen_by_bob.own);

        let history = context.room.history().await;
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_session_active() {
        // テスト項目: 不正なフレームでは Unknown エラーを返し、接続は維持される
        // given (前提条件):
        let context = context();
        let mut alice = TestClient::connect(&context, participant("alice"))
            .joined()
            .await;

        // when (操作):
        alice
            .send(Inbound::Malformed("expected value".to_string()))
            .await;
        alice.chat("still here").await;

        // then (期待する結果):
        assert_eq!(alice.next_event().await, error_message(ChatError::Unknown));
        assert_eq!(alice.next_message().await.content, "still here");
        alice.expect_form_reset().await;
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected_locally() {
        // テスト項目: 空メッセージは MessageEmpty を返し、履歴には追加されない
        // given (前提条件):
        let context = context();
        let mut alice = TestClient::connect(&context, participant("alice"))
            .joined()
            .await;

        // when (操作):
        alice.chat("   ").await;

        // then (期待する結果):
        assert_eq!(
            alice.next_event().await,
            error_message(ChatError::MessageEmpty)
        );
        assert!(context.room.history().await.is_empty());
        assert_eq!(alice.disconnect().await, DrainReason::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_message_waits_and_is_reprocessed() {
        // テスト項目: レート制限中は待機し、解除後に同じ内容が再送なしで処理される
        // given (前提条件):
        let context = context_with(ChatConfig {
            rate_burst: 1,
            ..ChatConfig::default()
        });
        let mut alice = TestClient::connect(&context, participant("alice"))
            .joined()
            .await;
        alice.chat("one").await;
        assert_eq!(alice.next_message().await.content, "one");
        alice.expect_form_reset().await;

        // when (操作):
        alice.chat("two").await;

        // then (期待する結果):
        assert_eq!(
            alice.next_event().await,
            error_message(ChatError::RateLimited)
        );
        assert_eq!(alice.next_event().await, ServerEvent::Form { disabled: true });
        alice.expect_form_reset().await;
        assert_eq!(alice.next_message().await.content, "two");
        alice.expect_form_reset().await;

        let contents: Vec<String> = context
            .room
            .history()
            .await
            .iter()
            .map(|m| m.content().to_string())
            .collect();
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_rate_limit_wait_cleans_up() {
        // テスト項目: レート制限の待機中に切断されると待機を中断し、後始末が行われる
        // given (前提条件):
        let context = context_with(ChatConfig {
            rate_burst: 1,
            ..ChatConfig::default()
        });
        let mut alice = TestClient::connect(&context, participant("alice"))
            .joined()
            .await;
        alice.chat("one").await;
        alice.chat("two").await;
        assert_eq!(alice.next_message().await.content, "one");
        alice.expect_form_reset().await;
        assert_eq!(
            alice.next_event().await,
            error_message(ChatError::RateLimited)
        );
        assert_eq!(alice.next_event().await, ServerEvent::Form { disabled: true });

        // when (操作):
        alice.cancel.cancel();
        let reason = alice.session.await.unwrap();

        // then (期待する結果):
        assert_eq!(reason, DrainReason::Cancelled);
        assert_eq!(context.room.num_participants().await, 0);
        assert!(context.limiters.is_empty());
        assert_eq!(context.room.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_existing_session_is_rejected_without_touching_first() {
        // テスト項目: 同じ参加者の 2 つ目の接続は拒否され、1 つ目の登録は残る
        // given (前提条件):
        let context = context();
        let alice = participant("alice");
        let _first = TestClient::connect(&context, alice.clone()).joined().await;

        // when (操作):
        let mut second = TestClient::connect(&context, alice);

        // then (期待する結果):
        assert_eq!(
            second.next_event().await,
            error_message(ChatError::ExistingSession)
        );
        assert_eq!(
            second.session.await.unwrap(),
            DrainReason::Rejected(ChatError::ExistingSession)
        );
        assert_eq!(context.room.num_participants().await, 1);
    }

    #[tokio::test]
    async fn test_room_full_is_rejected() {
        // テスト項目: 満員の Room への接続は RoomFull で拒否される
        // given (前提条件):
        let context = context_with(ChatConfig {
            max_participants: 1,
            ..ChatConfig::default()
        });
        let _alice = TestClient::connect(&context, participant("alice"))
            .joined()
            .await;

        // when (操作):
        let mut bob = TestClient::connect(&context, participant("bob"));

        // then (期待する結果):
        assert_eq!(bob.next_event().await, error_message(ChatError::RoomFull));
        assert_eq!(
            bob.session.await.unwrap(),
            DrainReason::Rejected(ChatError::RoomFull)
        );
    }

    #[tokio::test]
    async fn test_disconnect_releases_limiter_and_updates_count() {
        // テスト項目: 切断すると登録解除・リミッター解放・参加者数の通知が行われる
        // given (前提条件):
        let context = context();
        let mut alice = TestClient::connect(&context, participant("alice"))
            .joined()
            .await;
        let mut bob = TestClient::connect(&context, participant("bob"))
            .joined()
            .await;
        assert_eq!(
            alice.next_event().await,
            ServerEvent::Participants { count: 2 }
        );
        bob.chat("bye").await;
        assert_eq!(bob.next_message().await.content, "bye");
        bob.expect_form_reset().await;
        assert_eq!(alice.next_message().await.content, "bye");
        assert_eq!(context.limiters.len(), 1);

        // when (操作):
        let reason = bob.disconnect().await;

        // then (期待する結果):
        assert_eq!(reason, DrainReason::Normal);
        assert_eq!(context.room.num_participants().await, 1);
        assert!(context.limiters.is_empty());
        assert_eq!(
            alice.next_event().await,
            ServerEvent::Participants { count: 1 }
        );
    }

    #[tokio::test]
    async fn test_transport_error_ends_session() {
        // テスト項目: 受信エラーでセッションが終了し、登録が解除される
        // given (前提条件):
        let context = context();
        let alice = TestClient::connect(&context, participant("alice"))
            .joined()
            .await;

        // when (操作):
        alice
            .frames
            .send(Err(TransportError("connection reset".to_string())))
            .await
            .unwrap();
        let reason = alice.session.await.unwrap();

        // then (期待する結果):
        assert!(matches!(reason, DrainReason::Transport(_)));
        assert_eq!(context.room.num_participants().await, 0);
    }

    #[tokio::test]
    async fn test_late_joiner_sees_history_in_order() {
        // テスト項目: A の "hello" と B の "world" が後から接続した C の履歴に順番通り現れる
        // given (前提条件):
        let context = context();
        let mut alice = TestClient::connect(&context, participant("alice"))
            .joined()
            .await;
        let mut bob = TestClient::connect(&context, participant("bob"))
            .joined()
            .await;

        // when (操作):
        alice.chat("hello").await;
        assert_eq!(
            alice.next_event().await,
            ServerEvent::Participants { count: 2 }
        );
        assert_eq!(alice.next_message().await.content, "hello");
        assert_eq!(bob.next_message().await.content, "hello");
        bob.chat("world").await;
        assert_eq!(bob.next_message().await.content, "world");
        let mut carol = TestClient::connect(&context, participant("carol"));

        // then (期待する結果):
        match carol.next_event().await {
            ServerEvent::History { messages } => {
                let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
                assert_eq!(contents, vec!["hello", "world"]);
            }
            other => panic!("expected history, got {other:?}"),
        }
    }

    fn idle_session(
        context: &Arc<ChatContext>,
        participant: Participant,
    ) -> (ChatSession<ChannelFrameSource>, mpsc::Receiver<String>) {
        let (_frames, frame_rx) = mpsc::channel(1);
        let (event_tx, events) = mpsc::channel(16);
        let session = ChatSession::new(
            context.clone(),
            participant,
            Arc::new(ChannelConnection::new(event_tx)),
            ChannelFrameSource::new(frame_rx),
            CancellationToken::new(),
        );
        (session, events)
    }

    #[tokio::test]
    async fn test_state_moves_forward_through_connect_and_close() {
        // テスト項目: Connecting → Active を経て、後始末の後は登録が解除される
        // given (前提条件):
        let context = context();
        let (mut session, _events) = idle_session(&context, participant("alice"));
        assert_eq!(session.state, SessionState::Connecting);

        // when (操作):
        session.connect().await.unwrap();
        let after_connect = session.state.clone();
        session.transition(SessionState::Draining(DrainReason::Normal));
        session.close().await;

        // then (期待する結果):
        assert_eq!(after_connect, SessionState::Active);
        assert!(!session.registered);
        assert_eq!(context.room.num_participants().await, 0);
    }

    #[tokio::test]
    async fn test_rejected_connect_stays_connecting() {
        // テスト項目: 登録に失敗したセッションは Active にならず、先の登録にも触れない
        // given (前提条件):
        let context = context();
        let alice = participant("alice");
        let (mut first, _first_events) = idle_session(&context, alice.clone());
        first.connect().await.unwrap();
        let (mut second, _second_events) = idle_session(&context, alice);

        // when (操作):
        let result = second.connect().await;
        second.close().await;

        // then (期待する結果):
        assert_eq!(result, Err(ChatError::ExistingSession));
        assert_eq!(second.state, SessionState::Connecting);
        assert_eq!(context.room.num_participants().await, 1);
    }
}

//! インメモリのチャットルーム
//!
//! Room は独立したロックを持つ 2 つの領域を持つ:
//!
//! - クライアント登録（参加者 ID → 接続ハンドル）
//! - 直近のメッセージを保持する固定長の履歴
//!
//! 2 つのロックを同時に取ることはない。登録のロックを保持したまま送信する
//! こともない（ブロードキャストはスナップショットに対して行う）。

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    sync::Arc,
    time::Duration,
};

use tokio::{
    sync::{RwLock, Semaphore},
    task::JoinSet,
};

use crate::{
    config::ChatConfig,
    domain::{ChatError, Connection, DeliveryError, Message, Participant, ParticipantId},
};

/// 登録済みの接続
struct Client {
    participant: Participant,
    connection: Arc<dyn Connection>,
}

/// [`Room::broadcast`] 1 回分の結果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// スナップショット内の接続数
    pub attempted: usize,
    pub delivered: usize,
    /// 失敗・タイムアウト・スキップした送信
    pub failed: usize,
}

/// 1 つのチャットルームの共有状態
pub struct Room {
    clients: RwLock<HashMap<ParticipantId, Client>>,
    messages: RwLock<VecDeque<Arc<Message>>>,
    history_capacity: usize,
    max_participants: usize,
    /// 全ブロードキャストを通した同時送信数の上限
    send_permits: Arc<Semaphore>,
}

impl Room {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            messages: RwLock::new(VecDeque::with_capacity(config.history_capacity)),
            history_capacity: config.history_capacity,
            max_participants: config.max_participants,
            send_permits: Arc::new(Semaphore::new(config.max_concurrent_sends.max(1))),
        }
    }

    /// 参加者の接続を登録
    ///
    /// 参加者ごとに接続は 1 つまで。参加者数の通知は呼び出し側で行う。
    ///
    /// # Arguments
    ///
    /// * `participant` - 参加者（Domain Model）
    /// * `connection` - この参加者への送信ハンドル
    ///
    /// # Returns
    ///
    /// * `Ok(())` - 登録成功
    /// * `Err(ChatError::ExistingSession)` - 同じ参加者が登録済み
    /// * `Err(ChatError::RoomFull)` - 定員に達している
    pub async fn add_client(
        &self,
        participant: Participant,
        connection: Arc<dyn Connection>,
    ) -> Result<(), ChatError> {
        let mut clients = self.clients.write().await;
        let id = participant.id();

        if clients.contains_key(&id) {
            return Err(ChatError::ExistingSession);
        }
        if clients.len() >= self.max_participants {
            return Err(ChatError::RoomFull);
        }

        clients.insert(
            id,
            Client {
                participant,
                connection,
            },
        );
        tracing::debug!(participant.id = %id, "Client registered");

        Ok(())
    }

    /// 参加者の接続を削除。登録されていなかった場合は `false`
    pub async fn remove_client(&self, id: &ParticipantId) -> bool {
        let removed = self.clients.write().await.remove(id).is_some();
        if removed {
            tracing::debug!(participant.id = %id, "Client unregistered");
        }
        removed
    }

    /// 現在の参加者数
    pub async fn num_participants(&self) -> usize {
        self.clients.read().await.len()
    }

    /// 履歴に追加（満杯なら最も古いメッセージを捨てる）
    pub async fn add_message(&self, message: Arc<Message>) {
        if self.history_capacity == 0 {
            return;
        }

        let mut messages = self.messages.write().await;
        if messages.len() >= self.history_capacity {
            messages.pop_front();
        }
        messages.push_back(message);
    }

    /// 最大 `history_capacity` 件の履歴（古い順）
    pub async fn history(&self) -> Vec<Arc<Message>> {
        self.messages.read().await.iter().cloned().collect()
    }

    /// 登録済みの接続ごとに `deliver` を 1 回ずつ並行に実行
    ///
    /// 同時送信数は Room の送信許可数で制限される。各送信は `send_timeout` で
    /// 打ち切られ、失敗はログに残すだけで他の送信には影響しない。
    ///
    /// # Arguments
    ///
    /// * `send_timeout` - 1 接続への送信の上限時間
    /// * `deliver` - 宛先ごとの描画と送信
    ///
    /// # Returns
    ///
    /// 全ての送信が完了・失敗・タイムアウトした後の `BroadcastReport`
    pub async fn broadcast<F, Fut>(&self, send_timeout: Duration, deliver: F) -> BroadcastReport
    where
        F: Fn(Participant, Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = Result<(), DeliveryError>> + Send + 'static,
    {
        let recipients: Vec<(Participant, Arc<dyn Connection>)> = {
            let clients = self.clients.read().await;
            clients
                .values()
                .map(|client| (client.participant.clone(), client.connection.clone()))
                .collect()
        };

        let mut report = BroadcastReport {
            attempted: recipients.len(),
            ..BroadcastReport::default()
        };
        let mut sends = JoinSet::new();

        for (participant, connection) in recipients {
            let id = participant.id();
            let permit = match self.send_permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::warn!(participant.id = %id, error = %e, "Failed to acquire send permit");
                    report.failed += 1;
                    continue;
                }
            };

            let send = deliver(participant, connection);
            sends.spawn(async move {
                let _permit = permit;
                let result = match tokio::time::timeout(send_timeout, send).await {
                    Ok(result) => result,
                    Err(_) => Err(DeliveryError::Timeout(send_timeout)),
                };
                (id, result)
            });
        }

        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.delivered += 1,
                Ok((id, Err(e))) => {
                    tracing::warn!(participant.id = %id, error = %e, "Failed to deliver broadcast");
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Broadcast send task aborted");
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast finished"
        );

        report
    }
}

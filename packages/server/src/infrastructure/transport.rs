//! チャネルを使った接続アダプタ
//!
//! WebSocket ハンドラがソケットを 2 本の有界チャネルにつなぎ、セッションと
//! Room はチャネルの端だけを扱う。

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{Connection, DeliveryError, FrameSource, Inbound, TransportError};

/// 描画済みペイロードを接続ごとのキューに積む送信ハンドル
///
/// キューが満杯なら待たされる（待ち時間は呼び出し側のタイムアウトで制限する）。
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    sender: mpsc::Sender<String>,
}

impl ChannelConnection {
    pub fn new(sender: mpsc::Sender<String>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    async fn send(&self, payload: String) -> Result<(), DeliveryError> {
        self.sender
            .send(payload)
            .await
            .map_err(|_| DeliveryError::Closed)
    }
}

/// 受信タスクから渡されるフレーム。チャネルが閉じたらストリーム終端として扱う
#[derive(Debug)]
pub struct ChannelFrameSource {
    receiver: mpsc::Receiver<Result<Inbound, TransportError>>,
}

impl ChannelFrameSource {
    pub fn new(receiver: mpsc::Receiver<Result<Inbound, TransportError>>) -> Self {
        Self { receiver }
    }
}

#[async_trait]
impl FrameSource for ChannelFrameSource {
    async fn receive(&mut self) -> Result<Inbound, TransportError> {
        self.receiver.recv().await.unwrap_or(Ok(Inbound::EndOfStream))
    }
}

//! 参加者ごとのトークンバケットによるレート制限
//!
//! リミッターは参加者が最初にメッセージを送ろうとしたときに作られ、
//! Room から抜けたときに解放される。

use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::ParticipantId;

/// 待機がキャンセルトークンによって中断された
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limiter wait cancelled")]
pub struct Cancelled;

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

/// `refill` ごとに 1 トークン補充され、最大 `burst` 個まで貯まるトークンバケット
///
/// `refill` が 0 なら制限なし、`burst` が 0 なら 1 として扱う。
#[derive(Debug)]
pub struct TokenBucket {
    refill: Duration,
    burst: u32,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// 満タンのバケットを作成
    pub fn new(refill: Duration, burst: u32) -> Self {
        let burst = burst.max(1);
        Self {
            refill,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// トークンがあれば 1 つ消費する
    pub fn try_consume(&self) -> bool {
        self.try_consume_at(Instant::now()).is_ok()
    }

    /// トークンが補充されるまで待機し、1 つ消費する
    ///
    /// # Arguments
    ///
    /// * `cancel` - 待機を中断するトークン
    ///
    /// # Returns
    ///
    /// * `Ok(())` - ちょうど 1 トークンを消費した
    /// * `Err(Cancelled)` - キャンセルされた（トークンは消費しない）
    pub async fn wait_until_available(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        loop {
            let wait = match self.try_consume_at(Instant::now()) {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// 現在のトークン数
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock();
        self.refill_at(&mut state, Instant::now());
        state.tokens
    }

    /// 失敗時は次のトークンまでの待ち時間を返す
    fn try_consume_at(&self, now: Instant) -> Result<(), Duration> {
        if self.refill.is_zero() {
            return Ok(());
        }

        let mut state = self.state.lock();
        self.refill_at(&mut state, now);

        if state.tokens > 0 {
            state.tokens -= 1;
            return Ok(());
        }

        let elapsed = now.saturating_duration_since(state.last_refill);
        Err(self.refill.saturating_sub(elapsed).max(Duration::from_millis(1)))
    }

    fn refill_at(&self, state: &mut BucketState, now: Instant) {
        if state.tokens >= self.burst {
            // a full bucket does not bank progress toward the next token
            state.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(state.last_refill);
        let gained = elapsed.as_nanos() / self.refill.as_nanos().max(1);
        if gained == 0 {
            return;
        }

        let gained = u32::try_from(gained).unwrap_or(u32::MAX);
        state.tokens = state.tokens.saturating_add(gained).min(self.burst);
        if state.tokens >= self.burst {
            state.last_refill = now;
        } else {
            state.last_refill += self.refill * gained;
        }
    }
}

/// 参加者 ID からトークンバケットへの対応表
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    limiters: Mutex<HashMap<ParticipantId, Arc<TokenBucket>>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 参加者のリミッターを取得（無ければ作成）
    ///
    /// # Arguments
    ///
    /// * `id` - 参加者 ID（Domain Model）
    /// * `refill` - 補充間隔（作成時のみ使われる）
    /// * `burst` - バケットの容量（作成時のみ使われる）
    ///
    /// # Returns
    ///
    /// 同じ参加者には常に同じ `TokenBucket`
    pub fn acquire(&self, id: &ParticipantId, refill: Duration, burst: u32) -> Arc<TokenBucket> {
        let mut limiters = self.limiters.lock();
        limiters
            .entry(*id)
            .or_insert_with(|| {
                tracing::debug!(participant.id = %id, "Rate limiter created");
                Arc::new(TokenBucket::new(refill, burst))
            })
            .clone()
    }

    /// 参加者のリミッターを解放。存在した場合は true
    pub fn release(&self, id: &ParticipantId) -> bool {
        let released = self.limiters.lock().remove(id).is_some();
        if released {
            tracing::debug!(participant.id = %id, "Rate limiter released");
        }
        released
    }

    pub fn len(&self) -> usize {
        self.limiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.lock().is_empty()
    }
}

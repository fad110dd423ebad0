//! UseCase 層
//!
//! 接続ごとのチャットプロトコルと、その共有状態。

pub mod chat_session;
pub mod context;

pub use chat_session::{ChatSession, DrainReason};
pub use context::ChatContext;

//! Infrastructure 層
//!
//! インメモリの Room、レート制限、JSON Renderer、チャネルを使った
//! 送受信アダプタ。

pub mod dto;
pub mod rate_limiter;
pub mod render;
pub mod room;
pub mod transport;

pub use rate_limiter::{Cancelled, RateLimiterRegistry, TokenBucket};
pub use render::JsonRenderer;
pub use room::{BroadcastReport, Room};
pub use transport::{ChannelConnection, ChannelFrameSource};

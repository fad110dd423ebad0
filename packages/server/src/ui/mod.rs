//! UI 層
//!
//! HTTP / WebSocket adapters around the chat core.

pub mod handler;
pub mod server;
pub mod signal;
pub mod state;

pub use server::{Server, router};
pub use state::AppState;

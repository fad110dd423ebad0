//! Hiroba chat room server library.
//!
//! A single shared room: participants connect over WebSocket, exchange short
//! text messages, see a bounded history and are rate limited per participant.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;

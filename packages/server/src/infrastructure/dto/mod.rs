//! Data Transfer Objects (DTOs) for the bundled wire format.
//!
//! DTOs are organized by protocol:
//! - `websocket`: inbound frames and outbound events
//! - `http`: HTTP API response DTOs

pub mod conversion;
pub mod http;
pub mod websocket;

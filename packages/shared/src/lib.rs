//! Utilities shared by the Hiroba binaries: logging setup and clocks.

pub mod logger;
pub mod time;

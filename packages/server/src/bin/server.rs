//! Hiroba chat server.
//!
//! One room, bounded history, per-participant rate limiting.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroba-server
//! cargo run --bin hiroba-server -- --host 0.0.0.0 --port 3000 --rate-burst 5
//! ```

use std::time::Duration;

use clap::Parser;
use hiroba_server::{config, config::ChatConfig, ui::Server};
use hiroba_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "hiroba-server")]
#[command(about = "Live chat room server over WebSocket", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Number of recent messages kept in memory
    #[arg(long, default_value_t = config::DEFAULT_HISTORY_CAPACITY)]
    history_capacity: usize,

    /// Maximum number of participants in the room
    #[arg(long, default_value_t = config::DEFAULT_MAX_PARTICIPANTS)]
    max_participants: usize,

    /// Maximum number of in-flight broadcast sends
    #[arg(long, default_value_t = config::DEFAULT_MAX_CONCURRENT_SENDS)]
    max_concurrent_sends: usize,

    /// Milliseconds between rate-limit token refills (0 disables limiting)
    #[arg(long, default_value_t = config::DEFAULT_RATE_REFILL.as_millis() as u64)]
    rate_refill_ms: u64,

    /// Rate-limit bucket capacity
    #[arg(long, default_value_t = config::DEFAULT_RATE_BURST)]
    rate_burst: u32,

    /// Upper bound in milliseconds for a single send to one connection
    #[arg(long, default_value_t = config::DEFAULT_SEND_TIMEOUT.as_millis() as u64)]
    send_timeout_ms: u64,

    /// Outbound queue length per connection
    #[arg(long, default_value_t = config::DEFAULT_OUTBOUND_BUFFER)]
    outbound_buffer: usize,
}

impl Args {
    fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            history_capacity: self.history_capacity,
            max_participants: self.max_participants,
            max_concurrent_sends: self.max_concurrent_sends,
            rate_refill: Duration::from_millis(self.rate_refill_ms),
            rate_burst: self.rate_burst,
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            outbound_buffer: self.outbound_buffer,
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();
    let server = Server::new(args.chat_config());

    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

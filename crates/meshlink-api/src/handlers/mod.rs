//! API handlers organized by domain.

pub mod basic;
pub mod commands;
pub mod common;

// Re-export ServerState so handlers can use it
pub use crate::server::ServerState;

pub use basic::{health_handler, queue_stats_handler};
pub use commands::{
    ping_handler, send_advert_handler, send_channel_message_handler, send_message_handler,
    send_telemetry_request_handler, send_trace_path_handler,
};

//! HTTP API for the MeshLink command dispatcher.
//!
//! Exposes one submission endpoint per command kind plus health and
//! queue statistics.

pub mod handlers;
pub mod models;
pub mod server;
pub mod shutdown;

pub use server::{create_router_with_state, run, serve, ServerState};

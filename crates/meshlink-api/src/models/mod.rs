//! Request and response models for the web API.

pub mod commands;
pub mod error;

pub use commands::{
    CommandResponse, DestinationRequest, QueueInfoDto, QueueStatsDto, SendAdvertRequest,
    SendChannelMessageRequest, SendMessageRequest,
};
pub use error::{ApiResult, ErrorResponse, QUEUE_FULL_MESSAGE};

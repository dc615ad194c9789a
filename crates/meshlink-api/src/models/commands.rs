//! Command request and response models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meshlink_commands::{CommandKind, CommandParams, QueueInfo, QueueStats, Submission};

use super::error::{ApiResult, ErrorResponse};

/// Send a direct message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    /// Destination public key (64 hex characters)
    pub destination: String,
    /// Message body
    pub text: String,
    /// `plain`, `cli_data` or `signed_plain`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_type: Option<String>,
}

/// Send a channel message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendChannelMessageRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flood: Option<bool>,
}

/// Send an advertisement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendAdvertRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flood: Option<bool>,
}

/// Trace path, ping and telemetry requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationRequest {
    pub destination: String,
}

/// Convert a request body into command parameters.
pub fn to_params<T: Serialize>(request: &T) -> ApiResult<CommandParams> {
    match serde_json::to_value(request)? {
        serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(ErrorResponse::bad_request("request body must be a JSON object")),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Queue placement as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueInfoDto {
    pub position: usize,
    pub estimated_wait_seconds: f64,
    pub queue_size: usize,
    pub debounced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_submission_time: Option<DateTime<Utc>>,
}

impl From<&QueueInfo> for QueueInfoDto {
    fn from(info: &QueueInfo) -> Self {
        Self {
            position: info.position,
            estimated_wait_seconds: round2(info.estimated_wait_seconds),
            queue_size: info.queue_size,
            debounced: info.debounced,
            original_submission_time: info.original_submission_time,
        }
    }
}

/// Response to a command submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
    pub request_id: String,
    pub queue_info: QueueInfoDto,
    /// Delivery estimate reported by the device (direct messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_delivery_ms: Option<u64>,
    /// Trace correlation tag (trace path)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator_tag: Option<u64>,
}

impl CommandResponse {
    pub fn from_submission(kind: CommandKind, submission: &Submission) -> Self {
        let field = |name: &str| {
            submission
                .outcome
                .as_ref()
                .and_then(|o| o.payload_field(name))
                .and_then(|v| v.as_u64())
        };

        Self {
            success: submission.success,
            message: submission.message.clone(),
            request_id: submission.request_id.clone(),
            queue_info: QueueInfoDto::from(&submission.queue_info),
            estimated_delivery_ms: match kind {
                CommandKind::SendMessage => field("estimated_delivery_ms"),
                _ => None,
            },
            initiator_tag: match kind {
                CommandKind::SendTracePath => field("initiator_tag"),
                _ => None,
            },
        }
    }
}

/// Queue statistics as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatsDto {
    pub queue_size: usize,
    pub max_queue_size: usize,
    pub rate_limit_tokens_available: f64,
    pub debounce_cache_size: usize,
    pub commands_processed_total: u64,
    pub commands_dropped_total: u64,
    pub commands_debounced_total: u64,
}

impl From<QueueStats> for QueueStatsDto {
    fn from(stats: QueueStats) -> Self {
        Self {
            queue_size: stats.queue_size,
            max_queue_size: stats.max_queue_size,
            rate_limit_tokens_available: round2(stats.rate_limit_tokens_available),
            debounce_cache_size: stats.debounce_cache_size,
            commands_processed_total: stats.commands_processed_total,
            commands_dropped_total: stats.commands_dropped_total,
            commands_debounced_total: stats.commands_debounced_total,
        }
    }
}

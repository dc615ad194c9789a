//! Command submission handlers.
//!
//! Every handler validates through the dispatcher and returns as soon as the
//! command is queued (or merged into an identical pending one). Execution
//! happens later on the worker.

use axum::{extract::State, Json};
use serde::Serialize;

use meshlink_commands::CommandKind;

use super::{
    common::{ok, HandlerResult},
    ServerState,
};
use crate::models::{
    commands::to_params, CommandResponse, DestinationRequest, ErrorResponse, SendAdvertRequest,
    SendChannelMessageRequest, SendMessageRequest,
};

fn submit<T: Serialize>(
    state: &ServerState,
    kind: CommandKind,
    request: &T,
) -> HandlerResult<CommandResponse> {
    if !state.write_enabled {
        return Err(ErrorResponse::forbidden(
            "Write operations are disabled on this server",
        ));
    }

    let params = to_params(request)?;
    let submission = state.dispatcher().enqueue(kind, params).map_err(|e| {
        tracing::debug!(kind = %kind, error = %e, "Command submission refused");
        ErrorResponse::from(e)
    })?;

    ok(CommandResponse::from_submission(kind, &submission))
}

/// Send a direct message.
///
/// POST /api/commands/send_message
pub async fn send_message_handler(
    State(state): State<ServerState>,
    Json(req): Json<SendMessageRequest>,
) -> HandlerResult<CommandResponse> {
    submit(&state, CommandKind::SendMessage, &req)
}

/// Send a channel message.
///
/// POST /api/commands/send_channel_message
pub async fn send_channel_message_handler(
    State(state): State<ServerState>,
    Json(req): Json<SendChannelMessageRequest>,
) -> HandlerResult<CommandResponse> {
    submit(&state, CommandKind::SendChannelMessage, &req)
}

/// Send an advertisement.
///
/// POST /api/commands/send_advert
pub async fn send_advert_handler(
    State(state): State<ServerState>,
    Json(req): Json<SendAdvertRequest>,
) -> HandlerResult<CommandResponse> {
    submit(&state, CommandKind::SendAdvert, &req)
}

/// Start route discovery.
///
/// POST /api/commands/send_trace_path
pub async fn send_trace_path_handler(
    State(state): State<ServerState>,
    Json(req): Json<DestinationRequest>,
) -> HandlerResult<CommandResponse> {
    submit(&state, CommandKind::SendTracePath, &req)
}

/// POST /api/commands/ping
pub async fn ping_handler(
    State(state): State<ServerState>,
    Json(req): Json<DestinationRequest>,
) -> HandlerResult<CommandResponse> {
    submit(&state, CommandKind::Ping, &req)
}

/// POST /api/commands/send_telemetry_request
pub async fn send_telemetry_request_handler(
    State(state): State<ServerState>,
    Json(req): Json<DestinationRequest>,
) -> HandlerResult<CommandResponse> {
    submit(&state, CommandKind::SendTelemetryRequest, &req)
}

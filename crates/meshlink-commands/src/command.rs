//! Command data structures.
//!
//! Defines the commands accepted by the dispatch pipeline, their
//! fingerprints and the outcomes published once the worker resolves them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::transport::ExecutionError;

/// Unique request identifier.
pub type RequestId = String;

/// Named command arguments, kept sorted so serialization is canonical.
pub type CommandParams = BTreeMap<String, serde_json::Value>;

/// Length of a full node public key in hex characters.
pub const PUBLIC_KEY_HEX_LEN: usize = 64;

/// Maximum length of a message body.
pub const MAX_TEXT_LEN: usize = 1000;

/// Accepted values for the `text_type` parameter.
pub const TEXT_TYPES: [&str; 3] = ["plain", "cli_data", "signed_plain"];

/// Machine-readable error codes carried by failed outcomes.
pub mod error_codes {
    pub const DROPPED: &str = "dropped";
    pub const EXECUTION_FAILED: &str = "execution_failed";
    pub const ABANDONED: &str = "abandoned";
}

/// Kinds of commands the radio link accepts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Direct message to one node
    SendMessage,
    /// Broadcast on the channel
    SendChannelMessage,
    /// Self-advertisement
    SendAdvert,
    /// Route discovery towards a node
    SendTracePath,
    /// Connectivity check
    Ping,
    /// Telemetry request to a node
    SendTelemetryRequest,
}

impl CommandKind {
    /// Every kind, in declaration order.
    pub const ALL: [CommandKind; 6] = [
        CommandKind::SendMessage,
        CommandKind::SendChannelMessage,
        CommandKind::SendAdvert,
        CommandKind::SendTracePath,
        CommandKind::Ping,
        CommandKind::SendTelemetryRequest,
    ];

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::SendMessage => "send_message",
            CommandKind::SendChannelMessage => "send_channel_message",
            CommandKind::SendAdvert => "send_advert",
            CommandKind::SendTracePath => "send_trace_path",
            CommandKind::Ping => "ping",
            CommandKind::SendTelemetryRequest => "send_telemetry_request",
        }
    }

    /// Kinds whose effect depends on when they run. Merging two of these
    /// would hide a fresh measurement behind a stale one.
    pub fn is_time_varying(&self) -> bool {
        matches!(
            self,
            CommandKind::SendTracePath | CommandKind::Ping | CommandKind::SendTelemetryRequest
        )
    }

    /// Kinds debounced when no explicit set is configured.
    pub fn default_debounce_kinds() -> BTreeSet<CommandKind> {
        Self::ALL
            .into_iter()
            .filter(|kind| !kind.is_time_varying())
            .collect()
    }

    fn requires_destination(&self) -> bool {
        matches!(
            self,
            CommandKind::SendMessage
                | CommandKind::SendTracePath
                | CommandKind::Ping
                | CommandKind::SendTelemetryRequest
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| DispatchError::invalid(format!("unknown command kind '{}'", wanted)))
    }
}

/// Deterministic digest of a command's kind and parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of `(kind, parameters)`.
    pub fn compute(kind: CommandKind, parameters: &CommandParams) -> Self {
        #[derive(Serialize)]
        struct Canonical<'a> {
            params: &'a CommandParams,
            #[serde(rename = "type")]
            kind: &'a str,
        }

        let canonical = Canonical {
            params: parameters,
            kind: kind.as_str(),
        };
        // Serializing a BTreeMap of JSON values cannot fail.
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        Fingerprint(hex::encode(Sha256::digest(&bytes)))
    }

    /// Hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable request to act on the transport.
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    /// Unique request ID
    pub request_id: RequestId,
    /// Command kind
    pub kind: CommandKind,
    /// Validated, defaulted parameters
    pub parameters: CommandParams,
    /// Submission timestamp
    pub submitted_at: DateTime<Utc>,
    #[serde(skip)]
    fingerprint: Fingerprint,
}

impl Command {
    /// Validate `parameters` for `kind` and build a command.
    ///
    /// Optional parameters are filled with their defaults before the
    /// fingerprint is computed, so `{}` and `{"flood": false}` are the same
    /// advert.
    pub fn new(kind: CommandKind, parameters: CommandParams) -> Result<Self, DispatchError> {
        let parameters = normalize_parameters(kind, parameters)?;
        let fingerprint = Fingerprint::compute(kind, &parameters);
        Ok(Self {
            request_id: Uuid::new_v4().to_string(),
            kind,
            parameters,
            submitted_at: Utc::now(),
            fingerprint,
        })
    }

    /// Fingerprint used for duplicate detection.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// String parameter accessor.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(|v| v.as_str())
    }

    /// Boolean parameter accessor.
    pub fn param_bool(&self, name: &str) -> Option<bool> {
        self.parameters.get(name).and_then(|v| v.as_bool())
    }
}

fn normalize_parameters(
    kind: CommandKind,
    mut parameters: CommandParams,
) -> Result<CommandParams, DispatchError> {
    let allowed: &[&str] = match kind {
        CommandKind::SendMessage => &["destination", "text", "text_type"],
        CommandKind::SendChannelMessage => &["text", "flood"],
        CommandKind::SendAdvert => &["flood"],
        CommandKind::SendTracePath | CommandKind::Ping | CommandKind::SendTelemetryRequest => {
            &["destination"]
        }
    };

    if let Some(unknown) = parameters.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(DispatchError::invalid(format!(
            "unexpected parameter '{}' for {}",
            unknown, kind
        )));
    }

    if kind.requires_destination() {
        let destination = parameters
            .get("destination")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DispatchError::invalid("destination is required"))?;
        validate_public_key(destination)?;
    }

    match kind {
        CommandKind::SendMessage => {
            validate_text(parameters.get("text"))?;
            let text_type = match parameters.get("text_type") {
                None => "plain".to_string(),
                Some(v) => v
                    .as_str()
                    .filter(|t| TEXT_TYPES.contains(t))
                    .map(str::to_string)
                    .ok_or_else(|| {
                        DispatchError::invalid(format!(
                            "text_type must be one of {}",
                            TEXT_TYPES.join("/")
                        ))
                    })?,
            };
            parameters.insert("text_type".into(), serde_json::Value::String(text_type));
        }
        CommandKind::SendChannelMessage => {
            validate_text(parameters.get("text"))?;
            default_flood(&mut parameters)?;
        }
        CommandKind::SendAdvert => default_flood(&mut parameters)?,
        _ => {}
    }

    Ok(parameters)
}

fn validate_public_key(destination: &str) -> Result<(), DispatchError> {
    if destination.len() != PUBLIC_KEY_HEX_LEN {
        return Err(DispatchError::invalid(format!(
            "destination must be a {}-character public key",
            PUBLIC_KEY_HEX_LEN
        )));
    }
    if !destination.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DispatchError::invalid(
            "destination must be a valid hexadecimal string",
        ));
    }
    Ok(())
}

fn validate_text(text: Option<&serde_json::Value>) -> Result<(), DispatchError> {
    let text = text
        .and_then(|v| v.as_str())
        .ok_or_else(|| DispatchError::invalid("text is required"))?;
    let len = text.chars().count();
    if len == 0 || len > MAX_TEXT_LEN {
        return Err(DispatchError::invalid(format!(
            "text must be between 1 and {} characters",
            MAX_TEXT_LEN
        )));
    }
    Ok(())
}

fn default_flood(parameters: &mut CommandParams) -> Result<(), DispatchError> {
    match parameters.get("flood") {
        None => {
            parameters.insert("flood".into(), serde_json::Value::Bool(false));
            Ok(())
        }
        Some(serde_json::Value::Bool(_)) => Ok(()),
        Some(_) => Err(DispatchError::invalid("flood must be a boolean")),
    }
}

/// Lifecycle of a queued command.
///
/// `Admitted -> Dequeued -> Executing -> Resolved`, with `DroppedByOverflow`
/// reachable only from `Admitted`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Admitted,
    Dequeued,
    Executing,
    Resolved,
    DroppedByOverflow,
}

impl EntryState {
    /// Check if the entry has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryState::Resolved | EntryState::DroppedByOverflow)
    }
}

/// Final result of a command, shared by every waiter on its fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandOutcome {
    /// Whether the transport accepted the command
    pub success: bool,
    /// Result message
    pub message: String,
    /// Request that was actually executed
    pub request_id: RequestId,
    /// Error code for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Transport response data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Timestamp of resolution
    pub completed_at: DateTime<Utc>,
}

impl CommandOutcome {
    /// Successful execution.
    pub fn executed(command: &Command, payload: serde_json::Value) -> Self {
        Self {
            success: true,
            message: format!("Command {} executed successfully", command.kind),
            request_id: command.request_id.clone(),
            error: None,
            payload: Some(payload),
            completed_at: Utc::now(),
        }
    }

    /// Transport reported a failure.
    pub fn failed(command: &Command, error: &ExecutionError) -> Self {
        Self::failure(
            &command.request_id,
            format!("Command execution failed: {}", error),
            error_codes::EXECUTION_FAILED,
        )
    }

    /// Evicted by drop_oldest before reaching the transport.
    pub fn dropped(request_id: &str) -> Self {
        Self::failure(
            request_id,
            "Command dropped from queue (queue full)",
            error_codes::DROPPED,
        )
    }

    /// Pipeline stopped before the command was resolved.
    pub fn abandoned(request_id: &str) -> Self {
        Self::failure(
            request_id,
            "Command abandoned (dispatcher shut down)",
            error_codes::ABANDONED,
        )
    }

    fn failure(request_id: &str, message: impl Into<String>, code: &str) -> Self {
        Self {
            success: false,
            message: message.into(),
            request_id: request_id.to_string(),
            error: Some(code.to_string()),
            payload: None,
            completed_at: Utc::now(),
        }
    }

    /// Look up a field of the transport payload.
    pub fn payload_field(&self, name: &str) -> Option<&serde_json::Value> {
        self.payload.as_ref().and_then(|p| p.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(c: char) -> String {
        std::iter::repeat(c).take(PUBLIC_KEY_HEX_LEN).collect()
    }

    fn params(value: serde_json::Value) -> CommandParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in CommandKind::ALL {
            assert_eq!(kind.as_str().parse::<CommandKind>().unwrap(), kind);
        }
        assert!("reboot".parse::<CommandKind>().is_err());
    }

    #[test]
    fn test_default_debounce_kinds_exclude_time_varying() {
        let kinds = CommandKind::default_debounce_kinds();
        assert!(kinds.contains(&CommandKind::SendMessage));
        assert!(kinds.contains(&CommandKind::SendChannelMessage));
        assert!(kinds.contains(&CommandKind::SendAdvert));
        assert!(!kinds.contains(&CommandKind::Ping));
        assert!(!kinds.contains(&CommandKind::SendTelemetryRequest));
        assert!(!kinds.contains(&CommandKind::SendTracePath));
    }

    #[test]
    fn test_fingerprint_ignores_submission_time() {
        let p = params(json!({"destination": key('a'), "text": "hi"}));
        let a = Command::new(CommandKind::SendMessage, p.clone()).unwrap();
        let b = Command::new(CommandKind::SendMessage, p).unwrap();
        assert_ne!(a.request_id, b.request_id);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_depends_on_kind_and_params() {
        let p = params(json!({"destination": key('a')}));
        let ping = Command::new(CommandKind::Ping, p.clone()).unwrap();
        let trace = Command::new(CommandKind::SendTracePath, p).unwrap();
        assert_ne!(ping.fingerprint(), trace.fingerprint());

        let other = Command::new(CommandKind::Ping, params(json!({"destination": key('b')}))).unwrap();
        assert_ne!(ping.fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_defaults_applied_before_fingerprint() {
        let implicit = Command::new(CommandKind::SendAdvert, CommandParams::new()).unwrap();
        let explicit =
            Command::new(CommandKind::SendAdvert, params(json!({"flood": false}))).unwrap();
        assert_eq!(implicit.fingerprint(), explicit.fingerprint());
        assert_eq!(implicit.param_bool("flood"), Some(false));

        let msg = Command::new(
            CommandKind::SendMessage,
            params(json!({"destination": key('c'), "text": "x"})),
        )
        .unwrap();
        assert_eq!(msg.param_str("text_type"), Some("plain"));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let short = params(json!({"destination": "abcd"}));
        assert!(matches!(
            Command::new(CommandKind::Ping, short),
            Err(DispatchError::InvalidCommand(_))
        ));

        let not_hex = params(json!({"destination": key('z')}));
        assert!(Command::new(CommandKind::Ping, not_hex).is_err());

        let empty_text = params(json!({"text": ""}));
        assert!(Command::new(CommandKind::SendChannelMessage, empty_text).is_err());

        let long_text = params(json!({"text": "x".repeat(MAX_TEXT_LEN + 1)}));
        assert!(Command::new(CommandKind::SendChannelMessage, long_text).is_err());

        let bad_type = params(json!({"destination": key('a'), "text": "x", "text_type": "html"}));
        assert!(Command::new(CommandKind::SendMessage, bad_type).is_err());

        let extra = params(json!({"flood": true, "power": 20}));
        assert!(Command::new(CommandKind::SendAdvert, extra).is_err());

        let bad_flood = params(json!({"flood": "yes"}));
        assert!(Command::new(CommandKind::SendAdvert, bad_flood).is_err());
    }

    #[test]
    fn test_outcome_constructors() {
        let cmd = Command::new(CommandKind::SendAdvert, CommandParams::new()).unwrap();

        let ok = CommandOutcome::executed(&cmd, json!({"type": "ADVERT_SENT"}));
        assert!(ok.success);
        assert_eq!(ok.request_id, cmd.request_id);
        assert_eq!(ok.payload_field("type"), Some(&json!("ADVERT_SENT")));

        let dropped = CommandOutcome::dropped(&cmd.request_id);
        assert!(!dropped.success);
        assert_eq!(dropped.error.as_deref(), Some(error_codes::DROPPED));

        let failed = CommandOutcome::failed(&cmd, &ExecutionError::Timeout);
        assert_eq!(failed.error.as_deref(), Some(error_codes::EXECUTION_FAILED));
    }

    #[test]
    fn test_entry_state_terminal() {
        assert!(EntryState::Resolved.is_terminal());
        assert!(EntryState::DroppedByOverflow.is_terminal());
        assert!(!EntryState::Admitted.is_terminal());
        assert!(!EntryState::Executing.is_terminal());
    }
}

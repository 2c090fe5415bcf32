use base64::Engine;
use nao_core::events::SessionEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const COMMAND_MESSAGE: &str = "Command";

/// Outbound message, serialized as `{"id": <variant>, "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "id", content = "data", rename_all_fields = "camelCase")]
pub enum Outbound {
    NaoState {
        connected: bool,
        fake_robot: bool,
    },
    Log {
        log: String,
        log_level: String,
    },
    Touch {
        part: String,
        touched: bool,
    },
    Joints {
        joints_names: Vec<String>,
        joints_angles: Vec<f32>,
    },
    Audio {
        rate: u32,
        channels: u32,
        nb_samples_per_channel: u32,
        /// Base64 of the raw buffer.
        data: String,
    },
    CommandEnded(CommandEnded),
}

impl Outbound {
    pub fn from_event(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Touch { part, touched } => Self::Touch { part, touched },
            SessionEvent::Joints { names, angles } => Self::Joints {
                joints_names: names,
                joints_angles: angles,
            },
            SessionEvent::Audio {
                rate,
                channels,
                samples_per_channel,
                data,
            } => Self::Audio {
                rate,
                channels,
                nb_samples_per_channel: samples_per_channel,
                data: base64::engine::general_purpose::STANDARD.encode(&data),
            },
            SessionEvent::Log { message, level } => Self::Log {
                log: message,
                log_level: level.as_str().to_string(),
            },
        }
    }

    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize outbound message");
                None
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ResultType {
    Success,
    Error,
}

/// Response to one command invocation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnded {
    pub command_uuid: String,
    pub result_type: ResultType,
    pub message: String,
    pub data: Value,
}

impl CommandEnded {
    pub fn success(command_uuid: impl Into<String>, data: Value) -> Self {
        Self {
            command_uuid: command_uuid.into(),
            result_type: ResultType::Success,
            message: String::new(),
            data,
        }
    }

    pub fn error(command_uuid: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command_uuid: command_uuid.into(),
            result_type: ResultType::Error,
            message: message.into(),
            data: Value::Null,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result_type == ResultType::Success
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    id: String,
    #[serde(default)]
    data: Value,
}

/// A `Command` message with its correlation id resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandRequest {
    pub command_uuid: String,
    /// Empty when the client sent none; resolves to an unknown command.
    pub command_id: String,
    pub command_data: Value,
}

#[derive(Debug, PartialEq)]
pub enum Inbound {
    Command(CommandRequest),
    /// Any other envelope id.
    Other(String),
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("command has no usable commandUuid")]
    MissingCorrelation,
}

/// Parse one inbound text frame.
pub fn parse_inbound(text: &str) -> Result<Inbound, ProtocolError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    if envelope.id != COMMAND_MESSAGE {
        return Ok(Inbound::Other(envelope.id));
    }

    let command_uuid = envelope
        .data
        .get("commandUuid")
        .and_then(correlation_id)
        .ok_or(ProtocolError::MissingCorrelation)?;
    let command_id = envelope
        .data
        .get("commandId")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let command_data = envelope
        .data
        .get("commandData")
        .cloned()
        .unwrap_or(Value::Null);

    Ok(Inbound::Command(CommandRequest {
        command_uuid,
        command_id,
        command_data,
    }))
}

// Scalars are stringified so numeric ids still correlate.
fn correlation_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

//! Typed progress events decoded from stream frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DecodeFailure;
use crate::frame::Frame;

/// Message used when an `error` event carries no text of its own.
pub const GENERIC_ERROR_MESSAGE: &str = "Code generation failed";

/// The closed set of event kinds the server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    Status,
    Endpoints,
    Completed,
    Error,
    StreamEnd,
}

impl EventKind {
    /// Maps an `event:` name to its kind.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            "status" => Some(Self::Status),
            "endpoints" => Some(Self::Endpoints),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            "streamEnd" | "stream_end" | "end" => Some(Self::StreamEnd),
            _ => None,
        }
    }

    /// Canonical wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Endpoints => "endpoints",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::StreamEnd => "streamEnd",
        }
    }
}

/// One API endpoint discovered by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub method: String,
    pub path: String,
    pub description: String,
}

impl EndpointRecord {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            description: description.into(),
        }
    }
}

/// Endpoint shape as sent by the server; every field is optional.
#[derive(Debug, Default, Deserialize)]
struct RawEndpoint {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default, rename = "endpointName")]
    endpoint_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

impl RawEndpoint {
    fn normalize(self) -> EndpointRecord {
        let method = self
            .method
            .map(|m| m.trim().to_ascii_uppercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "GET".to_string());
        EndpointRecord {
            method,
            path: self.endpoint_name.or(self.path).unwrap_or_default(),
            description: self.description.or(self.summary).unwrap_or_default(),
        }
    }
}

/// Terminal artifact descriptor carried by a `completed` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionResult {
    /// Server-side location of the generated archive (`zip_path`).
    pub artifact_locator: String,
    /// Human-readable project name (`repo_name`).
    pub project_name: String,
    /// The full result object as sent by the server.
    pub raw: Value,
}

/// A decoded progress event.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    /// Free-form progress text.
    Status(String),
    /// Latest full endpoint list.
    Endpoints(Vec<EndpointRecord>),
    /// The job finished and produced an artifact.
    Completed(SessionResult),
    /// The job failed server-side.
    Error(String),
    /// The server closed the stream deliberately.
    StreamEnd,
}

impl DecodedEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Status(_) => EventKind::Status,
            Self::Endpoints(_) => EventKind::Endpoints,
            Self::Completed(_) => EventKind::Completed,
            Self::Error(_) => EventKind::Error,
            Self::StreamEnd => EventKind::StreamEnd,
        }
    }

    /// Returns true if this event ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Error(_) | Self::StreamEnd)
    }
}

/// Decodes a frame's JSON payload according to its event type.
pub fn decode(frame: &Frame) -> Result<DecodedEvent, DecodeFailure> {
    let event_type = frame.event_type.as_str();
    let Some(kind) = EventKind::from_event_type(event_type) else {
        return Err(DecodeFailure::UnknownEventType {
            event_type: event_type.to_string(),
        });
    };
    if kind == EventKind::StreamEnd {
        return Ok(DecodedEvent::StreamEnd);
    }

    let value: Value =
        serde_json::from_str(&frame.raw_payload).map_err(|e| DecodeFailure::InvalidJson {
            event_type: event_type.to_string(),
            message: e.to_string(),
        })?;

    match kind {
        EventKind::Status => decode_status(event_type, &value),
        EventKind::Endpoints => decode_endpoints(event_type, value),
        EventKind::Completed => decode_completed(event_type, value),
        EventKind::Error => Ok(DecodedEvent::Error(error_message(&value))),
        EventKind::StreamEnd => Ok(DecodedEvent::StreamEnd),
    }
}

fn decode_status(event_type: &str, value: &Value) -> Result<DecodedEvent, DecodeFailure> {
    let text = match value {
        Value::String(text) => Some(text.as_str()),
        other => other.get("status").and_then(Value::as_str),
    };
    text.map(|t| DecodedEvent::Status(t.to_string()))
        .ok_or_else(|| DecodeFailure::MissingField {
            event_type: event_type.to_string(),
            field: "status",
        })
}

fn decode_endpoints(event_type: &str, mut value: Value) -> Result<DecodedEvent, DecodeFailure> {
    let list = if value.is_array() {
        value
    } else {
        match value.get_mut("endpoints") {
            Some(list) => list.take(),
            None => {
                return Err(DecodeFailure::MissingField {
                    event_type: event_type.to_string(),
                    field: "endpoints",
                });
            }
        }
    };
    let raw: Vec<RawEndpoint> =
        serde_json::from_value(list).map_err(|e| DecodeFailure::InvalidJson {
            event_type: event_type.to_string(),
            message: e.to_string(),
        })?;
    Ok(DecodedEvent::Endpoints(
        raw.into_iter().map(RawEndpoint::normalize).collect(),
    ))
}

fn decode_completed(event_type: &str, value: Value) -> Result<DecodedEvent, DecodeFailure> {
    let result = match value.get("result") {
        Some(result) => result.clone(),
        None => value,
    };
    let field = |name: &'static str| {
        result
            .get(name)
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| DecodeFailure::MissingField {
                event_type: event_type.to_string(),
                field: name,
            })
    };
    let artifact_locator = field("zip_path")?;
    let project_name = field("repo_name")?;
    Ok(DecodedEvent::Completed(SessionResult {
        artifact_locator,
        project_name,
        raw: result,
    }))
}

fn error_message(value: &Value) -> String {
    let message = match value {
        Value::String(text) => Some(text.as_str()),
        other => other
            .get("error")
            .and_then(|e| e.as_str().or_else(|| e.get("message").and_then(Value::as_str)))
            .or_else(|| other.get("message").and_then(Value::as_str)),
    };
    message
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(GENERIC_ERROR_MESSAGE)
        .to_string()
}

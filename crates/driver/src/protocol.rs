//! Wire format of the line protocol.
//!
//! Input, one JSON object per line:
//! `{"prompt": "...", "mode": "classify" | "plan" | "execute", "requestId": ...}`
//!
//! Output, one JSON object per line:
//! - `{"type": "ready"}` once at startup
//! - `{"requestId": ..., "result": ...}` or `{"requestId": ..., "error": "..."}`
//!   exactly once per input line
//! - `{"type": "progress" | "activity", "requestId": ..., "message": "..."}`
//!   while a task runs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{Value, json};
use taskwright_core::event::{AgentEvent, EventKind};
use thiserror::Error;

/// Echoed when a line carries no usable request id.
pub const UNKNOWN_REQUEST_ID: &str = "unknown";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Classify,
    Plan,
    Execute,
}

impl FromStr for Mode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classify" => Ok(Self::Classify),
            "plan" => Ok(Self::Plan),
            "execute" => Ok(Self::Execute),
            other => Err(ProtocolError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Classify => "classify",
            Self::Plan => "plan",
            Self::Execute => "execute",
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    #[serde(default)]
    prompt: String,
    #[serde(default = "default_mode")]
    mode: String,
}

fn default_mode() -> String {
    "execute".into()
}

/// A validated request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Echoed verbatim; any JSON value the client chose.
    pub request_id: Value,
    pub mode: Mode,
    pub prompt: String,
}

/// A line that could not be turned into a [`Request`].
#[derive(Debug)]
pub struct Rejected {
    pub request_id: Value,
    pub error: ProtocolError,
}

impl Request {
    /// Parse one input line. On failure the request id is recovered when the
    /// line is at least a JSON object, so the error can be correlated.
    pub fn parse(line: &str) -> Result<Self, Rejected> {
        let value: Value = serde_json::from_str(line).map_err(|e| Rejected {
            request_id: unknown_id(),
            error: ProtocolError::InvalidJson(e.to_string()),
        })?;

        let request_id = value
            .get("requestId")
            .filter(|id| !id.is_null())
            .cloned()
            .unwrap_or_else(unknown_id);
        let reject = |error: ProtocolError| Rejected {
            request_id: request_id.clone(),
            error,
        };

        let raw: RawRequest =
            serde_json::from_value(value).map_err(|e| reject(ProtocolError::InvalidRequest(e.to_string())))?;
        let mode = raw.mode.parse::<Mode>().map_err(reject)?;
        if raw.prompt.trim().is_empty() {
            return Err(reject(ProtocolError::EmptyPrompt));
        }

        Ok(Self {
            request_id,
            mode,
            prompt: raw.prompt,
        })
    }
}

fn unknown_id() -> Value {
    Value::String(UNKNOWN_REQUEST_ID.into())
}

/// One output line.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Ready,
    Result { request_id: Value, result: Value },
    Error { request_id: Value, error: String },
    Event { request_id: Value, kind: EventKind, message: String },
}

impl Output {
    pub fn event(request_id: &Value, event: &AgentEvent) -> Self {
        Self::Event {
            request_id: request_id.clone(),
            kind: event.kind(),
            message: event.describe(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Ready => json!({"type": "ready"}),
            Self::Result { request_id, result } => json!({"requestId": request_id, "result": result}),
            Self::Error { request_id, error } => json!({"requestId": request_id, "error": error}),
            Self::Event {
                request_id,
                kind,
                message,
            } => json!({"type": kind, "requestId": request_id, "message": message}),
        }
    }

    /// Serialized form without the trailing newline.
    pub fn to_line(&self) -> String {
        self.to_value().to_string()
    }
}

//! Wire protocol: one JSON frame per WebSocket message, tagged by `type`.
//!
//! Parsing is split into three failure classes so the session loop can pick
//! the right wire error code without string matching:
//! - not JSON (or not an object)       → `invalid_message`
//! - object without a recognized type  → `unknown_message_type`
//! - recognized type, malformed fields → `invalid_payload`

use serde::{Deserialize, Serialize};

use crate::history::ChatTurn;
use crate::stream::SamplingOverrides;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client → server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub enum ClientFrame {
    Start(StartPayload),
    Cancel,
    Ping,
    Pong,
    End,
    ChatPrompt(ChatPromptPayload),
}

/// Raw (pre-validation) `start` payload. Presence and shape checks happen
/// here via serde; semantic validation happens in the gateway validators.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartPayload {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub chat_prompt: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default)]
    pub user_utterance: Option<String>,
    #[serde(default)]
    pub sampling: Option<SamplingOverrides>,
}

/// Raw `chat_prompt` persona-update payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatPromptPayload {
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub chat_prompt: Option<String>,
}

const KNOWN_TYPES: &[&str] = &["start", "cancel", "ping", "pong", "end", "chat_prompt"];

/// How an inbound text frame failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameParseError {
    /// Not JSON, or not a JSON object.
    InvalidMessage,
    /// JSON object whose `type` is missing or not one of ours.
    UnknownType(String),
    /// Recognized `type` but the fields do not deserialize.
    InvalidPayload(String),
}

impl FrameParseError {
    pub fn wire_code(&self) -> &'static str {
        match self {
            FrameParseError::InvalidMessage => "invalid_message",
            FrameParseError::UnknownType(_) => "unknown_message_type",
            FrameParseError::InvalidPayload(_) => "invalid_payload",
        }
    }
}

/// Parse one inbound text frame.
pub fn parse_client_frame(text: &str) -> Result<ClientFrame, FrameParseError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|_| FrameParseError::InvalidMessage)?;
    let serde_json::Value::Object(mut obj) = value else {
        return Err(FrameParseError::InvalidMessage);
    };

    let ty = match obj.remove("type") {
        Some(serde_json::Value::String(s)) => s,
        _ => return Err(FrameParseError::UnknownType(String::new())),
    };
    if !KNOWN_TYPES.contains(&ty.as_str()) {
        return Err(FrameParseError::UnknownType(ty));
    }

    let body = serde_json::Value::Object(obj);
    match ty.as_str() {
        "start" => serde_json::from_value(body)
            .map(ClientFrame::Start)
            .map_err(|e| FrameParseError::InvalidPayload(e.to_string())),
        "chat_prompt" => serde_json::from_value(body)
            .map(ClientFrame::ChatPrompt)
            .map_err(|e| FrameParseError::InvalidPayload(e.to_string())),
        // Control frames carry no fields beyond the type tag.
        other => {
            if !body.as_object().map(|o| o.is_empty()).unwrap_or(false) {
                return Err(FrameParseError::InvalidPayload(format!(
                    "{other} frames carry no fields"
                )));
            }
            Ok(match other {
                "cancel" => ClientFrame::Cancel,
                "ping" => ClientFrame::Ping,
                "pong" => ClientFrame::Pong,
                _ => ClientFrame::End,
            })
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server → client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Yes,
    No,
}

/// One entry of a `toolcall.raw` array. The only tool today is
/// `take_screenshot`, but the wire shape is an array of named calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallSpec {
    pub name: String,
}

impl ToolCallSpec {
    pub fn take_screenshot() -> Self {
        Self {
            name: "take_screenshot".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Ack {
        #[serde(rename = "for")]
        target: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        code: u16,
    },
    Toolcall {
        status: ToolStatus,
        raw: Vec<ToolCallSpec>,
        request_id: String,
    },
    Token {
        text: String,
        request_id: String,
    },
    Final {
        normalized_text: String,
        request_id: String,
    },
    Done {
        request_id: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        cancelled: bool,
    },
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_in: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        friendly_message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
    Pong {},
}

impl ServerFrame {
    /// Shorthand for the common error frame with no extras.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            code: code.into(),
            message: message.into(),
            retry_in: None,
            friendly_message: None,
            details: None,
        }
    }

    pub fn to_json(&self) -> String {
        // ServerFrame contains only JSON-safe fields; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| "{\"type\":\"error\"}".into())
    }
}

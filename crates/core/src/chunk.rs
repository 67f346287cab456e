//! Stream chunks — the unit of a turn's output.
//!
//! Chunks are passed through the controller untouched, so the type keeps
//! every field it was given. Only `type`, `content` and the optional typed
//! `stop` signal are lifted into named fields; anything else lands in
//! `extra` and is serialized back out verbatim.

use serde::{Deserialize, Serialize};

/// Chunk type emitted for assistant output.
pub const ASSISTANT: &str = "assistant";
/// Chunk type emitted for controller and executor status updates.
pub const STATUS: &str = "status";

/// How a turn wants the session to proceed.
///
/// Executors that know this attach it to a chunk directly; older executors
/// only embed `</ask>` / `</complete>` tags in assistant text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopSignal {
    Continue,
    /// The agent asked the user a question and waits for input.
    Ask,
    /// The agent declared the task finished.
    Complete,
}

impl StopSignal {
    /// Whether this signal ends the session after the current turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ask | Self::Complete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Ask => "ask",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field names the typed part of [`Chunk`] serializes itself.
pub const RESERVED_FIELDS: &[&str] = &["type", "content", "stop"];

/// One incremental unit of a turn's output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk type (`assistant`, `tool`, `status`, ...)
    #[serde(rename = "type")]
    pub chunk_type: String,

    /// Payload; for assistant chunks usually a JSON object (or its string
    /// encoding) with a nested `content` text field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,

    /// Typed completion signal, when the executor provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSignal>,

    /// Every other field, preserved as received
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Chunk {
    pub fn new(chunk_type: impl Into<String>, content: Option<serde_json::Value>) -> Self {
        Self {
            chunk_type: chunk_type.into(),
            content,
            stop: None,
            extra: serde_json::Map::new(),
        }
    }

    /// An assistant chunk whose content is the JSON-encoded `{"content": text}`
    /// envelope executors produce.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        let envelope = serde_json::json!({ "role": "assistant", "content": text.into() });
        Self::new(ASSISTANT, Some(serde_json::Value::String(envelope.to_string())))
    }

    /// A `{type: "status", status, message}` chunk.
    pub fn status(status: &str, message: impl Into<String>) -> Self {
        let mut chunk = Self::new(STATUS, None);
        chunk
            .extra
            .insert("status".into(), serde_json::Value::String(status.into()));
        chunk
            .extra
            .insert("message".into(), serde_json::Value::String(message.into()));
        chunk
    }

    /// The terminal status chunk emitted when the controller stops itself.
    pub fn stopped(message: impl Into<String>) -> Self {
        Self::status("stopped", message)
    }

    /// Attach a typed stop signal.
    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn is_type(&self, chunk_type: &str) -> bool {
        self.chunk_type == chunk_type
    }

    /// The `status` field of a status chunk.
    pub fn status_value(&self) -> Option<&str> {
        self.extra.get("status").and_then(|v| v.as_str())
    }

    /// The `message` field of a status chunk.
    pub fn message(&self) -> Option<&str> {
        self.extra.get("message").and_then(|v| v.as_str())
    }
}

//! Message and session-log domain types.
//!
//! A thread (session) is an append-only, totally ordered log of messages.
//! The controller only ever reads it; the turn executor and its tools are
//! the sole writers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a thread (session).
    ThreadId
);

string_id!(
    /// Identifier of the project that owns a thread.
    ProjectId
);

string_id!(
    /// Identifier of the billing account that owns a project.
    AccountId
);

impl ThreadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

/// The kind of a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    User,
    Assistant,
    Tool,
    Status,
    /// Snapshot of external state (e.g. a rendered browser page).
    #[serde(alias = "browser_state")]
    EnvironmentObservation,
}

impl MessageType {
    /// Types that make up the actual conversation between user and agent.
    pub const CONVERSATION: &'static [MessageType] =
        &[MessageType::User, MessageType::Assistant, MessageType::Tool];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::Status => "status",
            Self::EnvironmentObservation => "environment_observation",
        }
    }

    /// Parse a stored type name, accepting the legacy `browser_state` alias.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "tool" => Some(Self::Tool),
            "status" => Some(Self::Status),
            "environment_observation" | "browser_state" => Some(Self::EnvironmentObservation),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single persisted message. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// The thread this message belongs to
    pub thread_id: ThreadId,

    /// What kind of message this is
    #[serde(rename = "type")]
    pub message_type: MessageType,

    /// Plain text, structured data, or JSON encoded as text
    pub content: serde_json::Value,

    /// Creation time; the log is ordered by this, ties by insertion order
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message stamped with the current time.
    pub fn new(
        thread_id: ThreadId,
        message_type: MessageType,
        content: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thread_id,
            message_type,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(thread_id: ThreadId, content: impl Into<serde_json::Value>) -> Self {
        Self::new(thread_id, MessageType::User, content)
    }

    pub fn assistant(thread_id: ThreadId, content: impl Into<serde_json::Value>) -> Self {
        Self::new(thread_id, MessageType::Assistant, content)
    }

    pub fn tool(thread_id: ThreadId, content: impl Into<serde_json::Value>) -> Self {
        Self::new(thread_id, MessageType::Tool, content)
    }

    pub fn observation(thread_id: ThreadId, content: impl Into<serde_json::Value>) -> Self {
        Self::new(thread_id, MessageType::EnvironmentObservation, content)
    }

    /// Override the creation timestamp.
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Content rendered as text: strings verbatim, structured data as JSON.
    pub fn content_text(&self) -> String {
        match &self.content {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_serializes_snake_case() {
        let json = serde_json::to_string(&MessageType::EnvironmentObservation).unwrap();
        assert_eq!(json, r#""environment_observation""#);
    }

    #[test]
    fn legacy_browser_state_alias_accepted() {
        let parsed: MessageType = serde_json::from_str(r#""browser_state""#).unwrap();
        assert_eq!(parsed, MessageType::EnvironmentObservation);
        assert_eq!(
            MessageType::parse("browser_state"),
            Some(MessageType::EnvironmentObservation)
        );
        assert_eq!(MessageType::parse("system"), None);
    }

    #[test]
    fn message_uses_type_field_name() {
        let msg = Message::assistant(ThreadId::from("t-1"), "done");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "assistant");
        assert_eq!(json["thread_id"], "t-1");
    }

    #[test]
    fn content_text_keeps_strings_and_encodes_objects() {
        let text = Message::user(ThreadId::from("t"), "hello");
        assert_eq!(text.content_text(), "hello");

        let structured = Message::tool(ThreadId::from("t"), serde_json::json!({"ok": true}));
        assert_eq!(structured.content_text(), r#"{"ok":true}"#);
    }
}

//! Turn executor trait — the abstraction over the model/tool engine.
//!
//! One call to [`TurnExecutor::run_turn`] is one turn: the executor sends
//! the thread to a model, runs whatever tools the model asks for, appends
//! the results to the session log, and streams chunks back as it goes.
//! The controller never looks inside; it only reads the chunks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::capability::Capabilities;
use crate::chunk::{Chunk, RESERVED_FIELDS};
use crate::message::ThreadId;

/// How tool calls found in one response are run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolExecutionStrategy {
    Sequential,
    #[default]
    Parallel,
}

/// Where XML tool results are written back into the thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XmlAddingStrategy {
    #[default]
    UserMessage,
    AssistantMessage,
    InlineEdit,
}

/// Tool-call parsing and execution policy for one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorPolicy {
    pub xml_tool_calling: bool,
    pub native_tool_calling: bool,
    pub execute_tools: bool,
    pub execute_on_stream: bool,
    pub tool_execution_strategy: ToolExecutionStrategy,
    pub xml_adding_strategy: XmlAddingStrategy,
}

impl Default for ProcessorPolicy {
    fn default() -> Self {
        Self {
            xml_tool_calling: true,
            native_tool_calling: false,
            execute_tools: true,
            execute_on_stream: true,
            tool_execution_strategy: ToolExecutionStrategy::Parallel,
            xml_adding_strategy: XmlAddingStrategy::UserMessage,
        }
    }
}

/// The URL of an image part (usually an inline `data:` URI).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One part of a multi-part context message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// A message handed to the executor for one turn only. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

impl ContextMessage {
    /// The text parts joined with newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn image_urls(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
                ContentPart::Text { .. } => None,
            })
            .collect()
    }
}

/// Everything the executor needs for one turn. Built fresh per turn and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Thread being driven
    pub thread_id: ThreadId,

    /// 1-based iteration number within this run
    pub iteration: u32,

    /// Model to use (e.g., "anthropic/claude-3-7-sonnet-latest")
    pub model: String,

    pub temperature: f32,

    /// Maximum tokens to generate; `None` leaves it to the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether the executor should stream partial output
    pub stream: bool,

    pub tool_choice: String,
    pub max_xml_tool_calls: u32,
    pub include_xml_examples: bool,
    pub processor: ProcessorPolicy,

    /// How many times the executor may continue on its own after a
    /// length-truncated response
    pub native_max_auto_continues: u32,

    pub enable_thinking: bool,
    pub reasoning_effort: String,
    pub enable_context_manager: bool,

    /// Optional tools, fixed for the session
    pub capabilities: Capabilities,

    /// Transient environment context for this turn only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transient_message: Option<ContextMessage>,
}

/// A turn that failed before producing a stream.
///
/// Rendered in-band as `{type: "status", status: "error", message, ...details}`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Turn execution failed: {message}")]
pub struct ExecutorError {
    pub message: String,
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl ExecutorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: serde_json::Map::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// The chunk that carries this error to the caller.
    pub fn to_chunk(&self) -> Chunk {
        let mut chunk = Chunk::status("error", self.message.clone());
        for (key, value) in &self.details {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            chunk.extra.entry(key.clone()).or_insert_with(|| value.clone());
        }
        chunk
    }
}

/// Runs one model turn and streams its chunks in emission order.
#[async_trait]
pub trait TurnExecutor: Send + Sync {
    /// A human-readable name for this executor.
    fn name(&self) -> &str;

    /// Start a turn. An `Err` means no turn output will follow.
    async fn run_turn(&self, config: TurnConfig) -> Result<mpsc::Receiver<Chunk>, ExecutorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_details_cannot_shadow_chunk_fields() {
        let chunk = ExecutorError::new("boom")
            .with_detail("type", serde_json::json!("assistant"))
            .with_detail("content", serde_json::json!("spoofed"))
            .with_detail("stop", serde_json::json!("complete"))
            .with_detail("status", serde_json::json!("ok"))
            .with_detail("code", serde_json::json!(529))
            .to_chunk();

        let json = serde_json::to_string(&chunk).unwrap();
        assert_eq!(json.matches("\"type\"").count(), 1);
        assert!(!json.contains("spoofed"));
        assert!(!json.contains("\"stop\""));

        let parsed: Chunk = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.chunk_type, "status");
        assert_eq!(parsed.status_value(), Some("error"));
        assert_eq!(parsed.message(), Some("boom"));
        assert_eq!(parsed.extra["code"], 529);
    }

    #[test]
    fn default_policy_matches_xml_streaming_setup() {
        let policy = ProcessorPolicy::default();
        assert!(policy.xml_tool_calling);
        assert!(!policy.native_tool_calling);
        assert!(policy.execute_on_stream);
        assert_eq!(policy.tool_execution_strategy, ToolExecutionStrategy::Parallel);
        assert_eq!(policy.xml_adding_strategy, XmlAddingStrategy::UserMessage);
    }

    #[test]
    fn content_parts_use_openai_style_tags() {
        let msg = ContextMessage {
            role: "user".into(),
            content: vec![
                ContentPart::Text {
                    text: "state".into(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "data:image/jpeg;base64,AAAA".into(),
                    },
                },
            ],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"]["url"], "data:image/jpeg;base64,AAAA");
        assert_eq!(msg.text(), "state");
        assert_eq!(msg.image_urls(), vec!["data:image/jpeg;base64,AAAA"]);
    }

    #[test]
    fn executor_error_chunk_keeps_status_and_message() {
        let err = ExecutorError::new("model overloaded")
            .with_detail("status", serde_json::json!("ignored"))
            .with_detail("code", serde_json::json!(529));
        let chunk = err.to_chunk();
        assert_eq!(chunk.chunk_type, "status");
        assert_eq!(chunk.status_value(), Some("error"));
        assert_eq!(chunk.message(), Some("model overloaded"));
        assert_eq!(chunk.extra["code"], 529);
    }
}

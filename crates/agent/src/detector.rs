//! Completion detection over a turn's chunk stream.
//!
//! The detector never alters or holds back a chunk. It only remembers
//! whether the agent asked to stop during the current turn.

use tracing::debug;
use turnstile_core::chunk::ASSISTANT;
use turnstile_core::error::DecodeError;
use turnstile_core::{Chunk, StopSignal};

/// Closing tag of an ask-the-user tool call.
pub const ASK_SENTINEL: &str = "</ask>";

/// Closing tag of a task-complete tool call.
pub const COMPLETE_SENTINEL: &str = "</complete>";

/// Tracks the pending stop signal for one turn.
#[derive(Debug, Default)]
pub struct CompletionDetector {
    pending: Option<StopSignal>,
}

impl CompletionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything seen so far. Called at the start of every turn.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// The stop recorded so far this turn, if any.
    pub fn decision(&self) -> Option<StopSignal> {
        self.pending
    }

    /// Inspect one chunk.
    pub fn observe(&mut self, chunk: &Chunk) {
        if let Some(stop) = chunk.stop {
            if stop.is_terminal() {
                self.record(stop);
            }
            return;
        }

        if !chunk.is_type(ASSISTANT) {
            return;
        }

        match assistant_text(chunk) {
            Ok(Some(text)) => {
                if let Some(signal) = scan_sentinels(&text) {
                    self.record(signal);
                }
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Ignoring chunk for completion detection"),
        }
    }

    // `ask` is never downgraded by a later `complete`
    fn record(&mut self, signal: StopSignal) {
        if self.pending != Some(StopSignal::Ask) {
            self.pending = Some(signal);
        }
    }
}

/// The sentinel found in `text`; `ask` wins when both appear.
pub fn scan_sentinels(text: &str) -> Option<StopSignal> {
    if text.contains(ASK_SENTINEL) {
        Some(StopSignal::Ask)
    } else if text.contains(COMPLETE_SENTINEL) {
        Some(StopSignal::Complete)
    } else {
        None
    }
}

/// Decode the nested `content` text of an assistant chunk.
///
/// The chunk's `content` is either a JSON object or its string encoding.
/// Returns `Ok(None)` when the chunk has no content or the envelope has no
/// `content` field.
pub fn assistant_text(chunk: &Chunk) -> Result<Option<String>, DecodeError> {
    let Some(content) = &chunk.content else {
        return Ok(None);
    };

    let decoded;
    let envelope = match content {
        serde_json::Value::String(raw) => {
            decoded = serde_json::from_str::<serde_json::Value>(raw)
                .map_err(|e| DecodeError::UndecodableChunkContent(e.to_string()))?;
            &decoded
        }
        other => other,
    };

    let object = envelope.as_object().ok_or_else(|| {
        DecodeError::UndecodableChunkContent("content is not a JSON object".into())
    })?;

    match object.get("content") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(DecodeError::UndecodableChunkContent(
            "nested content is not text".into(),
        )),
    }
}

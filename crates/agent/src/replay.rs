//! A turn executor that replays a recorded script.
//!
//! Each scripted turn either fails to start or streams a fixed list of
//! chunks, optionally appending messages to the session log first (the way
//! a live executor persists its replies and tool results).
//!
//! Every thread replays the script from its own cursor, and a run's first
//! iteration rewinds that thread to the start.
//!
//! ```json
//! {"turns": [
//!   {"append": [{"type": "tool", "content": "ls: 3 files"}],
//!    "chunks": [{"type": "assistant", "content": "{\"content\": \"Looking...\"}"}]},
//!   {"error": {"message": "model overloaded"}}
//! ]}
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use turnstile_core::{
    Chunk, ExecutorError, Message, MessageType, SessionWriter, ThreadId, TurnConfig, TurnExecutor,
};

/// A full replay script.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub turns: Vec<ScriptedTurn>,
}

/// One recorded turn.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptedTurn {
    #[serde(default)]
    pub chunks: Vec<Chunk>,

    /// Messages the turn persists before streaming
    #[serde(default)]
    pub append: Vec<ScriptedMessage>,

    /// When set, the turn fails to start
    #[serde(default)]
    pub error: Option<ScriptedError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedError {
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl ReplayScript {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load(path: &Path) -> turnstile_core::Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| turnstile_core::Error::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Ok(Self::from_json(&raw)?)
    }
}

/// Replays scripted turns in order. Running past the end is an executor error.
pub struct ReplayExecutor {
    turns: Vec<ScriptedTurn>,
    cursors: Mutex<HashMap<ThreadId, usize>>,
    writer: Option<Arc<dyn SessionWriter>>,
}

impl ReplayExecutor {
    pub fn new(script: ReplayScript) -> Self {
        Self {
            turns: script.turns,
            cursors: Mutex::new(HashMap::new()),
            writer: None,
        }
    }

    /// Persist each turn's `append` messages through `writer`.
    pub fn with_writer(mut self, writer: Arc<dyn SessionWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Number of turns started so far, across all threads.
    pub fn turns_started(&self) -> usize {
        self.cursors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|&cursor| cursor.min(self.turns.len()))
            .sum()
    }

    /// Claim the next turn index for `config`'s thread.
    fn next_index(&self, config: &TurnConfig) -> usize {
        let mut cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        let cursor = cursors.entry(config.thread_id.clone()).or_insert(0);
        if config.iteration <= 1 {
            *cursor = 0;
        }
        let index = *cursor;
        *cursor += 1;
        index
    }
}

#[async_trait]
impl TurnExecutor for ReplayExecutor {
    fn name(&self) -> &str {
        "replay"
    }

    async fn run_turn(&self, config: TurnConfig) -> Result<mpsc::Receiver<Chunk>, ExecutorError> {
        let index = self.next_index(&config);
        let Some(turn) = self.turns.get(index) else {
            return Err(ExecutorError::new("Replay script exhausted")
                .with_detail("turns", serde_json::json!(self.turns.len())));
        };

        if let Some(error) = &turn.error {
            let mut err = ExecutorError::new(error.message.clone());
            err.details = error.details.clone();
            return Err(err);
        }

        for scripted in &turn.append {
            let message = Message::new(
                config.thread_id.clone(),
                scripted.message_type,
                scripted.content.clone(),
            );
            match &self.writer {
                Some(writer) => writer.append(message).await.map_err(|e| {
                    ExecutorError::new(format!("Failed to persist message: {e}"))
                })?,
                None => warn!("Replay turn appends messages but no writer is attached"),
            }
        }

        debug!(
            thread_id = %config.thread_id,
            turn = index + 1,
            iteration = config.iteration,
            chunks = turn.chunks.len(),
            "Replaying turn"
        );

        let (tx, rx) = mpsc::channel(turn.chunks.len().max(1));
        let chunks = turn.chunks.clone();
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

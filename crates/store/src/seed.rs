//! Session fixtures: a thread, its project, and a starting message log.
//!
//! ```json
//! {
//!   "thread_id": "t-1",
//!   "project": {"project_id": "p-1", "account_id": "a-1", "sandbox": {"id": "sb-1"}},
//!   "messages": [{"type": "user", "content": "Build me a landing page"}]
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::path::Path;
use turnstile_core::error::StoreError;
use turnstile_core::{Message, MessageType, Project, SessionWriter, ThreadId};

use crate::InMemorySessionStore;

/// A thread to load into a store before a run.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSeed {
    pub thread_id: ThreadId,
    pub project: Project,
    #[serde(default)]
    pub messages: Vec<SeedMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: serde_json::Value,
    /// Defaults to one second apart, ending just before now
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl SessionSeed {
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json)
            .map_err(|e| StoreError::Storage(format!("Invalid session seed: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Storage(format!("Failed to read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    /// The seed's messages with timestamps filled in.
    pub fn to_messages(&self) -> Vec<Message> {
        let count = self.messages.len() as i64;
        let base = Utc::now() - Duration::seconds(count + 1);
        self.messages
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let at = m
                    .created_at
                    .unwrap_or_else(|| base + Duration::seconds(i as i64));
                Message::new(self.thread_id.clone(), m.message_type, m.content.clone()).at(at)
            })
            .collect()
    }
}

impl InMemorySessionStore {
    /// Register the seed's project and thread and append its messages.
    pub async fn seed(&self, seed: &SessionSeed) -> Result<(), StoreError> {
        self.add_project(seed.project.clone()).await;
        self.add_thread(seed.thread_id.clone(), seed.project.project_id.clone())
            .await;
        for message in seed.to_messages() {
            self.append(message).await?;
        }
        Ok(())
    }
}

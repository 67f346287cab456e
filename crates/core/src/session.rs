//! Session log and session resolution traits.
//!
//! The log is append-only and totally ordered by `created_at`, ties broken
//! by insertion order. Readers always get a point-in-time answer; nothing
//! here caches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::message::{AccountId, Message, MessageType, ProjectId, ThreadId};

/// The compute environment a project's tools run in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxInfo {
    pub id: String,
}

/// A project owns threads and is owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: ProjectId,
    pub account_id: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<SandboxInfo>,
}

impl Project {
    /// The sandbox id, if the project has a usable one.
    pub fn sandbox_id(&self) -> Option<&str> {
        self.sandbox
            .as_ref()
            .map(|s| s.id.as_str())
            .filter(|id| !id.is_empty())
    }
}

/// Read access to a thread's message log.
#[async_trait]
pub trait SessionLog: Send + Sync {
    /// The backend name (e.g., "memory", "sqlite").
    fn name(&self) -> &str;

    /// Most recent message of any of `types` in the thread, if one exists.
    async fn latest_message(
        &self,
        thread_id: &ThreadId,
        types: &[MessageType],
    ) -> Result<Option<Message>, StoreError>;

    /// Most recent `user`, `assistant` or `tool` message.
    async fn last_conversation_message(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Option<Message>, StoreError> {
        self.latest_message(thread_id, MessageType::CONVERSATION).await
    }

    /// Most recent environment observation.
    async fn latest_observation(&self, thread_id: &ThreadId) -> Result<Option<Message>, StoreError> {
        self.latest_message(thread_id, &[MessageType::EnvironmentObservation])
            .await
    }
}

/// Write access to the log. Held by turn executors and their tools; the
/// controller itself never appends.
#[async_trait]
pub trait SessionWriter: Send + Sync {
    async fn append(&self, message: Message) -> Result<(), StoreError>;
}

/// Resolves the ownership chain a run needs before it starts.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// The account that owns the thread, or `None` if the thread is unknown.
    async fn account_for_thread(&self, thread_id: &ThreadId)
    -> Result<Option<AccountId>, StoreError>;

    async fn project(&self, project_id: &ProjectId) -> Result<Option<Project>, StoreError>;
}

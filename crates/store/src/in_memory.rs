//! In-memory session store for tests and ephemeral sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use turnstile_core::error::StoreError;
use turnstile_core::{
    AccountId, Message, MessageType, Project, ProjectId, SessionLog, SessionResolver,
    SessionWriter, ThreadId,
};

/// An in-memory store keeping every message in insertion order.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    messages: Arc<RwLock<Vec<Message>>>,
    threads: Arc<RwLock<HashMap<ThreadId, ProjectId>>>,
    projects: Arc<RwLock<HashMap<ProjectId, Project>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a project.
    pub async fn add_project(&self, project: Project) {
        self.projects
            .write()
            .await
            .insert(project.project_id.clone(), project);
    }

    /// Register a thread under a project.
    pub async fn add_thread(&self, thread_id: ThreadId, project_id: ProjectId) {
        self.threads.write().await.insert(thread_id, project_id);
    }

    /// All messages of a thread in log order.
    pub async fn messages(&self, thread_id: &ThreadId) -> Vec<Message> {
        let mut msgs: Vec<Message> = self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| &m.thread_id == thread_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps
        msgs.sort_by_key(|m| m.created_at);
        msgs
    }

    pub async fn count(&self) -> usize {
        self.messages.read().await.len()
    }
}

#[async_trait]
impl SessionLog for InMemorySessionStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn latest_message(
        &self,
        thread_id: &ThreadId,
        types: &[MessageType],
    ) -> Result<Option<Message>, StoreError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .enumerate()
            .filter(|(_, m)| &m.thread_id == thread_id && types.contains(&m.message_type))
            .max_by_key(|(seq, m)| (m.created_at, *seq))
            .map(|(_, m)| m.clone()))
    }
}

#[async_trait]
impl SessionWriter for InMemorySessionStore {
    async fn append(&self, message: Message) -> Result<(), StoreError> {
        self.messages.write().await.push(message);
        Ok(())
    }
}

#[async_trait]
impl SessionResolver for InMemorySessionStore {
    async fn account_for_thread(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Option<AccountId>, StoreError> {
        let Some(project_id) = self.threads.read().await.get(thread_id).cloned() else {
            return Ok(None);
        };
        Ok(self
            .projects
            .read()
            .await
            .get(&project_id)
            .map(|p| p.account_id.clone()))
    }

    async fn project(&self, project_id: &ProjectId) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.read().await.get(project_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use turnstile_core::SandboxInfo;

    fn thread() -> ThreadId {
        ThreadId::from("thread-1")
    }

    #[tokio::test]
    async fn latest_message_filters_by_type() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        store
            .append(Message::user(thread(), "hi").at(now))
            .await
            .unwrap();
        store
            .append(Message::observation(thread(), "{}").at(now + Duration::seconds(1)))
            .await
            .unwrap();

        let last = store.last_conversation_message(&thread()).await.unwrap().unwrap();
        assert_eq!(last.message_type, MessageType::User);

        let obs = store.latest_observation(&thread()).await.unwrap().unwrap();
        assert_eq!(obs.message_type, MessageType::EnvironmentObservation);
    }

    #[tokio::test]
    async fn ordering_uses_created_at_not_insertion() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        store
            .append(Message::assistant(thread(), "later").at(now + Duration::seconds(5)))
            .await
            .unwrap();
        store
            .append(Message::tool(thread(), "earlier").at(now))
            .await
            .unwrap();

        let last = store.last_conversation_message(&thread()).await.unwrap().unwrap();
        assert_eq!(last.message_type, MessageType::Assistant);
    }

    #[tokio::test]
    async fn timestamp_ties_break_by_insertion_order() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        store
            .append(Message::assistant(thread(), "first").at(now))
            .await
            .unwrap();
        store
            .append(Message::tool(thread(), "second").at(now))
            .await
            .unwrap();

        let last = store.last_conversation_message(&thread()).await.unwrap().unwrap();
        assert_eq!(last.message_type, MessageType::Tool);
    }

    #[tokio::test]
    async fn other_threads_are_invisible() {
        let store = InMemorySessionStore::new();
        store
            .append(Message::assistant(ThreadId::from("other"), "x"))
            .await
            .unwrap();
        assert!(store.last_conversation_message(&thread()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resolves_account_through_project() {
        let store = InMemorySessionStore::new();
        store
            .add_project(Project {
                project_id: ProjectId::from("p-1"),
                account_id: AccountId::from("acct-9"),
                sandbox: Some(SandboxInfo { id: "sb".into() }),
            })
            .await;
        store.add_thread(thread(), ProjectId::from("p-1")).await;

        let account = store.account_for_thread(&thread()).await.unwrap();
        assert_eq!(account, Some(AccountId::from("acct-9")));
        assert!(
            store
                .account_for_thread(&ThreadId::from("missing"))
                .await
                .unwrap()
                .is_none()
        );
    }
}

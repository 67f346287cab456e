//! SQLite session store.
//!
//! Three tables:
//! - `projects` — project ownership and sandbox binding
//! - `threads` — thread to project mapping
//! - `messages` — the append-only log
//!
//! Timestamps are stored as integer microseconds so ordering is numeric,
//! and `seq` (the rowid alias) breaks ties by insertion order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use turnstile_core::error::StoreError;
use turnstile_core::{
    AccountId, Message, MessageType, Project, ProjectId, SandboxInfo, SessionLog,
    SessionResolver, SessionWriter, ThreadId,
};

/// A SQLite-backed session log and resolver.
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Open (or create) a store at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database. In-memory
    /// databases are per connection, so the pool is pinned to one.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let in_memory = path.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite session store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                project_id  TEXT PRIMARY KEY NOT NULL,
                account_id  TEXT NOT NULL,
                sandbox_id  TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("projects table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS threads (
                thread_id   TEXT PRIMARY KEY NOT NULL,
                project_id  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("threads table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT UNIQUE NOT NULL,
                thread_id   TEXT NOT NULL,
                type        TEXT NOT NULL,
                content     TEXT NOT NULL,
                is_json     INTEGER NOT NULL DEFAULT 0,
                created_at  INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_thread_type_created \
             ON messages(thread_id, type, created_at DESC, seq DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        debug!("SQLite session store migrations complete");
        Ok(())
    }

    /// Insert or replace a project.
    pub async fn add_project(&self, project: &Project) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO projects (project_id, account_id, sandbox_id) VALUES (?1, ?2, ?3)",
        )
        .bind(project.project_id.as_str())
        .bind(project.account_id.as_str())
        .bind(project.sandbox.as_ref().map(|s| s.id.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Insert project failed: {e}")))?;
        Ok(())
    }

    /// Insert or replace a thread's project binding.
    pub async fn add_thread(
        &self,
        thread_id: &ThreadId,
        project_id: &ProjectId,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO threads (thread_id, project_id) VALUES (?1, ?2)")
            .bind(thread_id.as_str())
            .bind(project_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Insert thread failed: {e}")))?;
        Ok(())
    }

    /// All messages of a thread in log order.
    pub async fn messages(&self, thread_id: &ThreadId) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, thread_id, type, content, is_json, created_at FROM messages \
             WHERE thread_id = ?1 ORDER BY created_at ASC, seq ASC",
        )
        .bind(thread_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("List messages failed: {e}")))?;

        rows.iter().map(row_to_message).collect()
    }
}

#[async_trait]
impl SessionLog for SqliteSessionStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn latest_message(
        &self,
        thread_id: &ThreadId,
        types: &[MessageType],
    ) -> Result<Option<Message>, StoreError> {
        if types.is_empty() {
            return Ok(None);
        }

        let placeholders = (0..types.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT id, thread_id, type, content, is_json, created_at FROM messages \
             WHERE thread_id = ?1 AND type IN ({placeholders}) \
             ORDER BY created_at DESC, seq DESC LIMIT 1"
        );

        let mut query = sqlx::query(&sql).bind(thread_id.as_str());
        for t in types {
            query = query.bind(t.as_str());
        }

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Latest message query failed: {e}")))?;

        row.as_ref().map(row_to_message).transpose()
    }
}

#[async_trait]
impl SessionWriter for SqliteSessionStore {
    async fn append(&self, message: Message) -> Result<(), StoreError> {
        let (content, is_json) = match &message.content {
            serde_json::Value::String(s) => (s.clone(), false),
            other => (other.to_string(), true),
        };

        sqlx::query(
            "INSERT INTO messages (id, thread_id, type, content, is_json, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&message.id)
        .bind(message.thread_id.as_str())
        .bind(message.message_type.as_str())
        .bind(&content)
        .bind(i64::from(is_json))
        .bind(message.created_at.timestamp_micros())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Append failed: {e}")))?;

        debug!(id = %message.id, thread_id = %message.thread_id, "Appended message");
        Ok(())
    }
}

#[async_trait]
impl SessionResolver for SqliteSessionStore {
    async fn account_for_thread(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Option<AccountId>, StoreError> {
        let row = sqlx::query(
            "SELECT p.account_id FROM threads t \
             JOIN projects p ON p.project_id = t.project_id \
             WHERE t.thread_id = ?1",
        )
        .bind(thread_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Account lookup failed: {e}")))?;

        row.map(|r| {
            r.try_get::<String, _>("account_id")
                .map(AccountId::from)
                .map_err(|e| StoreError::QueryFailed(e.to_string()))
        })
        .transpose()
    }

    async fn project(&self, project_id: &ProjectId) -> Result<Option<Project>, StoreError> {
        let row = sqlx::query(
            "SELECT project_id, account_id, sandbox_id FROM projects WHERE project_id = ?1",
        )
        .bind(project_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Project lookup failed: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let project_id: String = row
            .try_get("project_id")
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        let account_id: String = row
            .try_get("account_id")
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        let sandbox_id: Option<String> = row
            .try_get("sandbox_id")
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        Ok(Some(Project {
            project_id: ProjectId::from(project_id),
            account_id: AccountId::from(account_id),
            sandbox: sandbox_id.map(|id| SandboxInfo { id }),
        }))
    }
}

fn row_to_message(row: &SqliteRow) -> Result<Message, StoreError> {
    let id: String = row
        .try_get("id")
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
    let thread_id: String = row
        .try_get("thread_id")
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
    let type_str: String = row
        .try_get("type")
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
    let content: String = row
        .try_get("content")
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
    let is_json: i64 = row
        .try_get("is_json")
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
    let created_us: i64 = row
        .try_get("created_at")
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

    let message_type = MessageType::parse(&type_str)
        .ok_or_else(|| StoreError::QueryFailed(format!("Unknown message type: {type_str}")))?;
    let content = if is_json != 0 {
        serde_json::from_str(&content)
            .map_err(|e| StoreError::QueryFailed(format!("Corrupt JSON content in {id}: {e}")))?
    } else {
        serde_json::Value::String(content)
    };
    let created_at = DateTime::<Utc>::from_timestamp_micros(created_us)
        .ok_or_else(|| StoreError::QueryFailed(format!("Bad timestamp {created_us} in {id}")))?;

    Ok(Message {
        id,
        thread_id: ThreadId::from(thread_id),
        message_type,
        content,
        created_at,
    })
}

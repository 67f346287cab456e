//! Shared test helpers for loop tests.

use crate::setup::PreparedSession;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use turnstile_core::error::GateError;
use turnstile_core::{
    AccountId, AdmissionGate, Capabilities, Chunk, ExecutorError, Project, ProjectId,
    QuotaDecision, SandboxInfo, Subscription, ThreadId, TurnConfig, TurnExecutor,
};

pub fn thread_id() -> ThreadId {
    ThreadId::from("thread-1")
}

pub fn prepared_session() -> PreparedSession {
    PreparedSession {
        thread_id: thread_id(),
        account_id: AccountId::from("acct-1"),
        project: Project {
            project_id: ProjectId::from("proj-1"),
            account_id: AccountId::from("acct-1"),
            sandbox: Some(SandboxInfo { id: "sb-1".into() }),
        },
        capabilities: Capabilities::default(),
    }
}

fn free_tier() -> Subscription {
    Subscription {
        tier: "free".into(),
        usage_minutes: 0.0,
        limit_minutes: Some(60.0),
    }
}

/// A gate that allows until the `deny_from`-th check (1-based), then denies.
pub struct ScriptedGate {
    deny_from: Option<usize>,
    reason: String,
    fail: bool,
    calls: AtomicUsize,
}

impl ScriptedGate {
    pub fn always_allow() -> Self {
        Self {
            deny_from: None,
            reason: String::new(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn deny_from(check: usize, reason: &str) -> Self {
        Self {
            deny_from: Some(check),
            reason: reason.into(),
            ..Self::always_allow()
        }
    }

    /// A gate whose backend is unreachable.
    pub fn failing(reason: &str) -> Self {
        Self {
            reason: reason.into(),
            fail: true,
            ..Self::always_allow()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdmissionGate for ScriptedGate {
    async fn check_quota(&self, _account_id: &AccountId) -> Result<QuotaDecision, GateError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(GateError::Unavailable(self.reason.clone()));
        }
        match self.deny_from {
            Some(k) if call >= k => Ok(QuotaDecision::deny(self.reason.clone(), free_tier())),
            _ => Ok(QuotaDecision::allow("OK", free_tier())),
        }
    }
}

/// An executor that plays scripted turns and records every config it gets.
///
/// Turns past the end of the script repeat a single plain assistant chunk.
pub struct RecordingExecutor {
    turns: Vec<Result<Vec<Chunk>, ExecutorError>>,
    configs: Mutex<Vec<TurnConfig>>,
}

impl RecordingExecutor {
    pub fn new(turns: Vec<Result<Vec<Chunk>, ExecutorError>>) -> Self {
        Self {
            turns,
            configs: Mutex::new(Vec::new()),
        }
    }

    /// Every turn streams one assistant chunk without a stop signal.
    pub fn plain() -> Self {
        Self::new(vec![])
    }

    pub fn configs(&self) -> Vec<TurnConfig> {
        self.configs.lock().unwrap().clone()
    }

    pub fn turns_started(&self) -> usize {
        self.configs.lock().unwrap().len()
    }
}

#[async_trait]
impl TurnExecutor for RecordingExecutor {
    fn name(&self) -> &str {
        "recording"
    }

    async fn run_turn(&self, config: TurnConfig) -> Result<mpsc::Receiver<Chunk>, ExecutorError> {
        let index = {
            let mut configs = self.configs.lock().unwrap();
            configs.push(config);
            configs.len() - 1
        };

        let chunks = match self.turns.get(index) {
            Some(Ok(chunks)) => chunks.clone(),
            Some(Err(e)) => return Err(e.clone()),
            None => vec![Chunk::assistant_text("Still working...")],
        };

        let (tx, rx) = mpsc::channel(1);
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

/// Drain a receiver into a vector.
pub async fn collect(mut rx: mpsc::Receiver<Chunk>) -> Vec<Chunk> {
    let mut out = Vec::new();
    while let Some(chunk) = rx.recv().await {
        out.push(chunk);
    }
    out
}

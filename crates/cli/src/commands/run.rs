//! `turnstile run` — Drive one thread against a replay script.
//!
//! Chunks go to stdout as JSON lines; the final report goes to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use turnstile_agent::loop_runner::OUTPUT_CHANNEL_CAPACITY;
use turnstile_agent::{
    IterationLoop, LoopSettings, ReplayExecutor, ReplayScript, SessionSetup,
};
use turnstile_billing::QuotaLedger;
use turnstile_config::AppConfig;
use turnstile_core::{ProjectId, ThreadId};
use turnstile_store::{InMemorySessionStore, SessionSeed};

pub struct RunArgs {
    pub log: PathBuf,
    pub script: PathBuf,
    pub thread: Option<String>,
    pub project: Option<String>,
    pub max_iterations: Option<u32>,
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let seed = SessionSeed::load(&args.log)?;
    let store = Arc::new(InMemorySessionStore::new());
    store.seed(&seed).await?;

    let thread_id = args
        .thread
        .map(ThreadId::from)
        .unwrap_or_else(|| seed.thread_id.clone());
    let project_id = args
        .project
        .map(ProjectId::from)
        .unwrap_or_else(|| seed.project.project_id.clone());

    let script = ReplayScript::load(&args.script)?;
    let executor = ReplayExecutor::new(script).with_writer(store.clone());

    let session = SessionSetup::new(store.clone())
        .with_capabilities(config.capabilities())
        .prepare(thread_id, &project_id)
        .await
        .map_err(|e| format!("Failed to prepare session: {e}"))?;

    let mut settings = LoopSettings::from_config(&config);
    if let Some(max) = args.max_iterations {
        if max == 0 {
            return Err("--max-iterations must be at least 1".into());
        }
        settings.max_iterations = max;
    }

    let runner = IterationLoop::new(
        Arc::new(QuotaLedger::from_config(&config.billing)),
        store,
        Arc::new(executor),
    )
    .with_settings(settings);

    let (tx, mut rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
    let handle = tokio::spawn(async move { runner.run(&session, &tx).await });

    while let Some(chunk) = rx.recv().await {
        println!("{}", serde_json::to_string(&chunk)?);
    }

    let report = handle.await?;
    eprintln!("{}", serde_json::to_string(&report)?);

    Ok(())
}

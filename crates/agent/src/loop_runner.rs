//! The iteration loop: gate, check, enrich, execute, detect, repeat.
//!
//! Each iteration walks the same states in order:
//!
//! 1. **Check quota** with the admission gate (never cached)
//! 2. **Check the last message**; an assistant reply means nothing is left to do
//! 3. **Enrich** with the latest environment observation (best-effort)
//! 4. **Execute** one turn and stream its chunks out unmodified
//! 5. **Evaluate** the completion signal and the iteration bound
//!
//! The loop never appends to the session log. Whatever the executor and
//! its tools persist is what the next iteration reads.

use crate::detector::CompletionDetector;
use crate::enricher::ContextEnricher;
use crate::setup::PreparedSession;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use turnstile_config::{AppConfig, model_max_tokens};
use turnstile_core::executor::ProcessorPolicy;
use turnstile_core::{
    AdmissionGate, Chunk, ContextMessage, DomainEvent, EventBus, MessageType, QuotaDecision,
    SessionLog, StopSignal, Subscription, ThreadId, TurnConfig, TurnExecutor,
};

/// Capacity of the chunk channel handed back by [`IterationLoop::run_stream`].
pub const OUTPUT_CHANNEL_CAPACITY: usize = 128;

/// Knobs that shape every turn of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub model: String,
    pub temperature: f32,
    /// Explicit max tokens; `None` falls back to the per-model default
    pub max_tokens: Option<u32>,
    pub max_iterations: u32,
    pub native_max_auto_continues: u32,
    pub enable_thinking: bool,
    pub reasoning_effort: String,
    pub enable_context_manager: bool,
    pub stream: bool,
    /// Forward the observation context message to the executor
    pub inject_observation: bool,
}

impl LoopSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_iterations: config.agent.max_iterations,
            native_max_auto_continues: config.agent.native_max_auto_continues,
            enable_thinking: config.agent.enable_thinking,
            reasoning_effort: config.agent.reasoning_effort.clone(),
            enable_context_manager: config.agent.enable_context_manager,
            stream: config.agent.stream,
            inject_observation: config.agent.inject_observation,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoopOutcome {
    /// The admission gate refused a turn
    QuotaDenied { reason: String },
    /// The last conversation message was already an assistant reply
    AlreadyAnswered,
    /// The agent asked the user something or declared the task done
    Completed { signal: StopSignal },
    /// `max_iterations` turns ran without a stop signal
    MaxIterations,
    /// The executor failed to start a turn
    ExecutorError { message: String },
    /// The session log could not be read
    StoreError { message: String },
    /// The consumer went away
    Disconnected,
}

impl LoopOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuotaDenied { .. } => "stopped_quota",
            Self::AlreadyAnswered => "stopped_already_answered",
            Self::Completed { .. } => "stopped_complete",
            Self::MaxIterations => "stopped_max_iterations",
            Self::ExecutorError { .. } => "stopped_executor_error",
            Self::StoreError { .. } => "stopped_store_error",
            Self::Disconnected => "stopped_disconnected",
        }
    }
}

impl std::fmt::Display for LoopOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopReport {
    pub outcome: LoopOutcome,
    /// Turns whose stream was started
    pub turns_executed: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_signal: Option<StopSignal>,
}

/// Drives turns for one session until a terminal condition fires.
#[derive(Clone)]
pub struct IterationLoop {
    gate: Arc<dyn AdmissionGate>,
    log: Arc<dyn SessionLog>,
    executor: Arc<dyn TurnExecutor>,
    settings: LoopSettings,
    event_bus: Option<Arc<EventBus>>,
}

impl IterationLoop {
    pub fn new(
        gate: Arc<dyn AdmissionGate>,
        log: Arc<dyn SessionLog>,
        executor: Arc<dyn TurnExecutor>,
    ) -> Self {
        Self {
            gate,
            log,
            executor,
            settings: LoopSettings::default(),
            event_bus: None,
        }
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.settings.max_iterations = max;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.settings.model = model.into();
        self
    }

    pub fn with_inject_observation(mut self, inject: bool) -> Self {
        self.settings.inject_observation = inject;
        self
    }

    /// Attach an event bus for publishing domain events.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut LoopSettings {
        &mut self.settings
    }

    /// Run the loop on a background task and stream its output.
    ///
    /// Returns a receiver that yields executor chunks in order, followed by
    /// at most one synthetic status chunk. The channel closes when the run
    /// ends. Dropping the receiver ends the run after the current turn.
    pub fn run_stream(&self, session: PreparedSession) -> mpsc::Receiver<Chunk> {
        let (tx, rx) = mpsc::channel::<Chunk>(OUTPUT_CHANNEL_CAPACITY);
        let runner = self.clone();

        tokio::spawn(async move {
            let report = runner.run(&session, &tx).await;
            debug!(
                thread_id = %session.thread_id,
                outcome = %report.outcome,
                turns = report.turns_executed,
                "Streamed run finished"
            );
        });

        rx
    }

    /// Run the loop to completion, sending every chunk into `tx`.
    pub async fn run(&self, session: &PreparedSession, tx: &mpsc::Sender<Chunk>) -> LoopReport {
        let thread_id = &session.thread_id;
        let max_iterations = self.settings.max_iterations;
        let mut detector = CompletionDetector::new();
        let mut turns_executed = 0u32;
        let mut connected = true;

        info!(
            thread_id = %thread_id,
            max_iterations,
            executor = self.executor.name(),
            "Starting run"
        );

        for iteration in 1..=max_iterations {
            if tx.is_closed() {
                return self.finish(thread_id, LoopOutcome::Disconnected, turns_executed, None);
            }

            // ── Check quota ──
            let decision = self.admission(session).await;
            if !decision.allowed {
                info!(thread_id = %thread_id, iteration, reason = %decision.reason, "Admission denied");
                self.publish(DomainEvent::AdmissionDenied {
                    thread_id: thread_id.to_string(),
                    reason: decision.reason.clone(),
                    timestamp: Utc::now(),
                });
                let _ = tx
                    .send(Chunk::stopped(format!(
                        "Billing limit reached: {}",
                        decision.reason
                    )))
                    .await;
                return self.finish(
                    thread_id,
                    LoopOutcome::QuotaDenied {
                        reason: decision.reason,
                    },
                    turns_executed,
                    None,
                );
            }

            // ── Check last message ──
            match self.log.last_conversation_message(thread_id).await {
                Ok(Some(last)) if last.message_type == MessageType::Assistant => {
                    info!(thread_id = %thread_id, iteration, "Last message is from the assistant, nothing to do");
                    return self.finish(
                        thread_id,
                        LoopOutcome::AlreadyAnswered,
                        turns_executed,
                        None,
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(thread_id = %thread_id, iteration, error = %e, "Session log unreadable");
                    let message = e.to_string();
                    let _ = tx.send(Chunk::status("error", message.clone())).await;
                    return self.finish(
                        thread_id,
                        LoopOutcome::StoreError { message },
                        turns_executed,
                        None,
                    );
                }
            }

            // ── Enrich ──
            let context = self.enrich(thread_id).await;
            let transient = if self.settings.inject_observation {
                context
            } else {
                if context.is_some() {
                    debug!(thread_id = %thread_id, "Observation context built but not forwarded");
                }
                None
            };

            // ── Execute ──
            let config = self.turn_config(session, iteration, transient);
            self.publish(DomainEvent::TurnStarted {
                thread_id: thread_id.to_string(),
                iteration,
                timestamp: Utc::now(),
            });
            debug!(thread_id = %thread_id, iteration, model = %config.model, "Starting turn");

            let mut stream = match self.executor.run_turn(config).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(thread_id = %thread_id, iteration, error = %e, "Turn failed to start");
                    let _ = tx.send(e.to_chunk()).await;
                    return self.finish(
                        thread_id,
                        LoopOutcome::ExecutorError { message: e.message },
                        turns_executed,
                        None,
                    );
                }
            };
            turns_executed += 1;

            // ── Stream and detect ──
            detector.reset();
            let mut chunks = 0usize;
            while let Some(chunk) = stream.recv().await {
                detector.observe(&chunk);
                chunks += 1;
                if connected && tx.send(chunk).await.is_err() {
                    // Keep draining so the turn finishes on the executor side
                    debug!(thread_id = %thread_id, iteration, "Consumer dropped mid-turn");
                    connected = false;
                }
            }

            let signal = detector.decision();
            self.publish(DomainEvent::TurnCompleted {
                thread_id: thread_id.to_string(),
                iteration,
                chunks,
                stop_signal: signal.map(|s| s.to_string()),
                timestamp: Utc::now(),
            });
            debug!(thread_id = %thread_id, iteration, chunks, stop = ?signal, "Turn finished");

            // ── Evaluate ──
            if let Some(signal) = signal {
                return self.finish(
                    thread_id,
                    LoopOutcome::Completed { signal },
                    turns_executed,
                    Some(signal),
                );
            }
            if !connected {
                return self.finish(thread_id, LoopOutcome::Disconnected, turns_executed, None);
            }
        }

        self.finish(thread_id, LoopOutcome::MaxIterations, turns_executed, None)
    }

    async fn admission(&self, session: &PreparedSession) -> QuotaDecision {
        match self.gate.check_quota(&session.account_id).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(account_id = %session.account_id, error = %e, "Admission gate failed, denying");
                QuotaDecision::deny(
                    e.to_string(),
                    Subscription {
                        tier: "unknown".into(),
                        usage_minutes: 0.0,
                        limit_minutes: None,
                    },
                )
            }
        }
    }

    async fn enrich(&self, thread_id: &ThreadId) -> Option<ContextMessage> {
        let observation = match self.log.latest_observation(thread_id).await {
            Ok(Some(observation)) => observation,
            Ok(None) => return None,
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "Could not read observation, skipping enrichment");
                return None;
            }
        };

        match ContextEnricher::build(&observation) {
            Ok(context) => context,
            Err(e) => {
                warn!(thread_id = %thread_id, message_id = %observation.id, error = %e, "Skipping enrichment");
                None
            }
        }
    }

    /// The executor configuration for one turn.
    pub fn turn_config(
        &self,
        session: &PreparedSession,
        iteration: u32,
        transient_message: Option<ContextMessage>,
    ) -> TurnConfig {
        let s = &self.settings;
        TurnConfig {
            thread_id: session.thread_id.clone(),
            iteration,
            model: s.model.clone(),
            temperature: s.temperature,
            max_tokens: s.max_tokens.or_else(|| model_max_tokens(&s.model)),
            stream: s.stream,
            tool_choice: "auto".into(),
            max_xml_tool_calls: 1,
            include_xml_examples: true,
            processor: ProcessorPolicy::default(),
            native_max_auto_continues: s.native_max_auto_continues,
            enable_thinking: s.enable_thinking,
            reasoning_effort: s.reasoning_effort.clone(),
            enable_context_manager: s.enable_context_manager,
            capabilities: session.capabilities,
            transient_message,
        }
    }

    fn finish(
        &self,
        thread_id: &ThreadId,
        outcome: LoopOutcome,
        turns_executed: u32,
        stop_signal: Option<StopSignal>,
    ) -> LoopReport {
        info!(thread_id = %thread_id, outcome = %outcome, turns_executed, "Run stopped");
        self.publish(DomainEvent::LoopStopped {
            thread_id: thread_id.to_string(),
            outcome: outcome.as_str().into(),
            turns_executed,
            timestamp: Utc::now(),
        });
        LoopReport {
            outcome,
            turns_executed,
            stop_signal,
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

//! # Turnstile Core
//!
//! Domain types, traits, and error definitions for the Turnstile
//! agent-turn controller. This crate has **no web or storage dependencies**;
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the controller is a trait here: the session log,
//! session resolution, the admission gate and the turn executor.
//! Implementations live in their respective crates, so the loop can be
//! driven by in-memory fakes in tests and by real backends in production.

pub mod capability;
pub mod chunk;
pub mod error;
pub mod event;
pub mod executor;
pub mod message;
pub mod quota;
pub mod session;

// Re-export key types at crate root for ergonomics
pub use capability::Capabilities;
pub use chunk::{Chunk, StopSignal};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use executor::{ContentPart, ContextMessage, ExecutorError, TurnConfig, TurnExecutor};
pub use message::{AccountId, Message, MessageType, ProjectId, ThreadId};
pub use quota::{AdmissionGate, QuotaDecision, Subscription};
pub use session::{Project, SandboxInfo, SessionLog, SessionResolver, SessionWriter};

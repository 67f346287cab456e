//! Session store implementations for Turnstile.
//!
//! Both stores implement the read side the controller uses
//! ([`SessionLog`], [`SessionResolver`]) and the append side executors use
//! ([`SessionWriter`]).
//!
//! [`SessionLog`]: turnstile_core::SessionLog
//! [`SessionResolver`]: turnstile_core::SessionResolver
//! [`SessionWriter`]: turnstile_core::SessionWriter

pub mod in_memory;
pub mod seed;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemorySessionStore;
pub use seed::{SeedMessage, SessionSeed};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSessionStore;

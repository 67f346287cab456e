//! The iteration loop at the heart of Turnstile.
//!
//! A run drives one thread through repeated agent turns:
//!
//! 1. **Gate** every turn on the account's quota
//! 2. **Stop early** if the thread already ends in an assistant reply
//! 3. **Enrich** the turn with the latest environment observation
//! 4. **Execute** the turn and stream its chunks out in order
//! 5. **Detect** `ask`/`complete` signals and stop when one appears
//!
//! The run also ends after `max_iterations` turns.

pub mod detector;
pub mod enricher;
pub mod loop_runner;
pub mod replay;
pub mod setup;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use detector::CompletionDetector;
pub use enricher::ContextEnricher;
pub use loop_runner::{IterationLoop, LoopOutcome, LoopReport, LoopSettings};
pub use replay::{ReplayExecutor, ReplayScript};
pub use setup::{PreparedSession, SessionSetup};

//! Usage ledger and subscription tiers for Turnstile.
//!
//! The ledger is the write side of account usage. The controller only
//! reaches it through `AdmissionGate::check_quota`, which derives a fresh
//! decision every time it is called.

pub mod ledger;

pub use ledger::{QuotaLedger, Tier};

/// Errors from the billing subsystem.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("unknown tier: {0}")]
    UnknownTier(String),

    #[error("usage must be non-negative, got {0}")]
    NegativeUsage(f64),
}

//! Admission gate — the per-turn usage/quota precondition.
//!
//! Account usage is owned by an external billing subsystem. The controller
//! only ever sees the derived decision below, fetched fresh before every
//! turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GateError;
use crate::message::AccountId;

/// Subscription information attached to a quota decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Tier name (`free`, `pro`, `enterprise`, `local`)
    pub tier: String,

    /// Usage in the current billing period, in minutes
    #[serde(default)]
    pub usage_minutes: f64,

    /// Limit for the current period; `None` means unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_minutes: Option<f64>,
}

/// The `(allowed, reason, subscription)` triple the loop acts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub reason: String,
    pub subscription: Subscription,
}

impl QuotaDecision {
    pub fn allow(reason: impl Into<String>, subscription: Subscription) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            subscription,
        }
    }

    pub fn deny(reason: impl Into<String>, subscription: Subscription) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            subscription,
        }
    }
}

/// Checks whether an account may start another turn.
///
/// Implementations must not cache: usage can change between turns.
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    async fn check_quota(&self, account_id: &AccountId) -> Result<QuotaDecision, GateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_subscription_omits_limit() {
        let sub = Subscription {
            tier: "enterprise".into(),
            usage_minutes: 12.0,
            limit_minutes: None,
        };
        let json = serde_json::to_string(&sub).unwrap();
        assert!(!json.contains("limit_minutes"));
    }

    #[test]
    fn deny_is_not_allowed() {
        let sub = Subscription {
            tier: "free".into(),
            usage_minutes: 60.0,
            limit_minutes: Some(60.0),
        };
        let decision = QuotaDecision::deny("out of minutes", sub);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "out of minutes");
    }
}

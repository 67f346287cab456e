//! Per-account monthly usage ledger.

use crate::BillingError;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};
use turnstile_config::BillingConfig;
use turnstile_core::error::GateError;
use turnstile_core::{AccountId, AdmissionGate, QuotaDecision, Subscription};

/// Subscription tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(BillingError::UnknownTier(other.to_string())),
        }
    }
}

/// (year, month) of a UTC timestamp.
type Period = (i32, u32);

fn period_of(at: DateTime<Utc>) -> Period {
    (at.year(), at.month())
}

#[derive(Debug, Clone)]
struct AccountRecord {
    tier: Tier,
    usage_minutes: f64,
    period: Period,
}

impl AccountRecord {
    fn new(at: DateTime<Utc>) -> Self {
        Self {
            tier: Tier::Free,
            usage_minutes: 0.0,
            period: period_of(at),
        }
    }

    /// Usage counted against `at`'s month.
    fn usage_in(&self, at: DateTime<Utc>) -> f64 {
        if self.period == period_of(at) {
            self.usage_minutes
        } else {
            0.0
        }
    }

    fn roll_to(&mut self, at: DateTime<Utc>) {
        let period = period_of(at);
        if self.period != period {
            self.period = period;
            self.usage_minutes = 0.0;
        }
    }
}

/// Monthly usage ledger implementing the admission gate.
///
/// Thread-safe via `RwLock`; a poisoned lock is recovered on both reads and
/// writes, since every update leaves the map consistent. Usage resets at the
/// UTC calendar month boundary. Unknown accounts are treated as `free` with
/// no usage.
pub struct QuotaLedger {
    enabled: bool,
    free_minutes: Option<f64>,
    pro_minutes: Option<f64>,
    enterprise_minutes: Option<f64>,
    accounts: RwLock<HashMap<AccountId, AccountRecord>>,
}

impl QuotaLedger {
    pub fn from_config(config: &BillingConfig) -> Self {
        Self {
            enabled: config.enabled,
            free_minutes: Some(config.free_minutes),
            pro_minutes: Some(config.pro_minutes),
            enterprise_minutes: config.enterprise_minutes,
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// A ledger that admits everything (local mode).
    pub fn disabled() -> Self {
        Self::from_config(&BillingConfig {
            enabled: false,
            ..Default::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The monthly limit for a tier; `None` is unlimited.
    pub fn limit_for(&self, tier: Tier) -> Option<f64> {
        match tier {
            Tier::Free => self.free_minutes,
            Tier::Pro => self.pro_minutes,
            Tier::Enterprise => self.enterprise_minutes,
        }
    }

    /// Add minutes to the account's usage for the current month.
    pub fn record_usage(&self, account_id: &AccountId, minutes: f64) -> Result<(), BillingError> {
        self.record_usage_at(account_id, minutes, Utc::now())
    }

    fn record_usage_at(
        &self,
        account_id: &AccountId,
        minutes: f64,
        at: DateTime<Utc>,
    ) -> Result<(), BillingError> {
        if minutes < 0.0 || minutes.is_nan() {
            return Err(BillingError::NegativeUsage(minutes));
        }
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        let record = accounts
            .entry(account_id.clone())
            .or_insert_with(|| AccountRecord::new(at));
        record.roll_to(at);
        record.usage_minutes += minutes;
        debug!(
            account = %account_id,
            minutes,
            total = record.usage_minutes,
            "Recorded usage"
        );
        Ok(())
    }

    pub fn set_tier(&self, account_id: &AccountId, tier: Tier) {
        let now = Utc::now();
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        accounts
            .entry(account_id.clone())
            .or_insert_with(|| AccountRecord::new(now))
            .tier = tier;
        info!(account = %account_id, tier = tier.as_str(), "Subscription tier set");
    }

    /// The quota decision for `account_id` as of `at`.
    fn decide_at(
        &self,
        account_id: &AccountId,
        at: DateTime<Utc>,
    ) -> Result<QuotaDecision, GateError> {
        if !self.enabled {
            return Ok(QuotaDecision::allow(
                "Billing disabled",
                Subscription {
                    tier: "local".into(),
                    usage_minutes: 0.0,
                    limit_minutes: None,
                },
            ));
        }

        let (tier, usage) = {
            let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
            accounts
                .get(account_id)
                .map(|r| (r.tier, r.usage_in(at)))
                .unwrap_or((Tier::Free, 0.0))
        };

        let limit = self.limit_for(tier);
        let subscription = Subscription {
            tier: tier.as_str().into(),
            usage_minutes: usage,
            limit_minutes: limit,
        };

        match limit {
            Some(limit) if usage >= limit => Ok(QuotaDecision::deny(
                format!(
                    "Monthly limit of {limit} minutes reached. Current usage: {usage:.1} minutes."
                ),
                subscription,
            )),
            _ => Ok(QuotaDecision::allow("OK", subscription)),
        }
    }
}

#[async_trait]
impl AdmissionGate for QuotaLedger {
    async fn check_quota(&self, account_id: &AccountId) -> Result<QuotaDecision, GateError> {
        self.decide_at(account_id, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ledger() -> QuotaLedger {
        QuotaLedger::from_config(&BillingConfig::default())
    }

    fn acct() -> AccountId {
        AccountId::from("acct-1")
    }

    #[tokio::test]
    async fn poisoned_lock_keeps_serving_decisions() {
        let ledger = std::sync::Arc::new(ledger());
        ledger.record_usage(&acct(), 10.0).unwrap();

        let poisoner = ledger.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.accounts.write().unwrap();
            panic!("poison the ledger");
        })
        .join();
        assert!(ledger.accounts.is_poisoned());

        let decision = ledger.check_quota(&acct()).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.subscription.usage_minutes, 10.0);

        ledger.record_usage(&acct(), 55.0).unwrap();
        let decision = ledger.check_quota(&acct()).await.unwrap();
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn unknown_account_is_free_with_no_usage() {
        let decision = ledger().check_quota(&acct()).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reason, "OK");
        assert_eq!(decision.subscription.tier, "free");
        assert_eq!(decision.subscription.usage_minutes, 0.0);
        assert_eq!(decision.subscription.limit_minutes, Some(60.0));
    }

    #[tokio::test]
    async fn exhausted_free_tier_is_denied() {
        let ledger = ledger();
        ledger.record_usage(&acct(), 60.0).unwrap();
        let decision = ledger.check_quota(&acct()).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(
            decision.reason,
            "Monthly limit of 60 minutes reached. Current usage: 60.0 minutes."
        );
    }

    #[tokio::test]
    async fn upgrading_tier_readmits() {
        let ledger = ledger();
        ledger.record_usage(&acct(), 75.5).unwrap();
        assert!(!ledger.check_quota(&acct()).await.unwrap().allowed);

        ledger.set_tier(&acct(), Tier::Pro);
        let decision = ledger.check_quota(&acct()).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.subscription.tier, "pro");
        assert_eq!(decision.subscription.usage_minutes, 75.5);
    }

    #[tokio::test]
    async fn enterprise_is_unlimited_by_default() {
        let ledger = ledger();
        ledger.set_tier(&acct(), Tier::Enterprise);
        ledger.record_usage(&acct(), 1_000_000.0).unwrap();
        let decision = ledger.check_quota(&acct()).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.subscription.limit_minutes, None);
    }

    #[tokio::test]
    async fn disabled_billing_admits_everything() {
        let ledger = QuotaLedger::disabled();
        ledger.record_usage(&acct(), 10_000.0).unwrap();
        let decision = ledger.check_quota(&acct()).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reason, "Billing disabled");
        assert_eq!(decision.subscription.tier, "local");
    }

    #[test]
    fn usage_resets_at_month_rollover() {
        let ledger = ledger();
        let march = Utc.with_ymd_and_hms(2026, 3, 31, 23, 0, 0).unwrap();
        let april = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 1).unwrap();

        ledger.record_usage_at(&acct(), 60.0, march).unwrap();
        assert!(!ledger.decide_at(&acct(), march).unwrap().allowed);

        let decision = ledger.decide_at(&acct(), april).unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.subscription.usage_minutes, 0.0);

        ledger.record_usage_at(&acct(), 5.0, april).unwrap();
        let decision = ledger.decide_at(&acct(), april).unwrap();
        assert_eq!(decision.subscription.usage_minutes, 5.0);
    }

    #[test]
    fn negative_usage_rejected() {
        assert!(matches!(
            ledger().record_usage(&acct(), -1.0),
            Err(BillingError::NegativeUsage(_))
        ));
    }

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!("PRO".parse::<Tier>().unwrap(), Tier::Pro);
        assert!("gold".parse::<Tier>().is_err());
    }
}

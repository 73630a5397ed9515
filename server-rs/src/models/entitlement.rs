use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::product::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Inactive,
    Active,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Active => "active",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(SubscriptionStatus::Inactive),
            "active" => Ok(SubscriptionStatus::Active),
            other => Err(AppError::Internal(format!("Unknown status '{other}'"))),
        }
    }
}

/// Position in the `status × isFrozen` state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementPhase {
    Inactive,
    Active,
    ActiveFrozen,
}

/// Freeze tokens and days granted for one allowance cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreezeAllowance {
    pub tokens: u32,
    pub days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreezeState {
    pub tokens_total: u32,
    pub tokens_used: u32,
    pub days_total: u32,
    pub days_used: u32,
    pub is_frozen: bool,
    pub frozen_at: Option<DateTime<Utc>>,
    pub frozen_until: Option<DateTime<Utc>>,
}

impl FreezeState {
    pub fn from_allowance(allowance: FreezeAllowance) -> Self {
        Self {
            tokens_total: allowance.tokens,
            days_total: allowance.days,
            ..Self::default()
        }
    }

    pub fn tokens_remaining(&self) -> u32 {
        self.tokens_total.saturating_sub(self.tokens_used)
    }

    pub fn days_remaining(&self) -> u32 {
        self.days_total.saturating_sub(self.days_used)
    }
}

/// One subscriber's entitlement. `version` increments on every write and is
/// the compare-and-swap token for concurrent transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberEntitlement {
    pub user_id: Uuid,
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub duration_months: u32,
    pub price_paid_cents: i64,
    pub months_purchased_total: u32,
    pub freeze: FreezeState,
    pub payment_method_linked: bool,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl SubscriberEntitlement {
    pub fn new_inactive(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            tier: Tier::Free,
            status: SubscriptionStatus::Inactive,
            expires_at: None,
            duration_months: 0,
            price_paid_cents: 0,
            months_purchased_total: 0,
            freeze: FreezeState::default(),
            payment_method_linked: false,
            version: 0,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    pub fn is_frozen(&self) -> bool {
        self.freeze.is_frozen
    }

    pub fn phase(&self) -> EntitlementPhase {
        match (self.status, self.freeze.is_frozen) {
            (SubscriptionStatus::Inactive, _) => EntitlementPhase::Inactive,
            (SubscriptionStatus::Active, false) => EntitlementPhase::Active,
            (SubscriptionStatus::Active, true) => EntitlementPhase::ActiveFrozen,
        }
    }

    /// Returns the first violated record invariant, if any.
    pub fn invariant_violation(&self) -> Option<&'static str> {
        if self.freeze.tokens_used > self.freeze.tokens_total {
            return Some("tokens_used exceeds tokens_total");
        }
        if self.freeze.days_used > self.freeze.days_total {
            return Some("days_used exceeds days_total");
        }
        if self.freeze.is_frozen && self.freeze.frozen_at.is_none() {
            return Some("frozen without frozen_at");
        }
        if self.freeze.is_frozen && !self.is_active() {
            return Some("frozen while inactive");
        }
        if self.is_active() && self.expires_at.is_none() {
            return Some("active without expires_at");
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreezeCloseReason {
    ManualUnfreeze,
    DaysExhausted,
    Admin,
}

impl FreezeCloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FreezeCloseReason::ManualUnfreeze => "manual_unfreeze",
            FreezeCloseReason::DaysExhausted => "days_exhausted",
            FreezeCloseReason::Admin => "admin",
        }
    }
}

impl fmt::Display for FreezeCloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FreezeCloseReason {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual_unfreeze" => Ok(FreezeCloseReason::ManualUnfreeze),
            "days_exhausted" => Ok(FreezeCloseReason::DaysExhausted),
            "admin" => Ok(FreezeCloseReason::Admin),
            other => Err(AppError::Internal(format!("Unknown freeze reason '{other}'"))),
        }
    }
}

/// Append-only freeze history. `ended_at` is `None` while the freeze is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreezeRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub days_used: Option<u32>,
    pub reason: Option<FreezeCloseReason>,
}

impl FreezeRecord {
    pub fn open(user_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            started_at,
            ended_at: None,
            days_used: None,
            reason: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Freeze-history write that must land atomically with the entitlement write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreezeRecordChange {
    Open(FreezeRecord),
    Close {
        ended_at: DateTime<Utc>,
        days_used: u32,
        reason: FreezeCloseReason,
    },
}

/// Extra writes that accompany one entitlement save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveEffects {
    pub freeze: Option<FreezeRecordChange>,
    pub payment_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    VersionConflict,
    DuplicatePayment,
}

/// How an upgrade converted leftover time into bonus days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proration {
    pub remaining_days: i64,
    pub old_price_cents: i64,
    pub old_duration_months: u32,
    pub new_price_cents: i64,
    pub new_duration_months: u32,
    pub bonus_days: i64,
}

/// Result of an entitlement-changing operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub entitlement: SubscriberEntitlement,
    pub proration: Option<Proration>,
    /// True when the payment reference had already been applied and nothing changed.
    pub duplicate: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Unfreeze {
    pub entitlement: SubscriberEntitlement,
    pub charged_days: u32,
    pub reason: FreezeCloseReason,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodRequest {
    pub linked: bool,
}

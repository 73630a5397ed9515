use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    ReferralSignup,
    ReferralPurchase,
    Cashback,
    Achievement,
    ManualAdjustment,
    Redemption,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::ReferralSignup => "referral_signup",
            TransactionKind::ReferralPurchase => "referral_purchase",
            TransactionKind::Cashback => "cashback",
            TransactionKind::Achievement => "achievement",
            TransactionKind::ManualAdjustment => "manual_adjustment",
            TransactionKind::Redemption => "redemption",
        }
    }

    pub fn counts_as_referral(&self) -> bool {
        matches!(
            self,
            TransactionKind::ReferralSignup | TransactionKind::ReferralPurchase
        )
    }

    pub fn counts_as_cashback(&self) -> bool {
        matches!(self, TransactionKind::Cashback)
    }
}

impl FromStr for TransactionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "referral_signup" => Ok(TransactionKind::ReferralSignup),
            "referral_purchase" => Ok(TransactionKind::ReferralPurchase),
            "cashback" => Ok(TransactionKind::Cashback),
            "achievement" => Ok(TransactionKind::Achievement),
            "manual_adjustment" => Ok(TransactionKind::ManualAdjustment),
            "redemption" => Ok(TransactionKind::Redemption),
            other => Err(AppError::Internal(format!("Unknown transaction kind '{other}'"))),
        }
    }
}

/// Per-user account row. `balance` is a cache of the ledger sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusAccount {
    pub user_id: Uuid,
    pub balance: i64,
    pub lifetime_referral: i64,
    pub lifetime_cashback: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BonusAccount {
    pub fn new(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: 0,
            lifetime_referral: 0,
            lifetime_cashback: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies an appended entry to the cached totals.
    pub fn apply(&mut self, amount: i64, kind: TransactionKind, at: DateTime<Utc>) {
        self.balance += amount;
        if amount > 0 && kind.counts_as_referral() {
            self.lifetime_referral += amount;
        }
        if amount > 0 && kind.counts_as_cashback() {
            self.lifetime_cashback += amount;
        }
        self.updated_at = at;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub kind: TransactionKind,
    pub balance_after: i64,
    pub related_entity_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A ledger entry waiting to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub amount: i64,
    pub kind: TransactionKind,
    pub related_entity_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended(BonusTransaction),
    /// The idempotency key was already used; nothing was written.
    Duplicate { balance: i64 },
    /// The entry would take the balance below zero; nothing was written.
    Insufficient { balance: i64 },
}

/// What a ledger write did, as seen by the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReceipt {
    pub applied: bool,
    pub balance: i64,
    pub transaction: Option<BonusTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelThreshold {
    pub name: String,
    pub threshold: i64,
    /// Reward rate for this level in basis points.
    #[serde(default)]
    pub rate_bps: u32,
}

/// Ordered threshold table mapping a lifetime total to a named level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelTable {
    levels: Vec<LevelThreshold>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    pub total: i64,
    pub current_level: String,
    pub next_level: Option<String>,
    pub next_threshold: Option<i64>,
    pub rate_bps: u32,
    pub fraction: f64,
}

impl LevelTable {
    pub fn new(levels: Vec<LevelThreshold>) -> Result<Self, AppError> {
        let table = Self { levels };
        table.validate()?;
        Ok(table)
    }

    /// For built-in tables; callers validate the finished config.
    pub(crate) fn new_unchecked(levels: Vec<LevelThreshold>) -> Self {
        Self { levels }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let first = self
            .levels
            .first()
            .ok_or_else(|| AppError::Internal("Level table is empty".into()))?;
        if first.threshold != 0 {
            return Err(AppError::Internal(format!(
                "Level table must start at 0, starts at {}",
                first.threshold
            )));
        }
        for pair in self.levels.windows(2) {
            if pair[1].threshold <= pair[0].threshold {
                return Err(AppError::Internal(format!(
                    "Level thresholds must be strictly ascending ({} after {})",
                    pair[1].threshold, pair[0].threshold
                )));
            }
        }
        Ok(())
    }

    pub fn levels(&self) -> &[LevelThreshold] {
        &self.levels
    }

    fn position(&self, total: i64) -> usize {
        self.levels
            .iter()
            .rposition(|l| total >= l.threshold)
            .unwrap_or(0)
    }

    pub fn level_for(&self, total: i64) -> &LevelThreshold {
        &self.levels[self.position(total)]
    }

    pub fn progress(&self, total: i64) -> LevelProgress {
        let idx = self.position(total);
        let current = &self.levels[idx];
        match self.levels.get(idx + 1) {
            Some(next) => {
                let span = (next.threshold - current.threshold) as f64;
                let fraction = ((total - current.threshold) as f64 / span).clamp(0.0, 1.0);
                LevelProgress {
                    total,
                    current_level: current.name.clone(),
                    next_level: Some(next.name.clone()),
                    next_threshold: Some(next.threshold),
                    rate_bps: current.rate_bps,
                    fraction,
                }
            }
            None => LevelProgress {
                total,
                current_level: current.name.clone(),
                next_level: None,
                next_threshold: None,
                rate_bps: current.rate_bps,
                fraction: 1.0,
            },
        }
    }
}

/// `amount × bps / 10_000`, rounded down.
pub fn apply_rate_bps(amount: i64, rate_bps: u32) -> i64 {
    let scaled = i128::from(amount) * i128::from(rate_bps) / 10_000;
    i64::try_from(scaled).unwrap_or(i64::MAX)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub amount: i64,
    pub reference_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustRequest {
    pub amount: i64,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LevelTable {
        LevelTable::new(vec![
            LevelThreshold { name: "bronze".into(), threshold: 0, rate_bps: 300 },
            LevelThreshold { name: "silver".into(), threshold: 1_000, rate_bps: 500 },
            LevelThreshold { name: "gold".into(), threshold: 5_000, rate_bps: 700 },
        ])
        .unwrap()
    }

    #[test]
    fn progress_interpolates_between_thresholds() {
        let p = table().progress(3_000);
        assert_eq!(p.current_level, "silver");
        assert_eq!(p.next_level.as_deref(), Some("gold"));
        assert!((p.fraction - 0.5).abs() < f64::EPSILON);
        assert_eq!(p.rate_bps, 500);
    }

    #[test]
    fn top_level_has_no_next_and_full_fraction() {
        let p = table().progress(1_000_000);
        assert_eq!(p.current_level, "gold");
        assert_eq!(p.next_level, None);
        assert_eq!(p.fraction, 1.0);
    }

    #[test]
    fn exact_threshold_lands_on_that_level() {
        let p = table().progress(1_000);
        assert_eq!(p.current_level, "silver");
        assert_eq!(p.fraction, 0.0);
        assert_eq!(table().level_for(999).name, "bronze");
    }

    #[test]
    fn rejects_unsorted_or_offset_tables() {
        assert!(LevelTable::new(vec![]).is_err());
        assert!(LevelTable::new(vec![LevelThreshold {
            name: "a".into(),
            threshold: 10,
            rate_bps: 0
        }])
        .is_err());
        assert!(LevelTable::new(vec![
            LevelThreshold { name: "a".into(), threshold: 0, rate_bps: 0 },
            LevelThreshold { name: "b".into(), threshold: 0, rate_bps: 0 },
        ])
        .is_err());
    }

    #[test]
    fn rate_rounds_down() {
        assert_eq!(apply_rate_bps(1_999, 500), 99);
        assert_eq!(apply_rate_bps(0, 500), 0);
    }

    #[test]
    fn account_tracks_lifetime_totals_per_kind() {
        let now = Utc::now();
        let mut acct = BonusAccount::new(Uuid::new_v4(), now);
        acct.apply(100, TransactionKind::Cashback, now);
        acct.apply(50, TransactionKind::ReferralSignup, now);
        acct.apply(-30, TransactionKind::Redemption, now);
        assert_eq!(acct.balance, 120);
        assert_eq!(acct.lifetime_cashback, 100);
        assert_eq!(acct.lifetime_referral, 50);
    }
}

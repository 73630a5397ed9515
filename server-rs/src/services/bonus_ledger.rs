use std::sync::Arc;

use uuid::Uuid;

use crate::clock::Clock;
use crate::config::RewardsConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    AppendOutcome, BonusAccount, BonusTransaction, LedgerReceipt, LevelProgress, NewTransaction,
    TransactionKind,
};
use crate::store::LedgerStore;

/// Append-only bonus points ledger. The stored balance is a cache; the
/// transaction log is the source of truth.
#[derive(Clone)]
pub struct BonusLedger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    rewards: Arc<RewardsConfig>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceCheck {
    pub cached: i64,
    pub recomputed: i64,
    pub consistent: bool,
}

impl BonusLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        rewards: Arc<RewardsConfig>,
    ) -> Self {
        Self {
            store,
            clock,
            rewards,
        }
    }

    pub fn rewards(&self) -> &RewardsConfig {
        &self.rewards
    }

    pub async fn ensure_account(&self, user_id: Uuid) -> AppResult<BonusAccount> {
        self.store.ensure_account(user_id, self.clock.now()).await
    }

    pub async fn credit(
        &self,
        user_id: Uuid,
        amount: i64,
        kind: TransactionKind,
        related_entity_id: Option<String>,
    ) -> AppResult<LedgerReceipt> {
        self.credit_inner(user_id, amount, kind, related_entity_id, None)
            .await
    }

    /// Credit guarded by `idempotency_key`; a repeated key is a successful no-op.
    pub async fn credit_once(
        &self,
        user_id: Uuid,
        amount: i64,
        kind: TransactionKind,
        related_entity_id: Option<String>,
        idempotency_key: String,
    ) -> AppResult<LedgerReceipt> {
        self.credit_inner(user_id, amount, kind, related_entity_id, Some(idempotency_key))
            .await
    }

    async fn credit_inner(
        &self,
        user_id: Uuid,
        amount: i64,
        kind: TransactionKind,
        related_entity_id: Option<String>,
        idempotency_key: Option<String>,
    ) -> AppResult<LedgerReceipt> {
        if amount <= 0 {
            return Err(AppError::InvalidAmount);
        }
        let outcome = self
            .store
            .append(NewTransaction {
                user_id,
                amount,
                kind,
                related_entity_id,
                idempotency_key,
                created_at: self.clock.now(),
            })
            .await?;
        match outcome {
            AppendOutcome::Insufficient { balance } => Err(AppError::Internal(format!(
                "Credit of {amount} rejected for {user_id} at balance {balance}"
            ))),
            other => Ok(receipt(user_id, kind, other)),
        }
    }

    pub async fn debit(
        &self,
        user_id: Uuid,
        amount: i64,
        kind: TransactionKind,
        related_entity_id: Option<String>,
    ) -> AppResult<LedgerReceipt> {
        if amount <= 0 {
            return Err(AppError::InvalidAmount);
        }
        let outcome = self
            .store
            .append(NewTransaction {
                user_id,
                amount: -amount,
                kind,
                related_entity_id,
                idempotency_key: None,
                created_at: self.clock.now(),
            })
            .await?;
        match outcome {
            AppendOutcome::Insufficient { balance } => Err(AppError::InsufficientBalance {
                balance,
                requested: amount,
            }),
            other => Ok(receipt(user_id, kind, other)),
        }
    }

    pub async fn redeem(
        &self,
        user_id: Uuid,
        amount: i64,
        reference_id: Option<String>,
    ) -> AppResult<LedgerReceipt> {
        self.debit(user_id, amount, TransactionKind::Redemption, reference_id)
            .await
    }

    /// Signed admin correction. Never takes the balance below zero.
    pub async fn adjust(
        &self,
        user_id: Uuid,
        amount: i64,
        note: Option<String>,
    ) -> AppResult<LedgerReceipt> {
        match amount {
            0 => Err(AppError::InvalidAmount),
            a if a > 0 => {
                self.credit(user_id, a, TransactionKind::ManualAdjustment, note)
                    .await
            }
            a => {
                self.debit(user_id, -a, TransactionKind::ManualAdjustment, note)
                    .await
            }
        }
    }

    pub async fn balance(&self, user_id: Uuid) -> AppResult<i64> {
        self.store.ledger_sum(user_id).await
    }

    pub async fn account(&self, user_id: Uuid) -> AppResult<BonusAccount> {
        match self.store.account(user_id).await? {
            Some(account) => Ok(account),
            None => self.ensure_account(user_id).await,
        }
    }

    pub async fn verify_balance(&self, user_id: Uuid) -> AppResult<BalanceCheck> {
        let cached = self
            .store
            .account(user_id)
            .await?
            .map_or(0, |a| a.balance);
        let recomputed = self.store.ledger_sum(user_id).await?;
        if cached != recomputed {
            tracing::error!(%user_id, cached, recomputed, "bonus balance drifted from ledger");
        }
        Ok(BalanceCheck {
            cached,
            recomputed,
            consistent: cached == recomputed,
        })
    }

    pub async fn transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<BonusTransaction>> {
        self.store
            .transactions(user_id, limit.clamp(1, 100), offset.max(0))
            .await
    }

    pub fn cashback_progress(&self, lifetime_cashback: i64) -> LevelProgress {
        self.rewards.cashback_levels.progress(lifetime_cashback)
    }

    pub fn referral_progress(&self, lifetime_referral: i64) -> LevelProgress {
        self.rewards.referral_levels.progress(lifetime_referral)
    }
}

fn receipt(user_id: Uuid, kind: TransactionKind, outcome: AppendOutcome) -> LedgerReceipt {
    match outcome {
        AppendOutcome::Appended(tx) => {
            tracing::info!(
                %user_id,
                kind = kind.as_str(),
                amount = tx.amount,
                balance = tx.balance_after,
                "bonus transaction appended"
            );
            LedgerReceipt {
                applied: true,
                balance: tx.balance_after,
                transaction: Some(tx),
            }
        }
        AppendOutcome::Duplicate { balance } | AppendOutcome::Insufficient { balance } => {
            LedgerReceipt {
                applied: false,
                balance,
                transaction: None,
            }
        }
    }
}

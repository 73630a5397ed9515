use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{apply_rate_bps, AchievementUnlock, LedgerReceipt, Transition, TransactionKind};
use crate::services::achievements::AchievementEvaluator;
use crate::services::bonus_ledger::BonusLedger;
use crate::services::entitlement_engine::EntitlementEngine;
use crate::services::referral_graph::ReferralGraph;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseIntent {
    Activate,
    Renew,
    Upgrade,
    #[default]
    Auto,
}

/// Body of a confirmed payment forwarded by the payment webhook handler.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub user_id: Uuid,
    pub product_id: String,
    pub payment_ref: String,
    #[serde(default)]
    pub intent: PurchaseIntent,
    /// Amount actually charged; defaults to the product list price.
    pub amount_paid_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    pub intent: PurchaseIntent,
    #[serde(flatten)]
    pub transition: Transition,
    pub cashback: Option<LedgerReceipt>,
    pub referral_commission: Option<LedgerReceipt>,
    pub achievements: Vec<AchievementUnlock>,
    /// Side effects that failed after the entitlement change was saved.
    /// Each is safe to retry by replaying the same payment.
    pub failed_effects: Vec<String>,
}

/// Applies a confirmed payment to the entitlement, then runs the bonus side
/// effects. Side effects never undo a saved transition.
#[derive(Clone)]
pub struct PaymentEffects {
    engine: EntitlementEngine,
    ledger: BonusLedger,
    referrals: ReferralGraph,
    achievements: AchievementEvaluator,
}

impl PaymentEffects {
    pub fn new(
        engine: EntitlementEngine,
        ledger: BonusLedger,
        referrals: ReferralGraph,
        achievements: AchievementEvaluator,
    ) -> Self {
        Self {
            engine,
            ledger,
            referrals,
            achievements,
        }
    }

    pub async fn on_payment_confirmed(
        &self,
        payment: &PaymentConfirmation,
    ) -> AppResult<PaymentOutcome> {
        let product = self.engine.product(&payment.product_id).await?;
        let intent = match payment.intent {
            PurchaseIntent::Auto => {
                let current = self.engine.get(payment.user_id).await?;
                if !current.is_active() {
                    PurchaseIntent::Activate
                } else if product.tier > current.tier {
                    PurchaseIntent::Upgrade
                } else {
                    PurchaseIntent::Renew
                }
            }
            explicit => explicit,
        };

        let user_id = payment.user_id;
        let payment_ref = Some(payment.payment_ref.as_str());
        let transition = match intent {
            PurchaseIntent::Activate => {
                self.engine.activate(user_id, &product.id, payment_ref).await?
            }
            PurchaseIntent::Upgrade => {
                self.engine.upgrade(user_id, &product.id, payment_ref).await?
            }
            PurchaseIntent::Renew | PurchaseIntent::Auto => {
                self.engine.renew(user_id, &product.id, payment_ref).await?
            }
        };

        let amount_paid = payment.amount_paid_cents.unwrap_or(product.price_cents);
        let mut failed_effects = Vec::new();

        let cashback = match self.credit_cashback(user_id, amount_paid, &payment.payment_ref).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(%user_id, payment_ref = %payment.payment_ref, error = %e, "cashback credit failed");
                failed_effects.push(format!("cashback: {e}"));
                None
            }
        };

        let referral_commission = match self
            .referrals
            .reward_referee_purchase(user_id, amount_paid, &payment.payment_ref)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(%user_id, payment_ref = %payment.payment_ref, error = %e, "referral commission failed");
                failed_effects.push(format!("referral_commission: {e}"));
                None
            }
        };

        let achievements = match self.achievements.check_and_unlock(user_id).await {
            Ok(unlocked) => unlocked,
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "achievement pass failed after payment");
                failed_effects.push(format!("achievements: {e}"));
                Vec::new()
            }
        };

        Ok(PaymentOutcome {
            intent,
            transition,
            cashback,
            referral_commission,
            achievements,
            failed_effects,
        })
    }

    async fn credit_cashback(
        &self,
        user_id: Uuid,
        amount_paid: i64,
        payment_ref: &str,
    ) -> AppResult<Option<LedgerReceipt>> {
        let account = self.ledger.account(user_id).await?;
        let rate = self
            .ledger
            .rewards()
            .cashback_levels
            .level_for(account.lifetime_cashback)
            .rate_bps;
        let cashback = apply_rate_bps(amount_paid, rate);
        if cashback <= 0 {
            return Ok(None);
        }
        self.ledger
            .credit_once(
                user_id,
                cashback,
                TransactionKind::Cashback,
                Some(payment_ref.to_string()),
                format!("cashback:{payment_ref}"),
            )
            .await
            .map(Some)
    }
}

use std::sync::Arc;

use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::models::{
    apply_rate_bps, generate_code, normalize_code, LedgerReceipt, ReferralCode,
    ReferralCodePreview, ReferralOutcome, ReferralRelation, ReferralStats, RelationInsert,
    TransactionKind,
};
use crate::services::bonus_ledger::BonusLedger;
use crate::store::ReferralStore;

const CODE_ATTEMPTS: usize = 8;

#[derive(Clone)]
pub struct ReferralGraph {
    store: Arc<dyn ReferralStore>,
    ledger: BonusLedger,
    clock: Arc<dyn Clock>,
}

impl ReferralGraph {
    pub fn new(store: Arc<dyn ReferralStore>, ledger: BonusLedger, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            ledger,
            clock,
        }
    }

    /// Returns the user's code, generating one on first request.
    pub async fn referral_code(
        &self,
        user_id: Uuid,
        display_name: Option<String>,
    ) -> AppResult<ReferralCode> {
        if let Some(existing) = self.store.code_for_user(user_id).await? {
            return Ok(existing);
        }
        for _ in 0..CODE_ATTEMPTS {
            let code = ReferralCode {
                user_id,
                code: generate_code(&mut rand::thread_rng()),
                display_name: display_name.clone().unwrap_or_default(),
                created_at: self.clock.now(),
            };
            if self.store.insert_code(&code).await? {
                tracing::info!(%user_id, code = %code.code, "referral code created");
                return Ok(code);
            }
            // Lost a race with a concurrent request for the same user.
            if let Some(existing) = self.store.code_for_user(user_id).await? {
                return Ok(existing);
            }
        }
        Err(AppError::ConcurrentModification(format!(
            "referral code for {user_id}"
        )))
    }

    pub async fn validate_referral_code(&self, code: &str) -> AppResult<ReferralCodePreview> {
        Ok(match self.store.find_code(&normalize_code(code)).await? {
            Some(found) => ReferralCodePreview {
                valid: true,
                referrer_display_name: Some(found.display_name).filter(|n| !n.is_empty()),
            },
            None => ReferralCodePreview {
                valid: false,
                referrer_display_name: None,
            },
        })
    }

    /// Links `referee_id` under the code's owner and credits the signup bonus.
    /// Replaying the same pair re-runs only the idempotent credit, so a retry
    /// after a failed credit still pays out exactly once.
    pub async fn register_referral(&self, code: &str, referee_id: Uuid) -> AppResult<ReferralOutcome> {
        let code = normalize_code(code);
        let owner = self
            .store
            .find_code(&code)
            .await?
            .ok_or(AppError::InvalidReferralCode)?;
        if owner.user_id == referee_id {
            return Err(AppError::SelfReferral);
        }

        let relation = ReferralRelation {
            referrer_id: owner.user_id,
            referee_id,
            code: code.clone(),
            registered_at: self.clock.now(),
        };
        let outcome = match self.store.insert_relation(&relation).await? {
            RelationInsert::Inserted => {
                tracing::info!(referrer_id = %owner.user_id, %referee_id, "referral registered");
                ReferralOutcome::Registered { relation }
            }
            RelationInsert::Existing(existing)
                if existing.referrer_id == owner.user_id && existing.code == code =>
            {
                ReferralOutcome::AlreadyRegistered { relation: existing }
            }
            RelationInsert::Existing(_) => return Err(AppError::AlreadyReferred),
        };

        self.credit_signup_bonus(outcome.relation()).await?;
        Ok(outcome)
    }

    async fn credit_signup_bonus(&self, relation: &ReferralRelation) -> AppResult<LedgerReceipt> {
        let bonus = self.ledger.rewards().referral_signup_bonus;
        if bonus <= 0 {
            return self.ledger.account(relation.referrer_id).await.map(|a| LedgerReceipt {
                applied: false,
                balance: a.balance,
                transaction: None,
            });
        }
        self.ledger
            .credit_once(
                relation.referrer_id,
                bonus,
                TransactionKind::ReferralSignup,
                Some(relation.referee_id.to_string()),
                format!("referral_signup:{}", relation.referee_id),
            )
            .await
    }

    /// Pays the referrer of `referee_id` a commission on a purchase at the
    /// referrer's current referral level rate. `None` when the buyer has no
    /// referrer or the commission rounds to zero.
    pub async fn reward_referee_purchase(
        &self,
        referee_id: Uuid,
        amount_paid_cents: i64,
        payment_ref: &str,
    ) -> AppResult<Option<LedgerReceipt>> {
        let Some(relation) = self.store.relation_for_referee(referee_id).await? else {
            return Ok(None);
        };
        let referrer = self.ledger.account(relation.referrer_id).await?;
        let rate = self
            .ledger
            .rewards()
            .referral_levels
            .level_for(referrer.lifetime_referral)
            .rate_bps;
        let commission = apply_rate_bps(amount_paid_cents, rate);
        if commission <= 0 {
            return Ok(None);
        }
        self.ledger
            .credit_once(
                relation.referrer_id,
                commission,
                TransactionKind::ReferralPurchase,
                Some(payment_ref.to_string()),
                format!("referral_purchase:{payment_ref}"),
            )
            .await
            .map(Some)
    }

    pub async fn referral_stats(&self, user_id: Uuid) -> AppResult<ReferralStats> {
        let code = self.store.code_for_user(user_id).await?.map(|c| c.code);
        let referee_count = self.store.referee_count(user_id).await?;
        let account = self.ledger.account(user_id).await?;
        Ok(ReferralStats {
            code,
            referee_count,
            lifetime_referral_bonus: account.lifetime_referral,
            level: self.ledger.referral_progress(account.lifetime_referral),
        })
    }

    pub async fn referee_count(&self, user_id: Uuid) -> AppResult<i64> {
        self.store.referee_count(user_id).await
    }
}

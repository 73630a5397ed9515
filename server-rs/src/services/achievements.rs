use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::clock::{current_streak, Clock};
use crate::error::AppResult;
use crate::models::{
    AchievementAggregates, AchievementDefinition, AchievementUnlock, NewTransaction,
    TransactionKind,
};
use crate::services::bonus_ledger::BonusLedger;
use crate::services::entitlement_engine::EntitlementEngine;
use crate::services::referral_graph::ReferralGraph;
use crate::store::{AchievementStore, ActivitySource};

/// Longest diary streak window read back when computing the current streak.
const STREAK_LOOKBACK_DAYS: i64 = 400;

/// Reconciliation pass over the achievement catalogue. Safe to call as often
/// as needed: unlocks are unique per user and carry their reward credit in
/// the same write.
#[derive(Clone)]
pub struct AchievementEvaluator {
    store: Arc<dyn AchievementStore>,
    activity: Arc<dyn ActivitySource>,
    engine: EntitlementEngine,
    ledger: BonusLedger,
    referrals: ReferralGraph,
    clock: Arc<dyn Clock>,
}

impl AchievementEvaluator {
    pub fn new(
        store: Arc<dyn AchievementStore>,
        activity: Arc<dyn ActivitySource>,
        engine: EntitlementEngine,
        ledger: BonusLedger,
        referrals: ReferralGraph,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            activity,
            engine,
            ledger,
            referrals,
            clock,
        }
    }

    pub fn catalogue(&self) -> &[AchievementDefinition] {
        &self.ledger.rewards().achievements
    }

    pub async fn aggregates(&self, user_id: Uuid) -> AppResult<AchievementAggregates> {
        let entitlement = self.engine.get(user_id).await?;
        let freezes_completed = self
            .engine
            .freeze_history(user_id)
            .await?
            .iter()
            .filter(|r| !r.is_open())
            .count();
        let account = self.ledger.account(user_id).await?;
        let referral_count = self.referrals.referee_count(user_id).await?;

        let today = self.clock.today();
        let diary_days = self
            .activity
            .diary_days(user_id, today - Duration::days(STREAK_LOOKBACK_DAYS))
            .await?;
        let diary_entries = self.activity.diary_entry_count(user_id).await?;

        Ok(AchievementAggregates {
            tier: entitlement.tier,
            months_purchased: entitlement.months_purchased_total,
            freezes_completed: u32::try_from(freezes_completed).unwrap_or(u32::MAX),
            referral_count,
            referral_total: account.lifetime_referral,
            cashback_total: account.lifetime_cashback,
            diary_streak: current_streak(&diary_days, today),
            diary_entries,
        })
    }

    /// Unlocks every satisfied, not yet unlocked achievement and returns the
    /// ones this call unlocked.
    pub async fn check_and_unlock(&self, user_id: Uuid) -> AppResult<Vec<AchievementUnlock>> {
        let aggregates = self.aggregates(user_id).await?;
        let unlocked: Vec<String> = self
            .store
            .unlocks(user_id)
            .await?
            .into_iter()
            .map(|u| u.achievement_id)
            .collect();

        let mut newly_unlocked = Vec::new();
        for definition in self.catalogue() {
            if unlocked.contains(&definition.id) || !definition.condition.is_met(&aggregates) {
                continue;
            }

            let now = self.clock.now();
            let unlock = AchievementUnlock {
                user_id,
                achievement_id: definition.id.clone(),
                unlocked_at: now,
                reward: definition.reward,
                reward_credited: definition.reward > 0,
            };
            let reward = (definition.reward > 0).then(|| NewTransaction {
                user_id,
                amount: definition.reward,
                kind: TransactionKind::Achievement,
                related_entity_id: Some(definition.id.clone()),
                idempotency_key: Some(format!("achievement:{user_id}:{}", definition.id)),
                created_at: now,
            });

            if self.store.unlock_with_reward(&unlock, reward).await? {
                tracing::info!(
                    %user_id,
                    achievement = %definition.id,
                    reward = definition.reward,
                    "achievement unlocked"
                );
                newly_unlocked.push(unlock);
            }
        }
        Ok(newly_unlocked)
    }

    pub async fn unlocks(&self, user_id: Uuid) -> AppResult<Vec<AchievementUnlock>> {
        self.store.unlocks(user_id).await
    }
}

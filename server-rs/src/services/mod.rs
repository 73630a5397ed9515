pub mod achievements;
pub mod bonus_ledger;
pub mod entitlement_engine;
pub mod payments;
pub mod referral_graph;
pub mod sweeper;

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::RewardsConfig;
use crate::models::AchievementUnlock;
use crate::store::{
    AchievementStore, ActivitySource, EntitlementStore, LedgerStore, ProductCatalog, ReferralStore,
};

pub use achievements::AchievementEvaluator;
pub use bonus_ledger::{BalanceCheck, BonusLedger};
pub use entitlement_engine::EntitlementEngine;
pub use payments::{PaymentConfirmation, PaymentEffects, PaymentOutcome, PurchaseIntent};
pub use referral_graph::ReferralGraph;
pub use sweeper::{SweepReport, Sweeper};

/// All components wired over one backing store.
#[derive(Clone)]
pub struct Services {
    pub engine: EntitlementEngine,
    pub ledger: BonusLedger,
    pub referrals: ReferralGraph,
    pub achievements: AchievementEvaluator,
    pub payments: PaymentEffects,
    pub sweeper: Sweeper,
}

impl Services {
    pub fn new<S>(store: S, clock: Arc<dyn Clock>, rewards: Arc<RewardsConfig>) -> Self
    where
        S: EntitlementStore
            + LedgerStore
            + ReferralStore
            + AchievementStore
            + ProductCatalog
            + ActivitySource
            + Clone
            + 'static,
    {
        let entitlements: Arc<dyn EntitlementStore> = Arc::new(store.clone());
        let engine = EntitlementEngine::new(
            entitlements.clone(),
            Arc::new(store.clone()),
            clock.clone(),
            rewards.clone(),
        );
        let ledger = BonusLedger::new(Arc::new(store.clone()), clock.clone(), rewards);
        let referrals = ReferralGraph::new(Arc::new(store.clone()), ledger.clone(), clock.clone());
        let achievements = AchievementEvaluator::new(
            Arc::new(store.clone()),
            Arc::new(store),
            engine.clone(),
            ledger.clone(),
            referrals.clone(),
            clock.clone(),
        );
        let payments = PaymentEffects::new(
            engine.clone(),
            ledger.clone(),
            referrals.clone(),
            achievements.clone(),
        );
        let sweeper = Sweeper::new(entitlements, engine.clone(), achievements.clone(), clock);

        Self {
            engine,
            ledger,
            referrals,
            achievements,
            payments,
            sweeper,
        }
    }

    /// Achievement pass after a state change. A failure never fails the
    /// caller; it is logged and reported in `failed_effects`, and the next
    /// pass picks the unlock up again.
    pub async fn reconcile_achievements(&self, user_id: Uuid) -> AchievementPass {
        match self.achievements.check_and_unlock(user_id).await {
            Ok(unlocked) => AchievementPass {
                unlocked,
                failed_effects: Vec::new(),
            },
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "achievement reconciliation failed");
                AchievementPass {
                    unlocked: Vec::new(),
                    failed_effects: vec![format!("achievements: {e}")],
                }
            }
        }
    }
}

/// Outcome of a best-effort achievement pass.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementPass {
    pub unlocked: Vec<AchievementUnlock>,
    pub failed_effects: Vec<String>,
}

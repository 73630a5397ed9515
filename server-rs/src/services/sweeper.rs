use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppResult;
use crate::services::achievements::AchievementEvaluator;
use crate::services::entitlement_engine::EntitlementEngine;
use crate::store::EntitlementStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub unfrozen: usize,
    pub expired: usize,
    pub failed: usize,
    /// Users whose entitlement changed, each listed once.
    pub affected: Vec<Uuid>,
}

impl SweepReport {
    fn touch(&mut self, user_id: Uuid) {
        if !self.affected.contains(&user_id) {
            self.affected.push(user_id);
        }
    }
}

/// Periodic pass: auto-unfreeze due freezes, then expire lapsed
/// subscriptions. Unfreezing runs first so a freeze that ran out is charged
/// and its days added back before expiry is considered.
#[derive(Clone)]
pub struct Sweeper {
    store: Arc<dyn EntitlementStore>,
    engine: EntitlementEngine,
    achievements: AchievementEvaluator,
    clock: Arc<dyn Clock>,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        engine: EntitlementEngine,
        achievements: AchievementEvaluator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            engine,
            achievements,
            clock,
        }
    }

    pub async fn run_once(&self) -> AppResult<SweepReport> {
        let mut report = SweepReport::default();

        for user_id in self.store.due_for_unfreeze(self.clock.now()).await? {
            match self.engine.check_and_auto_unfreeze(user_id).await {
                Ok(Some(unfreeze)) => {
                    report.unfrozen += 1;
                    report.touch(user_id);
                    tracing::info!(%user_id, charged_days = unfreeze.charged_days, "auto-unfroze subscription");
                    if let Err(e) = self.achievements.check_and_unlock(user_id).await {
                        tracing::warn!(%user_id, error = %e, "achievement pass failed after auto-unfreeze");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(%user_id, error = %e, "auto-unfreeze failed");
                }
            }
        }

        for user_id in self.store.due_for_expiry(self.clock.now()).await? {
            match self.engine.expire_if_due(user_id).await {
                Ok(Some(_)) => {
                    report.expired += 1;
                    report.touch(user_id);
                }
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(%user_id, error = %e, "expiry failed");
                }
            }
        }

        tracing::info!(
            unfrozen = report.unfrozen,
            expired = report.expired,
            failed = report.failed,
            "sweep finished"
        );
        Ok(report)
    }
}

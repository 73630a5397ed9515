//! Subscription state machine over `status × isFrozen`.
//!
//! Every transition is a read-plan-write loop: load the record, compute the
//! next state from a pure planning function, then compare-and-swap on the
//! record version. A lost race reloads and re-plans, so two concurrent calls
//! for the same user collapse into one effective transition and the loser
//! sees the precondition error of the new state (e.g. `AlreadyFrozen`).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::clock::{add_days, add_months, days_between, Clock};
use crate::config::RewardsConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    FreezeCloseReason, FreezeRecord, FreezeRecordChange, FreezeState, Product, Proration,
    SaveEffects, SaveOutcome, SubscriberEntitlement, SubscriptionStatus, Tier, Transition,
    Unfreeze,
};
use crate::store::{EntitlementStore, ProductCatalog};

struct Planned<T> {
    next: SubscriberEntitlement,
    effects: SaveEffects,
    detail: T,
}

enum Applied<T> {
    Changed {
        entitlement: SubscriberEntitlement,
        detail: T,
    },
    /// Nothing to do, or the payment reference was already applied.
    Unchanged(SubscriberEntitlement),
}

#[derive(Clone)]
pub struct EntitlementEngine {
    store: Arc<dyn EntitlementStore>,
    catalog: Arc<dyn ProductCatalog>,
    clock: Arc<dyn Clock>,
    rewards: Arc<RewardsConfig>,
}

impl EntitlementEngine {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        catalog: Arc<dyn ProductCatalog>,
        clock: Arc<dyn Clock>,
        rewards: Arc<RewardsConfig>,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
            rewards,
        }
    }

    pub async fn product(&self, product_id: &str) -> AppResult<Product> {
        self.catalog
            .product(product_id)
            .await?
            .ok_or_else(|| AppError::ProductNotFound(product_id.to_string()))
    }

    pub async fn products(&self) -> AppResult<Vec<Product>> {
        self.catalog.list_products().await
    }

    /// Current record, or an unsaved inactive default for unknown users.
    pub async fn get(&self, user_id: Uuid) -> AppResult<SubscriberEntitlement> {
        Ok(self
            .store
            .load_entitlement(user_id)
            .await?
            .unwrap_or_else(|| SubscriberEntitlement::new_inactive(user_id, self.clock.now())))
    }

    /// Idempotent first-touch creation.
    pub async fn ensure(&self, user_id: Uuid) -> AppResult<SubscriberEntitlement> {
        self.store.ensure_entitlement(user_id, self.clock.now()).await
    }

    pub async fn freeze_history(&self, user_id: Uuid) -> AppResult<Vec<FreezeRecord>> {
        self.store.freeze_history(user_id).await
    }

    async fn apply<T, F>(
        &self,
        user_id: Uuid,
        op: &'static str,
        payment_ref: Option<&str>,
        mut plan: F,
    ) -> AppResult<Applied<T>>
    where
        T: Send,
        F: FnMut(&SubscriberEntitlement, DateTime<Utc>) -> AppResult<Option<Planned<T>>> + Send,
    {
        let attempts = self.rewards.max_transition_attempts.max(1);
        for attempt in 1..=attempts {
            let now = self.clock.now();
            let current = self.store.ensure_entitlement(user_id, now).await?;

            if let Some(payment_ref) = payment_ref {
                if self.store.is_payment_applied(payment_ref).await? {
                    tracing::info!(%user_id, op, payment_ref, "payment already applied, skipping");
                    return Ok(Applied::Unchanged(current));
                }
            }

            let Some(planned) = plan(&current, now)? else {
                return Ok(Applied::Unchanged(current));
            };

            let mut next = planned.next;
            next.version = current.version + 1;
            next.updated_at = now;
            if let Some(violation) = next.invariant_violation() {
                return Err(AppError::Internal(format!(
                    "{op} for {user_id} would break entitlement invariant: {violation}"
                )));
            }

            let mut effects = planned.effects;
            effects.payment_ref = payment_ref.map(str::to_string);

            match self
                .store
                .save_entitlement(&next, current.version, effects)
                .await?
            {
                SaveOutcome::Saved => {
                    tracing::info!(
                        %user_id,
                        op,
                        tier = %next.tier,
                        status = next.status.as_str(),
                        version = next.version,
                        "entitlement transition applied"
                    );
                    return Ok(Applied::Changed {
                        entitlement: next,
                        detail: planned.detail,
                    });
                }
                SaveOutcome::DuplicatePayment => {
                    let latest = self.get(user_id).await?;
                    return Ok(Applied::Unchanged(latest));
                }
                SaveOutcome::VersionConflict => {
                    tracing::debug!(%user_id, op, attempt, "entitlement version conflict, retrying");
                }
            }
        }
        Err(AppError::ConcurrentModification(format!(
            "entitlement of {user_id}"
        )))
    }

    pub async fn activate(
        &self,
        user_id: Uuid,
        product_id: &str,
        payment_ref: Option<&str>,
    ) -> AppResult<Transition> {
        let product = self.product(product_id).await?;
        let applied = self
            .apply(user_id, "activate", payment_ref, |current, now| {
                plan_activate(current, &product, &self.rewards, now).map(Some)
            })
            .await?;
        Ok(into_transition(applied))
    }

    pub async fn renew(
        &self,
        user_id: Uuid,
        product_id: &str,
        payment_ref: Option<&str>,
    ) -> AppResult<Transition> {
        let product = self.product(product_id).await?;
        let applied = self
            .apply(user_id, "renew", payment_ref, |current, now| {
                plan_renew(current, &product, now).map(Some)
            })
            .await?;
        Ok(into_transition(applied))
    }

    pub async fn upgrade(
        &self,
        user_id: Uuid,
        product_id: &str,
        payment_ref: Option<&str>,
    ) -> AppResult<Transition> {
        let product = self.product(product_id).await?;
        let applied = self
            .apply(user_id, "upgrade", payment_ref, |current, now| {
                plan_upgrade(current, &product, &self.rewards, now).map(Some)
            })
            .await?;
        Ok(into_transition(applied))
    }

    pub async fn freeze(&self, user_id: Uuid) -> AppResult<SubscriberEntitlement> {
        let applied = self
            .apply(user_id, "freeze", None, |current, now| {
                plan_freeze(current, now).map(Some)
            })
            .await?;
        Ok(match applied {
            Applied::Changed { entitlement, .. } | Applied::Unchanged(entitlement) => entitlement,
        })
    }

    pub async fn unfreeze(&self, user_id: Uuid, reason: FreezeCloseReason) -> AppResult<Unfreeze> {
        match self.unfreeze_inner(user_id, reason, false).await? {
            Some(unfreeze) => Ok(unfreeze),
            None => Err(AppError::NotFrozen),
        }
    }

    /// Unfreezes with `days_exhausted` once `frozen_until` has passed.
    /// `None` when the user is not frozen or the freeze is not yet due.
    pub async fn check_and_auto_unfreeze(&self, user_id: Uuid) -> AppResult<Option<Unfreeze>> {
        self.unfreeze_inner(user_id, FreezeCloseReason::DaysExhausted, true)
            .await
    }

    async fn unfreeze_inner(
        &self,
        user_id: Uuid,
        reason: FreezeCloseReason,
        only_when_due: bool,
    ) -> AppResult<Option<Unfreeze>> {
        let applied = self
            .apply(user_id, "unfreeze", None, |current, now| {
                if only_when_due {
                    let due = current.freeze.is_frozen
                        && current.freeze.frozen_until.is_some_and(|until| until <= now);
                    if !due {
                        return Ok(None);
                    }
                }
                plan_unfreeze(current, now, reason).map(Some)
            })
            .await?;
        Ok(match applied {
            Applied::Changed {
                entitlement,
                detail,
            } => Some(Unfreeze {
                entitlement,
                charged_days: detail,
                reason,
            }),
            Applied::Unchanged(_) => None,
        })
    }

    pub async fn expire(&self, user_id: Uuid) -> AppResult<SubscriberEntitlement> {
        let applied = self
            .apply(user_id, "expire", None, |current, now| {
                plan_expire(current, now).map(Some)
            })
            .await?;
        Ok(match applied {
            Applied::Changed { entitlement, .. } | Applied::Unchanged(entitlement) => entitlement,
        })
    }

    /// Sweep variant of [`Self::expire`]: `None` instead of precondition errors.
    pub async fn expire_if_due(&self, user_id: Uuid) -> AppResult<Option<SubscriberEntitlement>> {
        let applied = self
            .apply(user_id, "expire", None, |current, now| {
                match plan_expire(current, now) {
                    Ok(planned) => Ok(Some(planned)),
                    Err(AppError::NotActive | AppError::FrozenSubscription | AppError::NotYetExpired) => {
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            })
            .await?;
        Ok(match applied {
            Applied::Changed { entitlement, .. } => Some(entitlement),
            Applied::Unchanged(_) => None,
        })
    }

    /// Explicit cancellation. An open freeze is closed first with reason `admin`.
    pub async fn cancel(&self, user_id: Uuid) -> AppResult<SubscriberEntitlement> {
        let applied = self
            .apply(user_id, "cancel", None, |current, now| {
                if !current.is_active() {
                    return Err(AppError::NotActive);
                }
                let mut planned = if current.is_frozen() {
                    let closed = plan_unfreeze(current, now, FreezeCloseReason::Admin)?;
                    Planned {
                        next: closed.next,
                        effects: closed.effects,
                        detail: (),
                    }
                } else {
                    Planned {
                        next: current.clone(),
                        effects: SaveEffects::default(),
                        detail: (),
                    }
                };
                planned.next.status = SubscriptionStatus::Inactive;
                Ok(Some(planned))
            })
            .await?;
        Ok(match applied {
            Applied::Changed { entitlement, .. } | Applied::Unchanged(entitlement) => entitlement,
        })
    }

    pub async fn set_payment_method_linked(
        &self,
        user_id: Uuid,
        linked: bool,
    ) -> AppResult<SubscriberEntitlement> {
        let applied = self
            .apply(user_id, "payment_method", None, |current, _now| {
                if current.payment_method_linked == linked {
                    return Ok(None);
                }
                let mut next = current.clone();
                next.payment_method_linked = linked;
                Ok(Some(Planned {
                    next,
                    effects: SaveEffects::default(),
                    detail: (),
                }))
            })
            .await?;
        Ok(match applied {
            Applied::Changed { entitlement, .. } | Applied::Unchanged(entitlement) => entitlement,
        })
    }

    pub async fn has_access(&self, user_id: Uuid, required: Tier) -> AppResult<bool> {
        let ent = self.get(user_id).await?;
        Ok(has_access(&ent, required, self.clock.now()))
    }

    pub async fn auto_renew_eligible(&self, user_id: Uuid) -> AppResult<bool> {
        let ent = self.get(user_id).await?;
        let window = Duration::days(self.rewards.auto_renew_window_days);
        Ok(auto_renew_eligible(&ent, window, self.clock.now()))
    }
}

fn into_transition(applied: Applied<Option<Proration>>) -> Transition {
    match applied {
        Applied::Changed {
            entitlement,
            detail,
        } => Transition {
            entitlement,
            proration: detail,
            duplicate: false,
        },
        Applied::Unchanged(entitlement) => Transition {
            entitlement,
            proration: None,
            duplicate: true,
        },
    }
}

fn plan_activate(
    current: &SubscriberEntitlement,
    product: &Product,
    rewards: &RewardsConfig,
    now: DateTime<Utc>,
) -> AppResult<Planned<Option<Proration>>> {
    if current.is_active() {
        return Err(AppError::AlreadyActive);
    }
    let mut next = current.clone();
    next.tier = product.tier;
    next.status = SubscriptionStatus::Active;
    next.duration_months = product.duration_months;
    next.price_paid_cents = product.price_cents;
    next.expires_at = Some(add_months(now, product.duration_months)?);
    next.months_purchased_total += product.duration_months;
    next.freeze = FreezeState::from_allowance(
        rewards
            .freeze_allowances
            .lookup(product.tier, product.duration_months),
    );
    Ok(Planned {
        next,
        effects: SaveEffects::default(),
        detail: None,
    })
}

fn plan_renew(
    current: &SubscriberEntitlement,
    product: &Product,
    now: DateTime<Utc>,
) -> AppResult<Planned<Option<Proration>>> {
    if !current.is_active() {
        return Err(AppError::NotActive);
    }
    if product.tier != current.tier {
        return Err(AppError::TierMismatch {
            current: current.tier.to_string(),
            product: product.tier.to_string(),
        });
    }
    let base = current.expires_at.map_or(now, |expires| expires.max(now));
    let mut next = current.clone();
    next.expires_at = Some(add_months(base, product.duration_months)?);
    next.duration_months = product.duration_months;
    next.price_paid_cents = product.price_cents;
    next.months_purchased_total += product.duration_months;
    Ok(Planned {
        next,
        effects: SaveEffects::default(),
        detail: None,
    })
}

fn plan_upgrade(
    current: &SubscriberEntitlement,
    product: &Product,
    rewards: &RewardsConfig,
    now: DateTime<Utc>,
) -> AppResult<Planned<Option<Proration>>> {
    if !current.is_active() {
        return Err(AppError::NotActive);
    }
    if current.is_frozen() {
        return Err(AppError::FrozenSubscription);
    }
    if product.tier <= current.tier {
        return Err(AppError::NotAnUpgrade {
            current: current.tier.to_string(),
            product: product.tier.to_string(),
        });
    }

    let remaining_days = current
        .expires_at
        .map_or(0, |expires| days_between(now, expires).max(0));
    let bonus_days =
        prorated_bonus_days(remaining_days, current.price_paid_cents, product.price_cents);
    let proration = Proration {
        remaining_days,
        old_price_cents: current.price_paid_cents,
        old_duration_months: current.duration_months,
        new_price_cents: product.price_cents,
        new_duration_months: product.duration_months,
        bonus_days,
    };

    let mut next = current.clone();
    next.tier = product.tier;
    next.duration_months = product.duration_months;
    next.price_paid_cents = product.price_cents;
    next.expires_at = Some(add_days(
        add_months(now, product.duration_months)?,
        bonus_days,
    ));
    next.months_purchased_total += product.duration_months;
    next.freeze = FreezeState::from_allowance(
        rewards
            .freeze_allowances
            .lookup(product.tier, product.duration_months),
    );
    Ok(Planned {
        next,
        effects: SaveEffects::default(),
        detail: Some(proration),
    })
}

/// Leftover days of the old plan converted at the ratio of the price paid
/// to the new price: `floor(remaining × oldPaid / newPrice)`. Rounded down
/// so the credit never exceeds the value already paid.
pub fn prorated_bonus_days(
    remaining_days: i64,
    old_price_cents: i64,
    new_price_cents: i64,
) -> i64 {
    if remaining_days <= 0 || old_price_cents <= 0 {
        return 0;
    }
    if new_price_cents <= 0 {
        return remaining_days;
    }
    let numerator = i128::from(remaining_days) * i128::from(old_price_cents);
    i64::try_from(numerator / i128::from(new_price_cents)).unwrap_or(i64::MAX)
}

fn plan_freeze(current: &SubscriberEntitlement, now: DateTime<Utc>) -> AppResult<Planned<()>> {
    if !current.is_active() {
        return Err(AppError::NotActive);
    }
    if current.is_frozen() {
        return Err(AppError::AlreadyFrozen);
    }
    if current.expires_at.map_or(true, |expires| expires <= now) {
        return Err(AppError::SubscriptionLapsed);
    }
    if current.freeze.tokens_remaining() == 0 {
        return Err(AppError::FreezeTokensExhausted);
    }
    let days_remaining = current.freeze.days_remaining();
    if days_remaining == 0 {
        return Err(AppError::FreezeDaysExhausted);
    }

    let mut next = current.clone();
    next.freeze.is_frozen = true;
    next.freeze.frozen_at = Some(now);
    next.freeze.frozen_until = Some(add_days(now, i64::from(days_remaining)));
    next.freeze.tokens_used += 1;
    Ok(Planned {
        next,
        effects: SaveEffects {
            freeze: Some(FreezeRecordChange::Open(FreezeRecord::open(
                current.user_id,
                now,
            ))),
            payment_ref: None,
        },
        detail: (),
    })
}

/// Shared by manual, automatic and admin unfreezes. Charges the elapsed
/// days (rounded up, capped at the allowance left) and pushes expiry out by
/// the same amount.
fn plan_unfreeze(
    current: &SubscriberEntitlement,
    now: DateTime<Utc>,
    reason: FreezeCloseReason,
) -> AppResult<Planned<u32>> {
    if !current.is_frozen() {
        return Err(AppError::NotFrozen);
    }
    let frozen_at = current.freeze.frozen_at.ok_or_else(|| {
        AppError::Internal(format!("User {} is frozen without frozen_at", current.user_id))
    })?;
    let elapsed = u32::try_from(days_between(frozen_at, now).max(0)).unwrap_or(u32::MAX);
    let charged = elapsed.min(current.freeze.days_remaining());

    let mut next = current.clone();
    next.freeze.days_used += charged;
    next.freeze.is_frozen = false;
    next.freeze.frozen_at = None;
    next.freeze.frozen_until = None;
    next.expires_at = current
        .expires_at
        .map(|expires| add_days(expires, i64::from(charged)));
    Ok(Planned {
        next,
        effects: SaveEffects {
            freeze: Some(FreezeRecordChange::Close {
                ended_at: now,
                days_used: charged,
                reason,
            }),
            payment_ref: None,
        },
        detail: charged,
    })
}

fn plan_expire(current: &SubscriberEntitlement, now: DateTime<Utc>) -> AppResult<Planned<()>> {
    if !current.is_active() {
        return Err(AppError::NotActive);
    }
    if current.is_frozen() {
        return Err(AppError::FrozenSubscription);
    }
    if current.expires_at.is_some_and(|expires| expires > now) {
        return Err(AppError::NotYetExpired);
    }
    let mut next = current.clone();
    next.status = SubscriptionStatus::Inactive;
    Ok(Planned {
        next,
        effects: SaveEffects::default(),
        detail: (),
    })
}

/// Status is authoritative: a retained tier grants nothing once inactive.
pub fn has_access(ent: &SubscriberEntitlement, required: Tier, now: DateTime<Utc>) -> bool {
    ent.is_active()
        && !ent.is_frozen()
        && ent.expires_at.is_some_and(|expires| expires > now)
        && ent.tier >= required
}

pub fn auto_renew_eligible(
    ent: &SubscriberEntitlement,
    window: Duration,
    now: DateTime<Utc>,
) -> bool {
    ent.is_active()
        && !ent.is_frozen()
        && ent.payment_method_linked
        && ent
            .expires_at
            .is_some_and(|expires| expires > now && expires - now <= window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn product(tier: Tier, months: u32, price: i64) -> Product {
        Product {
            id: format!("{tier}-{months}"),
            title: String::new(),
            tier,
            duration_months: months,
            price_cents: price,
        }
    }

    fn active(tier: Tier, expires: DateTime<Utc>) -> SubscriberEntitlement {
        let mut ent = SubscriberEntitlement::new_inactive(Uuid::new_v4(), t0());
        ent.tier = tier;
        ent.status = SubscriptionStatus::Active;
        ent.expires_at = Some(expires);
        ent.duration_months = 1;
        ent.price_paid_cents = 3_000;
        ent.freeze = FreezeState {
            tokens_total: 2,
            days_total: 14,
            ..FreezeState::default()
        };
        ent
    }

    #[test]
    fn proration_converts_at_price_ratio_rounding_down() {
        // 10 * 3000 / 4500 = 6.67
        assert_eq!(prorated_bonus_days(10, 3_000, 4_500), 6);
        // a month paid at 3000 into a quarter at 14000: 31 * 3000 / 14000 = 6.64
        assert_eq!(prorated_bonus_days(31, 3_000, 14_000), 6);
        assert_eq!(prorated_bonus_days(0, 3_000, 4_500), 0);
        assert_eq!(prorated_bonus_days(-3, 3_000, 4_500), 0);
        assert_eq!(prorated_bonus_days(12, 0, 4_500), 0);
        assert_eq!(prorated_bonus_days(12, 3_000, 0), 12);
    }

    #[test]
    fn proration_never_exceeds_paid_value_bound() {
        for remaining in 0..60i64 {
            for (old, new) in [(1_000i64, 3_000i64), (2_999, 3_000), (5_000, 7_001)] {
                let bonus = prorated_bonus_days(remaining, old, new);
                assert!(bonus >= 0);
                assert!((bonus as f64) <= remaining as f64 * old as f64 / new as f64);
            }
        }
    }

    #[test]
    fn renew_appends_to_later_of_now_and_expiry() {
        let ent = active(Tier::Pro, t0() + Duration::days(2));
        let planned = plan_renew(&ent, &product(Tier::Pro, 1, 3_000), t0()).unwrap();
        assert_eq!(
            planned.next.expires_at,
            Some(add_months(t0() + Duration::days(2), 1).unwrap())
        );

        let lapsed = active(Tier::Pro, t0() - Duration::days(5));
        let planned = plan_renew(&lapsed, &product(Tier::Pro, 1, 3_000), t0()).unwrap();
        assert_eq!(planned.next.expires_at, Some(add_months(t0(), 1).unwrap()));
    }

    #[test]
    fn renew_keeps_freeze_allowance() {
        let mut ent = active(Tier::Pro, t0() + Duration::days(2));
        ent.freeze.tokens_used = 1;
        ent.freeze.days_used = 4;
        let planned = plan_renew(&ent, &product(Tier::Pro, 12, 30_000), t0()).unwrap();
        assert_eq!(planned.next.freeze, ent.freeze);
    }

    #[test]
    fn tier_ordering_guards() {
        let ent = active(Tier::Pro, t0() + Duration::days(10));
        assert!(matches!(
            plan_renew(&ent, &product(Tier::Elite, 1, 5_000), t0()),
            Err(AppError::TierMismatch { .. })
        ));
        let rewards = RewardsConfig::default();
        assert!(matches!(
            plan_upgrade(&ent, &product(Tier::Pro, 1, 3_000), &rewards, t0()),
            Err(AppError::NotAnUpgrade { .. })
        ));
        assert!(matches!(
            plan_upgrade(&ent, &product(Tier::Basic, 1, 1_000), &rewards, t0()),
            Err(AppError::NotAnUpgrade { .. })
        ));
    }

    #[test]
    fn freeze_caps_until_at_remaining_days() {
        let mut ent = active(Tier::Pro, t0() + Duration::days(30));
        ent.freeze.days_used = 10;
        let planned = plan_freeze(&ent, t0()).unwrap();
        assert_eq!(planned.next.freeze.frozen_until, Some(t0() + Duration::days(4)));
        assert_eq!(planned.next.freeze.tokens_used, 1);
        assert_eq!(planned.next.expires_at, ent.expires_at);
    }

    #[test]
    fn freeze_preconditions_in_order() {
        let mut ent = active(Tier::Pro, t0() + Duration::days(30));
        ent.freeze.days_used = 14;
        assert!(matches!(plan_freeze(&ent, t0()), Err(AppError::FreezeDaysExhausted)));
        ent.freeze.tokens_used = 2;
        assert!(matches!(plan_freeze(&ent, t0()), Err(AppError::FreezeTokensExhausted)));
        ent.freeze.is_frozen = true;
        ent.freeze.frozen_at = Some(t0());
        assert!(matches!(plan_freeze(&ent, t0()), Err(AppError::AlreadyFrozen)));
    }

    #[test]
    fn unfreeze_charges_elapsed_days_and_extends_expiry() {
        let ent = active(Tier::Pro, t0() + Duration::days(30));
        let frozen = plan_freeze(&ent, t0()).unwrap().next;
        let planned = plan_unfreeze(
            &frozen,
            t0() + Duration::days(5),
            FreezeCloseReason::ManualUnfreeze,
        )
        .unwrap();
        assert_eq!(planned.detail, 5);
        assert_eq!(planned.next.freeze.days_used, 5);
        assert_eq!(planned.next.expires_at, Some(t0() + Duration::days(35)));
    }

    #[test]
    fn unfreeze_charge_is_capped_by_allowance() {
        let ent = active(Tier::Pro, t0() + Duration::days(30));
        let frozen = plan_freeze(&ent, t0()).unwrap().next;
        let planned = plan_unfreeze(
            &frozen,
            t0() + Duration::days(40),
            FreezeCloseReason::DaysExhausted,
        )
        .unwrap();
        assert_eq!(planned.detail, 14);
        assert_eq!(planned.next.expires_at, Some(t0() + Duration::days(44)));
    }

    #[test]
    fn frozen_subscriptions_do_not_expire() {
        let ent = active(Tier::Pro, t0() + Duration::days(1));
        let frozen = plan_freeze(&ent, t0()).unwrap().next;
        assert!(matches!(
            plan_expire(&frozen, t0() + Duration::days(3)),
            Err(AppError::FrozenSubscription)
        ));
        assert!(matches!(plan_expire(&ent, t0()), Err(AppError::NotYetExpired)));
        let expired = plan_expire(&ent, t0() + Duration::days(1)).unwrap().next;
        assert_eq!(expired.status, SubscriptionStatus::Inactive);
        assert_eq!(expired.tier, Tier::Pro);
    }

    #[test]
    fn access_requires_active_unfrozen_and_sufficient_tier() {
        let ent = active(Tier::Pro, t0() + Duration::days(1));
        assert!(has_access(&ent, Tier::Basic, t0()));
        assert!(has_access(&ent, Tier::Pro, t0()));
        assert!(!has_access(&ent, Tier::Elite, t0()));
        assert!(!has_access(&ent, Tier::Basic, t0() + Duration::days(2)));
        let frozen = plan_freeze(&ent, t0()).unwrap().next;
        assert!(!has_access(&frozen, Tier::Basic, t0()));
    }

    #[test]
    fn auto_renew_needs_linked_payment_method_inside_window() {
        let mut ent = active(Tier::Pro, t0() + Duration::days(2));
        assert!(!auto_renew_eligible(&ent, Duration::days(3), t0()));
        ent.payment_method_linked = true;
        assert!(auto_renew_eligible(&ent, Duration::days(3), t0()));
        assert!(!auto_renew_eligible(&ent, Duration::days(1), t0()));
    }
}

mod common;

use chrono::Duration;
use common::{t0, Harness};
use fitpass_api::clock::{add_days, add_months};
use fitpass_api::error::AppError;
use fitpass_api::models::{FreezeCloseReason, SubscriptionStatus, Tier};
use uuid::Uuid;

#[tokio::test]
async fn unfreeze_adds_charged_days_back_to_expiry() {
    let h = Harness::new();
    let user = h.active_user("elite_3m").await;
    let before = h.services.engine.get(user).await.expect("get");
    assert_eq!(before.freeze.tokens_total, 2);
    assert_eq!(before.freeze.days_total, 14);

    let frozen = h.services.engine.freeze(user).await.expect("freeze");
    assert!(frozen.freeze.is_frozen);
    assert_eq!(frozen.freeze.frozen_until, Some(add_days(t0(), 14)));
    assert_eq!(frozen.expires_at, before.expires_at);

    h.advance_days(5);
    let result = h
        .services
        .engine
        .unfreeze(user, FreezeCloseReason::ManualUnfreeze)
        .await
        .expect("unfreeze");

    assert_eq!(result.charged_days, 5);
    assert_eq!(result.entitlement.freeze.days_used, 5);
    assert_eq!(
        result.entitlement.expires_at,
        before.expires_at.map(|e| add_days(e, 5))
    );

    let history = h.services.engine.freeze_history(user).await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].days_used, Some(5));
    assert_eq!(history[0].reason, Some(FreezeCloseReason::ManualUnfreeze));
    assert!(!history[0].is_open());
}

#[tokio::test]
async fn partial_freeze_day_is_charged_as_a_full_day() {
    let h = Harness::new();
    let user = h.active_user("elite_3m").await;
    h.services.engine.freeze(user).await.expect("freeze");

    h.clock.advance(Duration::days(2) + Duration::hours(3));
    let result = h
        .services
        .engine
        .unfreeze(user, FreezeCloseReason::ManualUnfreeze)
        .await
        .expect("unfreeze");
    assert_eq!(result.charged_days, 3);
}

#[tokio::test]
async fn forgotten_freeze_is_charged_at_most_the_remaining_allowance() {
    let h = Harness::new();
    let user = h.active_user("elite_3m").await;
    let before = h.services.engine.get(user).await.expect("get");
    h.services.engine.freeze(user).await.expect("freeze");

    h.advance_days(30);
    let result = h
        .services
        .engine
        .unfreeze(user, FreezeCloseReason::ManualUnfreeze)
        .await
        .expect("unfreeze");
    assert_eq!(result.charged_days, 14);
    assert_eq!(result.entitlement.freeze.days_used, 14);
    assert_eq!(
        result.entitlement.expires_at,
        before.expires_at.map(|e| add_days(e, 14))
    );
}

#[tokio::test]
async fn freeze_with_no_days_left_fails_and_mutates_nothing() {
    let h = Harness::new();
    let user = h.active_user("elite_3m").await;
    h.services.engine.freeze(user).await.expect("freeze");
    h.advance_days(14);
    h.services
        .engine
        .unfreeze(user, FreezeCloseReason::ManualUnfreeze)
        .await
        .expect("unfreeze");

    let before = h.services.engine.get(user).await.expect("get");
    assert_eq!(before.freeze.days_remaining(), 0);
    assert_eq!(before.freeze.tokens_remaining(), 1);

    let err = h.services.engine.freeze(user).await.expect_err("no days left");
    assert!(matches!(err, AppError::FreezeDaysExhausted));

    let after = h.services.engine.get(user).await.expect("get");
    assert_eq!(after, before);
    let history = h.services.engine.freeze_history(user).await.expect("history");
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn freeze_tokens_run_out_before_days() {
    let h = Harness::new();
    let user = h.active_user("pro_3m").await;
    h.services.engine.freeze(user).await.expect("freeze");
    h.advance_days(1);
    h.services
        .engine
        .unfreeze(user, FreezeCloseReason::ManualUnfreeze)
        .await
        .expect("unfreeze");

    let err = h.services.engine.freeze(user).await.expect_err("no tokens");
    assert!(matches!(err, AppError::FreezeTokensExhausted));
}

#[tokio::test]
async fn one_month_products_cannot_freeze() {
    let h = Harness::new();
    let user = h.active_user("pro_1m").await;
    let err = h.services.engine.freeze(user).await.expect_err("no allowance");
    assert!(matches!(err, AppError::FreezeTokensExhausted));
}

#[tokio::test]
async fn concurrent_freezes_collapse_into_one() {
    let h = Harness::new();
    let user = h.active_user("elite_3m").await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = h.services.engine.clone();
        handles.push(tokio::spawn(async move { engine.freeze(user).await }));
    }

    let mut ok = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => ok += 1,
            Err(AppError::AlreadyFrozen) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(ok, 1);

    let ent = h.services.engine.get(user).await.expect("get");
    assert_eq!(ent.freeze.tokens_used, 1);
    let history = h.services.engine.freeze_history(user).await.expect("history");
    assert_eq!(history.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_freezes_on_worker_threads_collapse_into_one() {
    let h = Harness::new();
    let user = h.active_user("elite_3m").await;

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = h.services.engine.clone();
            tokio::spawn(async move { engine.freeze(user).await.is_ok() })
        })
        .collect();
    let mut ok = 0;
    for handle in handles {
        if handle.await.expect("join") {
            ok += 1;
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(
        h.services.engine.get(user).await.expect("get").freeze.tokens_used,
        1
    );
}

#[tokio::test]
async fn renewing_early_appends_to_existing_expiry() {
    let h = Harness::new();
    let user = h.active_user("pro_1m").await;
    let before = h.services.engine.get(user).await.expect("get");
    let expires = before.expires_at.expect("expiry");
    assert_eq!(expires, add_months(t0(), 1).expect("months"));

    h.advance_days(29);
    let renewed = h
        .services
        .engine
        .renew(user, "pro_1m", None)
        .await
        .expect("renew");
    let after = renewed.entitlement.expires_at.expect("expiry");
    assert!(after >= expires);
    assert_eq!(after, add_months(expires, 1).expect("months"));
    assert_eq!(renewed.entitlement.months_purchased_total, 2);
}

#[tokio::test]
async fn renewing_after_lapse_starts_from_now() {
    let h = Harness::new();
    let user = h.active_user("pro_1m").await;
    h.advance_days(40);
    let renewed = h
        .services
        .engine
        .renew(user, "pro_1m", None)
        .await
        .expect("renew");
    assert_eq!(
        renewed.entitlement.expires_at,
        Some(add_months(h.now(), 1).expect("months"))
    );
}

#[tokio::test]
async fn renewal_keeps_freeze_allowance_cycle() {
    let h = Harness::new();
    let user = h.active_user("pro_3m").await;
    h.services.engine.freeze(user).await.expect("freeze");
    h.advance_days(2);
    h.services
        .engine
        .unfreeze(user, FreezeCloseReason::ManualUnfreeze)
        .await
        .expect("unfreeze");

    let renewed = h
        .services
        .engine
        .renew(user, "pro_12m", None)
        .await
        .expect("renew");
    assert_eq!(renewed.entitlement.freeze.tokens_used, 1);
    assert_eq!(renewed.entitlement.freeze.days_used, 2);
    assert_eq!(renewed.entitlement.freeze.tokens_total, 1);
}

#[tokio::test]
async fn tier_ordering_is_enforced() {
    let h = Harness::new();
    let user = h.active_user("pro_1m").await;

    for product in ["elite_1m", "basic_1m"] {
        let err = h
            .services
            .engine
            .renew(user, product, None)
            .await
            .expect_err("renew across tiers");
        assert!(matches!(err, AppError::TierMismatch { .. }), "{product}");
    }
    for product in ["pro_12m", "basic_12m"] {
        let err = h
            .services
            .engine
            .upgrade(user, product, None)
            .await
            .expect_err("not an upgrade");
        assert!(matches!(err, AppError::NotAnUpgrade { .. }), "{product}");
    }

    let err = h
        .services
        .engine
        .activate(user, "elite_1m", None)
        .await
        .expect_err("already active");
    assert!(matches!(err, AppError::AlreadyActive));
}

#[tokio::test]
async fn upgrade_converts_remaining_value_and_resets_allowance() {
    let h = Harness::new();
    let user = h.active_user("pro_3m").await;
    h.services.engine.freeze(user).await.expect("freeze");
    h.advance_days(4);
    h.services
        .engine
        .unfreeze(user, FreezeCloseReason::ManualUnfreeze)
        .await
        .expect("unfreeze");

    let current = h.services.engine.get(user).await.expect("get");
    let now = h.now();
    let upgraded = h
        .services
        .engine
        .upgrade(user, "elite_3m", None)
        .await
        .expect("upgrade");

    let proration = upgraded.proration.expect("proration");
    // Jun 6 minus Mar 6 at the same hour.
    assert_eq!(proration.remaining_days, 92);
    // floor(92 × 8000 / 14000)
    assert_eq!(proration.bonus_days, 52);
    assert!(
        (proration.bonus_days as f64)
            <= proration.remaining_days as f64 * 8_000.0 / 14_000.0
    );
    assert_eq!(proration.old_price_cents, current.price_paid_cents);

    let ent = upgraded.entitlement;
    assert_eq!(ent.tier, Tier::Elite);
    assert_eq!(
        ent.expires_at,
        Some(add_days(add_months(now, 3).expect("months"), 52))
    );
    assert_eq!(ent.freeze.tokens_total, 2);
    assert_eq!(ent.freeze.tokens_used, 0);
    assert_eq!(ent.freeze.days_used, 0);
    assert_eq!(ent.price_paid_cents, 14_000);
}

#[tokio::test]
async fn upgrade_into_a_longer_plan_is_bounded_by_the_price_ratio() {
    let h = Harness::new();
    let user = h.active_user("pro_1m").await;
    let now = h.now();

    let upgraded = h
        .services
        .engine
        .upgrade(user, "elite_3m", None)
        .await
        .expect("upgrade");
    let proration = upgraded.proration.expect("proration");
    assert_eq!(proration.old_price_cents, 3_000);
    assert_eq!(proration.new_price_cents, 14_000);
    assert_eq!(
        proration.bonus_days,
        proration.remaining_days * 3_000 / 14_000
    );
    assert!(
        (proration.bonus_days as f64)
            <= proration.remaining_days as f64 * 3_000.0 / 14_000.0
    );
    assert_eq!(
        upgraded.entitlement.expires_at,
        Some(add_days(
            add_months(now, 3).expect("months"),
            proration.bonus_days
        ))
    );
}

#[tokio::test]
async fn upgrade_is_refused_while_frozen() {
    let h = Harness::new();
    let user = h.active_user("pro_3m").await;
    h.services.engine.freeze(user).await.expect("freeze");
    let err = h
        .services
        .engine
        .upgrade(user, "elite_1m", None)
        .await
        .expect_err("frozen");
    assert!(matches!(err, AppError::FrozenSubscription));
}

#[tokio::test]
async fn expiry_flips_status_but_keeps_tier() {
    let h = Harness::new();
    let user = h.active_user("pro_1m").await;

    let err = h.services.engine.expire(user).await.expect_err("not yet");
    assert!(matches!(err, AppError::NotYetExpired));

    h.advance_days(31);
    let expired = h.services.engine.expire(user).await.expect("expire");
    assert_eq!(expired.status, SubscriptionStatus::Inactive);
    assert_eq!(expired.tier, Tier::Pro);
    assert!(!h
        .services
        .engine
        .has_access(user, Tier::Basic)
        .await
        .expect("access"));
}

#[tokio::test]
async fn frozen_subscriptions_cannot_expire() {
    let h = Harness::new();
    let user = h.active_user("elite_3m").await;
    h.services.engine.freeze(user).await.expect("freeze");
    h.advance_days(120);
    let err = h.services.engine.expire(user).await.expect_err("frozen");
    assert!(matches!(err, AppError::FrozenSubscription));
}

#[tokio::test]
async fn auto_unfreeze_waits_for_frozen_until() {
    let h = Harness::new();
    let user = h.active_user("elite_3m").await;
    h.services.engine.freeze(user).await.expect("freeze");

    h.advance_days(13);
    assert!(h
        .services
        .engine
        .check_and_auto_unfreeze(user)
        .await
        .expect("check")
        .is_none());

    h.advance_days(1);
    let result = h
        .services
        .engine
        .check_and_auto_unfreeze(user)
        .await
        .expect("check")
        .expect("due");
    assert_eq!(result.charged_days, 14);
    assert_eq!(result.reason, FreezeCloseReason::DaysExhausted);
    let history = h.services.engine.freeze_history(user).await.expect("history");
    assert_eq!(history[0].reason, Some(FreezeCloseReason::DaysExhausted));
}

#[tokio::test]
async fn cancel_closes_an_open_freeze() {
    let h = Harness::new();
    let user = h.active_user("elite_3m").await;
    h.services.engine.freeze(user).await.expect("freeze");
    h.advance_days(3);

    let cancelled = h.services.engine.cancel(user).await.expect("cancel");
    assert_eq!(cancelled.status, SubscriptionStatus::Inactive);
    assert!(!cancelled.freeze.is_frozen);
    assert_eq!(cancelled.freeze.days_used, 3);

    let history = h.services.engine.freeze_history(user).await.expect("history");
    assert_eq!(history[0].reason, Some(FreezeCloseReason::Admin));
    assert_eq!(history[0].days_used, Some(3));

    let err = h.services.engine.cancel(user).await.expect_err("inactive");
    assert!(matches!(err, AppError::NotActive));
}

#[tokio::test]
async fn access_checks_tier_status_and_freeze() {
    let h = Harness::new();
    let user = h.active_user("pro_3m").await;
    let engine = &h.services.engine;

    assert!(engine.has_access(user, Tier::Basic).await.expect("access"));
    assert!(engine.has_access(user, Tier::Pro).await.expect("access"));
    assert!(!engine.has_access(user, Tier::Elite).await.expect("access"));

    engine.freeze(user).await.expect("freeze");
    assert!(!engine.has_access(user, Tier::Basic).await.expect("access"));

    let stranger = Uuid::new_v4();
    assert!(!engine.has_access(stranger, Tier::Basic).await.expect("access"));
}

#[tokio::test]
async fn auto_renew_needs_linked_method_near_expiry() {
    let h = Harness::new();
    let user = h.active_user("pro_1m").await;
    let engine = &h.services.engine;

    h.advance_days(29);
    assert!(!engine.auto_renew_eligible(user).await.expect("eligible"));

    let linked = engine
        .set_payment_method_linked(user, true)
        .await
        .expect("link");
    assert!(linked.payment_method_linked);
    assert!(engine.auto_renew_eligible(user).await.expect("eligible"));
}

#[tokio::test]
async fn replayed_payment_reference_is_a_no_op() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let engine = &h.services.engine;

    let first = engine
        .activate(user, "pro_1m", Some("pay_1"))
        .await
        .expect("activate");
    assert!(!first.duplicate);

    let replay = engine
        .activate(user, "pro_1m", Some("pay_1"))
        .await
        .expect("replay is not an error");
    assert!(replay.duplicate);
    assert_eq!(replay.entitlement, first.entitlement);

    let renew_replay = engine
        .renew(user, "pro_1m", Some("pay_1"))
        .await
        .expect("replay");
    assert!(renew_replay.duplicate);
    assert_eq!(renew_replay.entitlement.months_purchased_total, 1);
}

#[tokio::test]
async fn ensure_is_idempotent() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let first = h.services.engine.ensure(user).await.expect("ensure");
    h.advance_days(1);
    let second = h.services.engine.ensure(user).await.expect("ensure");
    assert_eq!(first, second);
    assert_eq!(first.status, SubscriptionStatus::Inactive);
    assert_eq!(first.tier, Tier::Free);
}

#[tokio::test]
async fn unknown_product_is_rejected() {
    let h = Harness::new();
    let err = h
        .services
        .engine
        .activate(Uuid::new_v4(), "platinum_1m", None)
        .await
        .expect_err("unknown");
    assert!(matches!(err, AppError::ProductNotFound(_)));
}

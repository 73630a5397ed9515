mod common;

use common::Harness;
use fitpass_api::error::AppError;
use fitpass_api::models::{ReferralOutcome, TransactionKind};
use uuid::Uuid;

#[tokio::test]
async fn code_is_stable_per_user() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let first = h
        .services
        .referrals
        .referral_code(user, Some("Dana".into()))
        .await
        .expect("code");
    let second = h
        .services
        .referrals
        .referral_code(user, None)
        .await
        .expect("code");
    assert_eq!(first, second);
    assert_eq!(first.code.len(), 8);
    assert_eq!(first.display_name, "Dana");
}

#[tokio::test]
async fn codes_validate_case_insensitively() {
    let h = Harness::new();
    let owner = Uuid::new_v4();
    let code = h
        .services
        .referrals
        .referral_code(owner, Some("Dana".into()))
        .await
        .expect("code");

    let preview = h
        .services
        .referrals
        .validate_referral_code(&format!("  {}  ", code.code.to_lowercase()))
        .await
        .expect("validate");
    assert!(preview.valid);
    assert_eq!(preview.referrer_display_name.as_deref(), Some("Dana"));

    let unknown = h
        .services
        .referrals
        .validate_referral_code("NOPE2345")
        .await
        .expect("validate");
    assert!(!unknown.valid);
}

#[tokio::test]
async fn signup_bonus_is_credited_once_per_referee() {
    let h = Harness::new();
    let referrer = Uuid::new_v4();
    let referee = Uuid::new_v4();
    let code = h
        .services
        .referrals
        .referral_code(referrer, None)
        .await
        .expect("code")
        .code;

    let outcome = h
        .services
        .referrals
        .register_referral(&code, referee)
        .await
        .expect("register");
    assert!(matches!(outcome, ReferralOutcome::Registered { .. }));

    let replay = h
        .services
        .referrals
        .register_referral(&code, referee)
        .await
        .expect("replay");
    assert!(matches!(replay, ReferralOutcome::AlreadyRegistered { .. }));

    assert_eq!(h.services.ledger.balance(referrer).await.expect("balance"), 500);
    assert_eq!(h.store.transaction_count(referrer), 1);

    let stats = h
        .services
        .referrals
        .referral_stats(referrer)
        .await
        .expect("stats");
    assert_eq!(stats.referee_count, 1);
    assert_eq!(stats.lifetime_referral_bonus, 500);
    assert_eq!(stats.code.as_deref(), Some(code.as_str()));
}

#[tokio::test]
async fn a_referee_has_at_most_one_referrer() {
    let h = Harness::new();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let referee = Uuid::new_v4();
    let referrals = &h.services.referrals;

    let first_code = referrals.referral_code(first, None).await.expect("code").code;
    let second_code = referrals.referral_code(second, None).await.expect("code").code;

    referrals
        .register_referral(&first_code, referee)
        .await
        .expect("register");
    let err = referrals
        .register_referral(&second_code, referee)
        .await
        .expect_err("second referrer");
    assert!(matches!(err, AppError::AlreadyReferred));

    assert_eq!(h.services.ledger.balance(first).await.expect("balance"), 500);
    assert_eq!(h.services.ledger.balance(second).await.expect("balance"), 0);
}

#[tokio::test]
async fn self_and_unknown_referrals_are_rejected() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let referrals = &h.services.referrals;
    let code = referrals.referral_code(user, None).await.expect("code").code;

    let err = referrals
        .register_referral(&code, user)
        .await
        .expect_err("self");
    assert!(matches!(err, AppError::SelfReferral));

    let err = referrals
        .register_referral("ZZZZ9999", Uuid::new_v4())
        .await
        .expect_err("unknown");
    assert!(matches!(err, AppError::InvalidReferralCode));
    assert_eq!(h.store.transaction_count(user), 0);
}

#[tokio::test]
async fn retry_after_failed_credit_pays_exactly_once() {
    let h = Harness::new();
    let referrer = Uuid::new_v4();
    let referee = Uuid::new_v4();
    let referrals = &h.services.referrals;
    let code = referrals.referral_code(referrer, None).await.expect("code").code;

    h.store.fail_ledger_writes(true);
    let err = referrals
        .register_referral(&code, referee)
        .await
        .expect_err("ledger down");
    assert!(err.is_retryable());
    h.store.fail_ledger_writes(false);

    for _ in 0..2 {
        let outcome = referrals
            .register_referral(&code, referee)
            .await
            .expect("retry");
        assert!(matches!(outcome, ReferralOutcome::AlreadyRegistered { .. }));
    }
    assert_eq!(h.services.ledger.balance(referrer).await.expect("balance"), 500);
    assert_eq!(h.store.transaction_count(referrer), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_credit_once() {
    let h = Harness::new();
    let referrer = Uuid::new_v4();
    let referee = Uuid::new_v4();
    let code = h
        .services
        .referrals
        .referral_code(referrer, None)
        .await
        .expect("code")
        .code;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let referrals = h.services.referrals.clone();
            let code = code.clone();
            tokio::spawn(async move { referrals.register_referral(&code, referee).await })
        })
        .collect();

    let mut registered = 0;
    for handle in handles {
        if let ReferralOutcome::Registered { .. } = handle.await.expect("join").expect("register") {
            registered += 1;
        }
    }
    assert_eq!(registered, 1);
    assert_eq!(h.services.ledger.balance(referrer).await.expect("balance"), 500);
}

#[tokio::test]
async fn purchase_commission_follows_referrer_level() {
    let h = Harness::new();
    let referrer = Uuid::new_v4();
    let referee = Uuid::new_v4();
    let referrals = &h.services.referrals;
    let code = referrals.referral_code(referrer, None).await.expect("code").code;
    referrals
        .register_referral(&code, referee)
        .await
        .expect("register");

    // 500 lifetime referral points keeps the referrer at the 10% level.
    let receipt = referrals
        .reward_referee_purchase(referee, 3_000, "pay_77")
        .await
        .expect("commission")
        .expect("has referrer");
    assert!(receipt.applied);
    let tx = receipt.transaction.expect("transaction");
    assert_eq!(tx.amount, 300);
    assert_eq!(tx.kind, TransactionKind::ReferralPurchase);

    let again = referrals
        .reward_referee_purchase(referee, 3_000, "pay_77")
        .await
        .expect("commission")
        .expect("has referrer");
    assert!(!again.applied);

    // 800 lifetime now; another 300 crosses into the 15% level on the next purchase.
    referrals
        .reward_referee_purchase(referee, 3_000, "pay_78")
        .await
        .expect("commission");
    let receipt = referrals
        .reward_referee_purchase(referee, 3_000, "pay_79")
        .await
        .expect("commission")
        .expect("has referrer");
    assert_eq!(receipt.transaction.expect("transaction").amount, 450);

    let nobody = referrals
        .reward_referee_purchase(Uuid::new_v4(), 3_000, "pay_80")
        .await
        .expect("commission");
    assert!(nobody.is_none());
}

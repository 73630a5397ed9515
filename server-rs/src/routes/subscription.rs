use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Duration;
use serde_json::{json, Value};

use crate::clock::Clock;
use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::models::{FreezeCloseReason, PaymentMethodRequest, Tier};
use crate::services::entitlement_engine::auto_renew_eligible;
use crate::AppState;

pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    // A freeze that ran out is closed on read, not only by the sweeper.
    let mut failed_effects = Vec::new();
    if state
        .services
        .engine
        .check_and_auto_unfreeze(user.id)
        .await?
        .is_some()
    {
        state.invalidate_entitlement(user.id).await;
        failed_effects = state
            .services
            .reconcile_achievements(user.id)
            .await
            .failed_effects;
    }

    let cached = match &state.cache {
        Some(cache) => cache.entitlement(user.id).await,
        None => None,
    };
    let entitlement = match cached {
        Some(ent) => ent,
        None => {
            let ent = state.services.engine.get(user.id).await?;
            if let Some(cache) = &state.cache {
                cache.store_entitlement(&ent).await;
            }
            ent
        }
    };

    let window = Duration::days(state.services.ledger.rewards().auto_renew_window_days);
    let auto_renew = auto_renew_eligible(&entitlement, window, state.clock.now());
    Ok(Json(json!({
        "subscription": entitlement,
        "phase": entitlement.phase(),
        "freezeTokensRemaining": entitlement.freeze.tokens_remaining(),
        "freezeDaysRemaining": entitlement.freeze.days_remaining(),
        "autoRenewEligible": auto_renew,
        "failedEffects": failed_effects,
    })))
}

pub async fn freeze(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let entitlement = state.services.engine.freeze(user.id).await?;
    state.invalidate_entitlement(user.id).await;
    Ok(Json(json!({ "subscription": entitlement })))
}

pub async fn unfreeze(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let result = state
        .services
        .engine
        .unfreeze(user.id, FreezeCloseReason::ManualUnfreeze)
        .await?;
    state.invalidate_entitlement(user.id).await;
    let pass = state.services.reconcile_achievements(user.id).await;
    Ok(Json(json!({
        "subscription": result.entitlement,
        "chargedDays": result.charged_days,
        "achievements": pass.unlocked,
        "failedEffects": pass.failed_effects,
    })))
}

pub async fn set_payment_method(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<PaymentMethodRequest>,
) -> AppResult<Json<Value>> {
    let entitlement = state
        .services
        .engine
        .set_payment_method_linked(user.id, body.linked)
        .await?;
    state.invalidate_entitlement(user.id).await;
    Ok(Json(json!({ "subscription": entitlement })))
}

pub async fn freeze_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let freezes = state.services.engine.freeze_history(user.id).await?;
    Ok(Json(json!({ "freezes": freezes })))
}

pub async fn check_access(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(tier): Path<String>,
) -> AppResult<Json<Value>> {
    let tier: Tier = tier.parse()?;
    let allowed = state.services.engine.has_access(user.id, tier).await?;
    Ok(Json(json!({ "tier": tier, "hasAccess": allowed })))
}

pub async fn list_products(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let products = state.services.engine.products().await?;
    let allowances = &state.services.ledger.rewards().freeze_allowances;
    let products: Vec<Value> = products
        .into_iter()
        .map(|p| {
            let freeze = allowances.lookup(p.tier, p.duration_months);
            json!({ "product": p, "freezeAllowance": freeze })
        })
        .collect();
    Ok(Json(json!({ "products": products })))
}

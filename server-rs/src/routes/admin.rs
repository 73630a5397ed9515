use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::models::{AdjustRequest, FreezeCloseReason};
use crate::AppState;

pub async fn unfreeze_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let result = state
        .services
        .engine
        .unfreeze(user_id, FreezeCloseReason::Admin)
        .await?;
    tracing::info!(admin_id = %admin.id, %user_id, "admin unfreeze");
    state.invalidate_entitlement(user_id).await;
    let pass = state.services.reconcile_achievements(user_id).await;
    Ok(Json(json!({
        "subscription": result.entitlement,
        "chargedDays": result.charged_days,
        "achievements": pass.unlocked,
        "failedEffects": pass.failed_effects,
    })))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let entitlement = state.services.engine.cancel(user_id).await?;
    tracing::info!(admin_id = %admin.id, %user_id, "admin cancellation");
    state.invalidate_entitlement(user_id).await;
    Ok(Json(json!({ "subscription": entitlement })))
}

pub async fn adjust_bonus(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
    Json(body): Json<AdjustRequest>,
) -> AppResult<Json<Value>> {
    let receipt = state
        .services
        .ledger
        .adjust(user_id, body.amount, body.note)
        .await?;
    tracing::info!(admin_id = %admin.id, %user_id, amount = body.amount, "manual bonus adjustment");
    let verification = state.services.ledger.verify_balance(user_id).await?;
    Ok(Json(json!({ "receipt": receipt, "verification": verification })))
}

pub async fn run_sweep(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let report = state.services.sweeper.run_once().await?;
    for user_id in &report.affected {
        state.invalidate_entitlement(*user_id).await;
    }
    Ok(Json(json!({ "sweep": report })))
}

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::models::{ReferralCodeQuery, ReferralOutcome, RegisterReferralRequest};
use crate::AppState;

pub async fn get_code(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(q): Query<ReferralCodeQuery>,
) -> AppResult<Json<Value>> {
    let code = state
        .services
        .referrals
        .referral_code(user.id, q.display_name)
        .await?;
    Ok(Json(json!({ "code": code.code, "createdAt": code.created_at })))
}

pub async fn get_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let stats = state.services.referrals.referral_stats(user.id).await?;
    Ok(Json(json!({ "stats": stats })))
}

pub async fn register(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<RegisterReferralRequest>,
) -> AppResult<Json<Value>> {
    let outcome = state
        .services
        .referrals
        .register_referral(&body.code, user.id)
        .await?;
    let failed_effects = match &outcome {
        ReferralOutcome::Registered { relation } => {
            state
                .services
                .reconcile_achievements(relation.referrer_id)
                .await
                .failed_effects
        }
        ReferralOutcome::AlreadyRegistered { .. } => Vec::new(),
    };
    Ok(Json(json!({ "referral": outcome, "failedEffects": failed_effects })))
}

pub async fn validate_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> AppResult<Json<Value>> {
    let preview = state.services.referrals.validate_referral_code(&code).await?;
    Ok(Json(json!(preview)))
}

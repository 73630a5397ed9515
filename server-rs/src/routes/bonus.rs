use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::models::RedeemRequest;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn get_account(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let ledger = &state.services.ledger;
    let account = ledger.account(user.id).await?;
    Ok(Json(json!({
        "account": account,
        "cashbackLevel": ledger.cashback_progress(account.lifetime_cashback),
        "referralLevel": ledger.referral_progress(account.lifetime_referral),
    })))
}

pub async fn get_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(q): Query<PaginationQuery>,
) -> AppResult<Json<Value>> {
    let limit = q.limit.unwrap_or(20).min(50);
    let offset = q.offset.unwrap_or(0);
    let transactions = state
        .services
        .ledger
        .transactions(user.id, limit, offset)
        .await?;
    Ok(Json(json!({ "transactions": transactions })))
}

pub async fn get_levels(State(state): State<AppState>) -> Json<Value> {
    let rewards = state.services.ledger.rewards();
    Json(json!({
        "cashback": rewards.cashback_levels,
        "referral": rewards.referral_levels,
    }))
}

pub async fn redeem(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<RedeemRequest>,
) -> AppResult<Json<Value>> {
    let receipt = state
        .services
        .ledger
        .redeem(user.id, body.amount, body.reference_id)
        .await?;
    Ok(Json(json!({ "receipt": receipt })))
}

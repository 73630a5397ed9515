use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::services::PaymentConfirmation;
use crate::AppState;

/// Called by the payment webhook handler once a charge is confirmed.
/// Replays with the same `paymentRef` are successful no-ops.
pub async fn payment_confirmed(
    State(state): State<AppState>,
    Json(body): Json<PaymentConfirmation>,
) -> AppResult<Json<Value>> {
    let outcome = state.services.payments.on_payment_confirmed(&body).await?;
    state.invalidate_entitlement(body.user_id).await;
    Ok(Json(json!({ "payment": outcome })))
}

use axum::{extract::State, Extension, Json};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::AppState;

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let evaluator = &state.services.achievements;
    let unlocks = evaluator.unlocks(user.id).await?;
    let achievements: Vec<Value> = evaluator
        .catalogue()
        .iter()
        .map(|def| {
            let unlock = unlocks.iter().find(|u| u.achievement_id == def.id);
            json!({
                "id": def.id,
                "title": def.title,
                "reward": def.reward,
                "condition": def.condition,
                "unlocked": unlock.is_some(),
                "unlockedAt": unlock.map(|u| u.unlocked_at),
            })
        })
        .collect();
    Ok(Json(json!({ "achievements": achievements })))
}

pub async fn check(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let unlocked = state.services.achievements.check_and_unlock(user.id).await?;
    Ok(Json(json!({ "unlocked": unlocked })))
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited,

    // --- Entitlement preconditions ---
    #[error("Subscription is already active")]
    AlreadyActive,

    #[error("Subscription is not active")]
    NotActive,

    #[error("Subscription is already frozen")]
    AlreadyFrozen,

    #[error("Subscription is not frozen")]
    NotFrozen,

    #[error("Subscription is frozen")]
    FrozenSubscription,

    #[error("Subscription has lapsed")]
    SubscriptionLapsed,

    #[error("Subscription has not reached its expiry")]
    NotYetExpired,

    #[error("Renewal product tier {product} does not match current tier {current}")]
    TierMismatch { current: String, product: String },

    #[error("Product tier {product} is not above current tier {current}")]
    NotAnUpgrade { current: String, product: String },

    // --- Resource exhaustion ---
    #[error("Freeze allowance exhausted: no freeze tokens left")]
    FreezeTokensExhausted,

    #[error("Freeze allowance exhausted: no freeze days left")]
    FreezeDaysExhausted,

    #[error("Insufficient bonus balance: {balance} available, {requested} requested")]
    InsufficientBalance { balance: i64, requested: i64 },

    #[error("Amount must be positive")]
    InvalidAmount,

    // --- Referrals ---
    #[error("Users cannot refer themselves")]
    SelfReferral,

    #[error("User was already referred by someone else")]
    AlreadyReferred,

    #[error("Unknown referral code")]
    InvalidReferralCode,

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Concurrent modification of {0}")]
    ConcurrentModification(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by callers deciding whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Precondition,
    Exhausted,
    Transient,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::FreezeTokensExhausted
            | AppError::FreezeDaysExhausted
            | AppError::InsufficientBalance { .. }
            | AppError::RateLimited => ErrorKind::Exhausted,
            AppError::Database(_) | AppError::Redis(_) | AppError::ConcurrentModification(_) => {
                ErrorKind::Transient
            }
            AppError::Migration(_) | AppError::Internal(_) => ErrorKind::Internal,
            _ => ErrorKind::Precondition,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests".to_string(),
            ),
            AppError::ProductNotFound(_) | AppError::InvalidReferralCode => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            AppError::AlreadyActive
            | AppError::AlreadyFrozen
            | AppError::AlreadyReferred
            | AppError::NotFrozen
            | AppError::FrozenSubscription => (StatusCode::CONFLICT, self.to_string()),
            AppError::NotActive
            | AppError::SubscriptionLapsed
            | AppError::NotYetExpired
            | AppError::TierMismatch { .. }
            | AppError::NotAnUpgrade { .. }
            | AppError::FreezeTokensExhausted
            | AppError::FreezeDaysExhausted
            | AppError::InsufficientBalance { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            AppError::InvalidAmount | AppError::SelfReferral => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::ConcurrentModification(what) => {
                tracing::warn!("Gave up after concurrent modification of {what}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Temporary failure, please retry".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Temporary failure, please retry".to_string(),
                )
            }
            AppError::Redis(e) => {
                tracing::error!("Redis error: {e}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Temporary failure, please retry".to_string(),
                )
            }
            AppError::Jwt(_) => (StatusCode::UNAUTHORIZED, "Invalid token".to_string()),
            AppError::Migration(e) => {
                tracing::error!("Migration error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failures_are_retryable_and_preconditions_are_not() {
        assert!(AppError::ConcurrentModification("entitlement".into()).is_retryable());
        assert!(!AppError::AlreadyFrozen.is_retryable());
        assert_eq!(AppError::FreezeDaysExhausted.kind(), ErrorKind::Exhausted);
        assert_eq!(AppError::SelfReferral.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn exhaustion_messages_are_actionable() {
        assert_eq!(
            AppError::FreezeTokensExhausted.to_string(),
            "Freeze allowance exhausted: no freeze tokens left"
        );
        let e = AppError::InsufficientBalance {
            balance: 5,
            requested: 10,
        };
        assert!(e.to_string().contains("5 available"));
    }
}

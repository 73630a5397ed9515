use axum::{extract::Request, middleware::Next, response::Response};

use crate::error::AppError;
use crate::middleware::auth::AuthUser;

/// Roles allowed to drive payments, sweeps and manual corrections.
const PRIVILEGED_ROLES: [&str; 2] = ["admin", "service"];

pub fn is_privileged(user: &AuthUser) -> bool {
    user.role
        .as_deref()
        .is_some_and(|role| PRIVILEGED_ROLES.contains(&role))
}

/// Middleware: requires `authenticate` to have run and the token to carry
/// the `admin` or `service` role.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    let user = req
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;

    if !is_privileged(user) {
        tracing::warn!(user_id = %user.id, role = ?user.role, "privileged route refused");
        return Err(AppError::Forbidden("Requires admin or service role".into()));
    }

    Ok(next.run(req).await)
}

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use cache::Cache;
use clock::Clock;
use config::Config;
use middleware::rate_limit::RateLimiter;
use services::Services;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub db: Option<sqlx::PgPool>,
    pub cache: Option<Cache>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub async fn invalidate_entitlement(&self, user_id: Uuid) {
        if let Some(cache) = &self.cache {
            cache.invalidate_entitlement(user_id).await;
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn build_router(state: AppState) -> Router {
    let subscription_routes = Router::new()
        .route("/", get(routes::subscription::get_subscription))
        .route("/freeze", post(routes::subscription::freeze))
        .route("/unfreeze", post(routes::subscription::unfreeze))
        .route(
            "/payment-method",
            post(routes::subscription::set_payment_method),
        )
        .route("/freezes", get(routes::subscription::freeze_history))
        .route("/access/:tier", get(routes::subscription::check_access))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    let bonus_routes = Router::new()
        .route("/account", get(routes::bonus::get_account))
        .route("/transactions", get(routes::bonus::get_transactions))
        .route("/levels", get(routes::bonus::get_levels))
        .route("/redeem", post(routes::bonus::redeem))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    let referral_routes = Router::new()
        .route("/code", get(routes::referrals::get_code))
        .route("/stats", get(routes::referrals::get_stats))
        .route("/register", post(routes::referrals::register))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ))
        .route("/validate/:code", get(routes::referrals::validate_code));

    let achievement_routes = Router::new()
        .route("/", get(routes::achievements::list))
        .route("/check", post(routes::achievements::check))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    let privileged_routes = Router::new()
        .route("/payments/confirmed", post(routes::payments::payment_confirmed))
        .route(
            "/admin/subscriptions/:userId/unfreeze",
            post(routes::admin::unfreeze_user),
        )
        .route(
            "/admin/subscriptions/:userId/cancel",
            post(routes::admin::cancel_subscription),
        )
        .route("/admin/bonus/:userId/adjust", post(routes::admin::adjust_bonus))
        .route("/jobs/sweep", post(routes::admin::run_sweep))
        .layer(axum_mw::from_fn(middleware::admin::require_admin))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    let api = Router::new()
        .nest("/subscription", subscription_routes)
        .nest("/bonus", bonus_routes)
        .nest("/referrals", referral_routes)
        .nest("/achievements", achievement_routes)
        .route("/products", get(routes::subscription::list_products))
        .merge(privileged_routes);

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(routes::health::health))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

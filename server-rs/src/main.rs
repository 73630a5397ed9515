use std::net::SocketAddr;
use std::sync::Arc;

use fitpass_api::cache::Cache;
use fitpass_api::clock::{Clock, SystemClock};
use fitpass_api::config::{Config, RewardsConfig, StorageBackend};
use fitpass_api::error::AppResult;
use fitpass_api::middleware::rate_limit::RateLimiter;
use fitpass_api::services::Services;
use fitpass_api::store::{MemoryStore, PgStore};
use fitpass_api::{build_router, db, AppState};

#[tokio::main]
async fn main() -> AppResult<()> {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .json()
        .init();

    let rewards = Arc::new(RewardsConfig::from_env()?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (services, pool) = match config.storage {
        StorageBackend::Postgres => {
            let pool = db::create_pool(&config).await?;
            db::run_migrations(&pool).await?;
            let services = Services::new(PgStore::new(pool.clone()), clock.clone(), rewards);
            (services, Some(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage; state is lost on restart");
            (Services::new(MemoryStore::new(), clock.clone(), rewards), None)
        }
    };

    let cache = if config.redis.enabled {
        match Cache::new(&config).await {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(error = %e, "redis unavailable, entitlement cache disabled");
                None
            }
        }
    } else {
        None
    };

    let rate_limiter =
        RateLimiter::new(config.rate_limit.max_requests, config.rate_limit.window_secs);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let state = AppState {
        services,
        config: Arc::new(config),
        clock,
        db: pool,
        cache,
        rate_limiter,
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| fitpass_api::error::AppError::Internal(format!("Cannot bind {addr}: {e}")))?;
    tracing::info!(%addr, "fitpass API listening");

    axum::serve(
        listener,
        build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| fitpass_api::error::AppError::Internal(format!("Server error: {e}")))?;
    Ok(())
}

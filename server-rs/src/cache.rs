use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppResult;
use crate::models::SubscriberEntitlement;

/// Optional Redis read-through cache for entitlement reads. Every operation
/// is best effort: a Redis failure behaves like a miss.
#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
    prefix: String,
    entitlement_ttl_secs: u64,
}

impl Cache {
    pub async fn new(config: &Config) -> AppResult<Self> {
        let client = Client::open(config.redis_url())?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            prefix: config.redis.key_prefix.clone(),
            entitlement_ttl_secs: config.redis.entitlement_ttl_secs,
        })
    }

    fn key(&self, k: &str) -> String {
        format!("{}{}", self.prefix, k)
    }

    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone();
        let raw = conn
            .get::<_, Option<String>>(self.key(key))
            .await
            .ok()
            .flatten();
        raw.and_then(|s| serde_json::from_str(&s).ok())
    }

    pub async fn set_json<T: serde::Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let Ok(json) = serde_json::to_string(value) else {
            return;
        };
        let mut conn = self.conn.clone();
        let result: Result<(), _> = conn.set_ex(self.key(key), json, ttl_secs).await;
        if let Err(e) = result {
            tracing::debug!(key, error = %e, "cache write failed");
        }
    }

    pub async fn del(&self, key: &str) {
        let mut conn = self.conn.clone();
        let result: Result<(), _> = conn.del(self.key(key)).await;
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "cache invalidation failed");
        }
    }

    pub async fn entitlement(&self, user_id: Uuid) -> Option<SubscriberEntitlement> {
        self.get_json(&entitlement_key(user_id)).await
    }

    pub async fn store_entitlement(&self, entitlement: &SubscriberEntitlement) {
        self.set_json(
            &entitlement_key(entitlement.user_id),
            entitlement,
            self.entitlement_ttl_secs,
        )
        .await;
    }

    pub async fn invalidate_entitlement(&self, user_id: Uuid) {
        self.del(&entitlement_key(user_id)).await;
    }

    pub async fn health_check(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }
}

pub fn entitlement_key(user_id: Uuid) -> String {
    format!("entitlement:{user_id}")
}

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use fitpass_api::clock::{Clock, ManualClock};
use fitpass_api::config::RewardsConfig;
use fitpass_api::models::{Product, Tier};
use fitpass_api::services::Services;
use fitpass_api::store::MemoryStore;
use uuid::Uuid;

pub struct Harness {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub services: Services,
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .single()
        .expect("valid start time")
}

fn product(id: &str, tier: Tier, duration_months: u32, price_cents: i64) -> Product {
    Product {
        id: id.to_string(),
        title: id.replace('_', " "),
        tier,
        duration_months,
        price_cents,
    }
}

pub fn catalog() -> Vec<Product> {
    vec![
        product("basic_1m", Tier::Basic, 1, 1_000),
        product("basic_12m", Tier::Basic, 12, 10_000),
        product("pro_1m", Tier::Pro, 1, 3_000),
        product("pro_3m", Tier::Pro, 3, 8_000),
        product("pro_12m", Tier::Pro, 12, 30_000),
        product("elite_1m", Tier::Elite, 1, 5_000),
        product("elite_3m", Tier::Elite, 3, 14_000),
    ]
}

impl Harness {
    pub fn new() -> Self {
        Self::with_rewards(RewardsConfig::default())
    }

    pub fn with_rewards(rewards: RewardsConfig) -> Self {
        let store = MemoryStore::new();
        store.seed_products(catalog());
        let clock = Arc::new(ManualClock::new(t0()));
        let services = Services::new(store.clone(), clock.clone(), Arc::new(rewards));
        Self {
            store,
            clock,
            services,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn advance_days(&self, days: i64) {
        self.clock.advance(Duration::days(days));
    }

    pub async fn active_user(&self, product_id: &str) -> Uuid {
        let user = Uuid::new_v4();
        self.services
            .engine
            .activate(user, product_id, None)
            .await
            .expect("activate");
        user
    }

    /// Diary entries for `days` consecutive days ending today.
    pub fn diary_streak(&self, user: Uuid, days: i64) {
        let today = self.clock.today();
        for back in 0..days {
            self.store
                .record_diary_entry(user, today - Duration::days(back));
        }
    }
}

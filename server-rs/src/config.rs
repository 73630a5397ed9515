use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::{
    AchievementCondition, AchievementDefinition, FreezeAllowance, LevelTable, LevelThreshold, Tier,
};

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub storage: StorageBackend,
    pub db: DbConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub pool_min: u32,
    pub pool_max: u32,
}

#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u8,
    pub key_prefix: String,
    pub entitlement_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub secret: String,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_or_parse("PORT", 3000),
            cors_origins: env_or("CORS_ORIGINS", "http://localhost:3000")
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            storage: match env_or("STORAGE_BACKEND", "postgres").as_str() {
                "memory" => StorageBackend::Memory,
                _ => StorageBackend::Postgres,
            },
            db: DbConfig {
                host: env_or("DB_HOST", "localhost"),
                port: env_or_parse("DB_PORT", 5432),
                database: env_or("DB_NAME", "fitpass"),
                user: env_or("DB_USER", "fitpass"),
                password: env_or("DB_PASSWORD", ""),
                pool_min: env_or_parse("DB_POOL_MIN", 2),
                pool_max: env_or_parse("DB_POOL_MAX", 20),
            },
            redis: RedisConfig {
                enabled: env_or_parse("CACHE_ENABLED", false),
                host: env_or("REDIS_HOST", "localhost"),
                port: env_or_parse("REDIS_PORT", 6379),
                password: env::var("REDIS_PASSWORD").ok().filter(|s| !s.is_empty()),
                db: env_or_parse("REDIS_DB", 0),
                key_prefix: "fitpass:".to_string(),
                entitlement_ttl_secs: env_or_parse("ENTITLEMENT_CACHE_SEC", 60),
            },
            jwt: JwtConfig {
                secret: env_or("JWT_SECRET", "change-me-to-a-secure-random-string"),
            },
            rate_limit: RateLimitConfig {
                window_secs: 60,
                max_requests: env_or_parse("RATE_LIMIT_MAX", 100),
            },
        }
    }

    pub fn database_url(&self) -> String {
        if let Ok(url) = env::var("DATABASE_URL") {
            return url;
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db.user, self.db.password, self.db.host, self.db.port, self.db.database
        )
    }

    pub fn redis_url(&self) -> String {
        if let Ok(url) = env::var("REDIS_URL") {
            return url;
        }
        match &self.redis.password {
            Some(pw) if !pw.is_empty() => format!(
                "redis://:{}@{}:{}/{}",
                pw, self.redis.host, self.redis.port, self.redis.db
            ),
            _ => format!(
                "redis://{}:{}/{}",
                self.redis.host, self.redis.port, self.redis.db
            ),
        }
    }
}

/// Freeze allowance granted by a tier × duration purchase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreezeAllowanceEntry {
    pub tier: Tier,
    pub min_duration_months: u32,
    pub tokens: u32,
    pub days: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FreezeAllowanceTable {
    entries: Vec<FreezeAllowanceEntry>,
}

impl FreezeAllowanceTable {
    pub fn new(entries: Vec<FreezeAllowanceEntry>) -> Self {
        Self { entries }
    }

    /// The entry with the longest qualifying duration wins; no entry means no allowance.
    pub fn lookup(&self, tier: Tier, duration_months: u32) -> FreezeAllowance {
        self.entries
            .iter()
            .filter(|e| e.tier == tier && e.min_duration_months <= duration_months)
            .max_by_key(|e| e.min_duration_months)
            .map(|e| FreezeAllowance {
                tokens: e.tokens,
                days: e.days,
            })
            .unwrap_or_default()
    }

    fn validate(&self) -> AppResult<()> {
        for (i, e) in self.entries.iter().enumerate() {
            if e.min_duration_months == 0 {
                return Err(AppError::Internal(format!(
                    "Freeze allowance for {} has a zero duration",
                    e.tier
                )));
            }
            if self.entries[..i]
                .iter()
                .any(|p| p.tier == e.tier && p.min_duration_months == e.min_duration_months)
            {
                return Err(AppError::Internal(format!(
                    "Duplicate freeze allowance for {} / {} months",
                    e.tier, e.min_duration_months
                )));
            }
        }
        Ok(())
    }
}

/// Reward rates, thresholds and the achievement catalogue. Loaded once at
/// startup and shared read-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RewardsConfig {
    pub freeze_allowances: FreezeAllowanceTable,
    pub cashback_levels: LevelTable,
    pub referral_levels: LevelTable,
    pub referral_signup_bonus: i64,
    pub max_transition_attempts: u32,
    pub auto_renew_window_days: i64,
    pub achievements: Vec<AchievementDefinition>,
}

fn level(name: &str, threshold: i64, rate_bps: u32) -> LevelThreshold {
    LevelThreshold {
        name: name.to_string(),
        threshold,
        rate_bps,
    }
}

fn allowance(tier: Tier, min_duration_months: u32, tokens: u32, days: u32) -> FreezeAllowanceEntry {
    FreezeAllowanceEntry {
        tier,
        min_duration_months,
        tokens,
        days,
    }
}

fn achievement(id: &str, title: &str, reward: i64, condition: AchievementCondition) -> AchievementDefinition {
    AchievementDefinition {
        id: id.to_string(),
        title: title.to_string(),
        reward,
        condition,
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        use AchievementCondition::*;

        Self {
            freeze_allowances: FreezeAllowanceTable::new(vec![
                allowance(Tier::Basic, 3, 1, 7),
                allowance(Tier::Basic, 6, 2, 14),
                allowance(Tier::Basic, 12, 3, 30),
                allowance(Tier::Pro, 3, 1, 10),
                allowance(Tier::Pro, 6, 2, 21),
                allowance(Tier::Pro, 12, 4, 45),
                allowance(Tier::Elite, 3, 2, 14),
                allowance(Tier::Elite, 6, 3, 30),
                allowance(Tier::Elite, 12, 5, 60),
            ]),
            cashback_levels: LevelTable::new_unchecked(vec![
                level("starter", 0, 300),
                level("regular", 1_000, 500),
                level("loyal", 5_000, 700),
                level("legend", 20_000, 1_000),
            ]),
            referral_levels: LevelTable::new_unchecked(vec![
                level("friend", 0, 1_000),
                level("ambassador", 1_000, 1_500),
                level("partner", 5_000, 2_000),
            ]),
            referral_signup_bonus: 500,
            max_transition_attempts: 5,
            auto_renew_window_days: 3,
            achievements: vec![
                achievement("first_subscription", "First membership", 50, MonthsSubscribed { at_least: 1 }),
                achievement("half_year", "Six months strong", 200, MonthsSubscribed { at_least: 6 }),
                achievement("pro_member", "Going pro", 150, TierReached { tier: Tier::Pro }),
                achievement("elite_member", "Elite", 300, TierReached { tier: Tier::Elite }),
                achievement("first_freeze", "Well rested", 0, FreezesCompleted { at_least: 1 }),
                achievement("first_referral", "Bring a friend", 100, ReferralCount { at_least: 1 }),
                achievement("five_referrals", "Squad goals", 500, ReferralCount { at_least: 5 }),
                achievement("cashback_collector", "Cashback collector", 100, CashbackTotal { at_least: 1_000 }),
                achievement("week_streak", "Seven day streak", 70, DiaryStreak { days: 7 }),
                achievement("month_streak", "Thirty day streak", 300, DiaryStreak { days: 30 }),
                achievement("hundred_entries", "Hundred entries", 200, DiaryEntries { at_least: 100 }),
            ],
        }
    }
}

impl RewardsConfig {
    /// Defaults, or the JSON file at `REWARDS_CONFIG_PATH` when set.
    pub fn from_env() -> AppResult<Self> {
        let config = match env::var("REWARDS_CONFIG_PATH").ok().filter(|p| !p.is_empty()) {
            Some(path) => {
                let raw = std::fs::read_to_string(&path).map_err(|e| {
                    AppError::Internal(format!("Cannot read rewards config {path}: {e}"))
                })?;
                Self::from_json(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> AppResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| AppError::Internal(format!("Invalid rewards config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.freeze_allowances.validate()?;
        self.cashback_levels.validate()?;
        self.referral_levels.validate()?;
        if self.referral_signup_bonus < 0 {
            return Err(AppError::Internal("Referral signup bonus is negative".into()));
        }
        if self.max_transition_attempts == 0 {
            return Err(AppError::Internal("max_transition_attempts must be at least 1".into()));
        }
        for (i, a) in self.achievements.iter().enumerate() {
            if self.achievements[..i].iter().any(|p| p.id == a.id) {
                return Err(AppError::Internal(format!("Duplicate achievement '{}'", a.id)));
            }
            if a.reward < 0 {
                return Err(AppError::Internal(format!(
                    "Achievement '{}' has a negative reward",
                    a.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_month_products_grant_no_freeze_allowance() {
        let table = RewardsConfig::default().freeze_allowances;
        assert_eq!(table.lookup(Tier::Pro, 1), FreezeAllowance::default());
    }

    #[test]
    fn longest_qualifying_duration_wins() {
        let table = RewardsConfig::default().freeze_allowances;
        assert_eq!(table.lookup(Tier::Basic, 6), FreezeAllowance { tokens: 2, days: 14 });
        assert_eq!(table.lookup(Tier::Basic, 9), FreezeAllowance { tokens: 2, days: 14 });
        assert_eq!(table.lookup(Tier::Elite, 24), FreezeAllowance { tokens: 5, days: 60 });
        assert_eq!(table.lookup(Tier::Free, 12), FreezeAllowance::default());
    }

    #[test]
    fn defaults_validate() {
        RewardsConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_sections() {
        let config = RewardsConfig::from_json(r#"{ "referralSignupBonus": 250 }"#).unwrap();
        assert_eq!(config.referral_signup_bonus, 250);
        assert_eq!(config.max_transition_attempts, 5);
        assert!(!config.achievements.is_empty());
    }

    #[test]
    fn negative_achievement_rewards_are_rejected() {
        let mut config = RewardsConfig::default();
        config.achievements[0].reward = -10;
        assert!(config.validate().is_err());

        let raw = r#"{ "achievements": [
            { "id": "x", "title": "X", "reward": -1,
              "condition": { "type": "referral_count", "at_least": 1 } }
        ] }"#;
        assert!(RewardsConfig::from_json(raw).is_err());
    }

    #[test]
    fn json_with_bad_level_table_is_rejected() {
        let raw = r#"{ "cashbackLevels": [ { "name": "a", "threshold": 5 } ] }"#;
        assert!(RewardsConfig::from_json(raw).is_err());
    }
}

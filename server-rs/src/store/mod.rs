//! Storage seams. Each component owns one trait; `MemoryStore` and `PgStore`
//! implement all of them. Every method is atomic on its own.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    AchievementUnlock, AppendOutcome, BonusAccount, BonusTransaction, FreezeRecord, NewTransaction,
    Product, ReferralCode, ReferralRelation, RelationInsert, SaveEffects, SaveOutcome,
    SubscriberEntitlement,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn load_entitlement(&self, user_id: Uuid) -> AppResult<Option<SubscriberEntitlement>>;

    /// Inserts an inactive record if none exists and returns the stored one.
    async fn ensure_entitlement(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<SubscriberEntitlement>;

    /// Writes `next` only if the stored version still equals `expected_version`,
    /// applying `effects` in the same atomic step.
    async fn save_entitlement(
        &self,
        next: &SubscriberEntitlement,
        expected_version: u64,
        effects: SaveEffects,
    ) -> AppResult<SaveOutcome>;

    async fn is_payment_applied(&self, payment_ref: &str) -> AppResult<bool>;

    async fn freeze_history(&self, user_id: Uuid) -> AppResult<Vec<FreezeRecord>>;

    async fn due_for_unfreeze(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>>;

    async fn due_for_expiry(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn ensure_account(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<BonusAccount>;

    async fn account(&self, user_id: Uuid) -> AppResult<Option<BonusAccount>>;

    /// Appends unless the idempotency key was seen or the balance would go
    /// negative. Creates the account on first touch.
    async fn append(&self, entry: NewTransaction) -> AppResult<AppendOutcome>;

    /// Balance recomputed from the transaction log alone.
    async fn ledger_sum(&self, user_id: Uuid) -> AppResult<i64>;

    async fn transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<BonusTransaction>>;
}

#[async_trait]
pub trait ReferralStore: Send + Sync {
    async fn code_for_user(&self, user_id: Uuid) -> AppResult<Option<ReferralCode>>;

    /// False when the code string is taken or the user already owns a code.
    async fn insert_code(&self, code: &ReferralCode) -> AppResult<bool>;

    async fn find_code(&self, code: &str) -> AppResult<Option<ReferralCode>>;

    /// Keyed on the referee: a second insert returns the existing relation.
    async fn insert_relation(&self, relation: &ReferralRelation) -> AppResult<RelationInsert>;

    async fn relation_for_referee(&self, referee_id: Uuid) -> AppResult<Option<ReferralRelation>>;

    async fn referee_count(&self, referrer_id: Uuid) -> AppResult<i64>;
}

#[async_trait]
pub trait AchievementStore: Send + Sync {
    async fn unlocks(&self, user_id: Uuid) -> AppResult<Vec<AchievementUnlock>>;

    /// Inserts the unlock row and appends the reward entry as one atomic
    /// step. Returns false, writing nothing, when the unlock already exists.
    async fn unlock_with_reward(
        &self,
        unlock: &AchievementUnlock,
        reward: Option<NewTransaction>,
    ) -> AppResult<bool>;
}

/// Read-only product lookup.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn product(&self, product_id: &str) -> AppResult<Option<Product>>;

    async fn list_products(&self) -> AppResult<Vec<Product>>;
}

/// Diary activity owned by the wider application.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn diary_days(&self, user_id: Uuid, since: NaiveDate) -> AppResult<Vec<NaiveDate>>;

    async fn diary_entry_count(&self, user_id: Uuid) -> AppResult<i64>;
}

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    AchievementUnlock, AppendOutcome, BonusAccount, BonusTransaction, FreezeRecord,
    FreezeRecordChange, FreezeState, NewTransaction, Product, ReferralCode, ReferralRelation,
    RelationInsert, SaveEffects, SaveOutcome, SubscriberEntitlement,
};
use crate::store::{
    AchievementStore, ActivitySource, EntitlementStore, LedgerStore, ProductCatalog, ReferralStore,
};

/// sqlx-backed store. Entitlement writes are compare-and-swap on `version`;
/// ledger appends lock the account row.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_u32(value: i32, column: &str) -> AppResult<u32> {
    u32::try_from(value).map_err(|_| AppError::Internal(format!("Negative {column}: {value}")))
}

fn to_i32(value: u32, column: &str) -> AppResult<i32> {
    i32::try_from(value).map_err(|_| AppError::Internal(format!("{column} out of range: {value}")))
}

#[derive(sqlx::FromRow)]
struct EntitlementRow {
    user_id: Uuid,
    tier: String,
    status: String,
    expires_at: Option<DateTime<Utc>>,
    duration_months: i32,
    price_paid_cents: i64,
    months_purchased_total: i32,
    freeze_tokens_total: i32,
    freeze_tokens_used: i32,
    freeze_days_total: i32,
    freeze_days_used: i32,
    is_frozen: bool,
    frozen_at: Option<DateTime<Utc>>,
    frozen_until: Option<DateTime<Utc>>,
    payment_method_linked: bool,
    version: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EntitlementRow> for SubscriberEntitlement {
    type Error = AppError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.user_id,
            tier: row.tier.parse()?,
            status: row.status.parse()?,
            expires_at: row.expires_at,
            duration_months: to_u32(row.duration_months, "duration_months")?,
            price_paid_cents: row.price_paid_cents,
            months_purchased_total: to_u32(row.months_purchased_total, "months_purchased_total")?,
            freeze: FreezeState {
                tokens_total: to_u32(row.freeze_tokens_total, "freeze_tokens_total")?,
                tokens_used: to_u32(row.freeze_tokens_used, "freeze_tokens_used")?,
                days_total: to_u32(row.freeze_days_total, "freeze_days_total")?,
                days_used: to_u32(row.freeze_days_used, "freeze_days_used")?,
                is_frozen: row.is_frozen,
                frozen_at: row.frozen_at,
                frozen_until: row.frozen_until,
            },
            payment_method_linked: row.payment_method_linked,
            version: u64::try_from(row.version)
                .map_err(|_| AppError::Internal(format!("Negative version {}", row.version)))?,
            updated_at: row.updated_at,
        })
    }
}

const ENTITLEMENT_COLUMNS: &str = "user_id, tier, status, expires_at, duration_months, \
    price_paid_cents, months_purchased_total, freeze_tokens_total, freeze_tokens_used, \
    freeze_days_total, freeze_days_used, is_frozen, frozen_at, frozen_until, \
    payment_method_linked, version, updated_at";

#[derive(sqlx::FromRow)]
struct FreezeRecordRow {
    id: Uuid,
    user_id: Uuid,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    days_used: Option<i32>,
    reason: Option<String>,
}

impl TryFrom<FreezeRecordRow> for FreezeRecord {
    type Error = AppError;

    fn try_from(row: FreezeRecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            started_at: row.started_at,
            ended_at: row.ended_at,
            days_used: row.days_used.map(|d| to_u32(d, "days_used")).transpose()?,
            reason: row.reason.map(|r| r.parse()).transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: Uuid,
    amount: i64,
    kind: String,
    balance_after: i64,
    related_entity_id: Option<String>,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for BonusTransaction {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            kind: row.kind.parse()?,
            balance_after: row.balance_after,
            related_entity_id: row.related_entity_id,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    user_id: Uuid,
    balance: i64,
    lifetime_referral: i64,
    lifetime_cashback: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for BonusAccount {
    fn from(row: AccountRow) -> Self {
        Self {
            user_id: row.user_id,
            balance: row.balance,
            lifetime_referral: row.lifetime_referral,
            lifetime_cashback: row.lifetime_cashback,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String,
    title: String,
    tier: String,
    duration_months: i32,
    price_cents: i64,
}

impl TryFrom<ProductRow> for Product {
    type Error = AppError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            title: row.title,
            tier: row.tier.parse()?,
            duration_months: to_u32(row.duration_months, "duration_months")?,
            price_cents: row.price_cents,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UnlockRow {
    user_id: Uuid,
    achievement_id: String,
    unlocked_at: DateTime<Utc>,
    reward: i64,
    reward_credited: bool,
}

impl From<UnlockRow> for AchievementUnlock {
    fn from(row: UnlockRow) -> Self {
        Self {
            user_id: row.user_id,
            achievement_id: row.achievement_id,
            unlocked_at: row.unlocked_at,
            reward: row.reward,
            reward_credited: row.reward_credited,
        }
    }
}

/// Ledger append on an open transaction. The account row lock serializes
/// appends per user, so the balance check and the update cannot interleave.
async fn append_on(conn: &mut PgConnection, entry: &NewTransaction) -> AppResult<AppendOutcome> {
    sqlx::query(
        "INSERT INTO bonus_accounts (user_id, created_at, updated_at) VALUES ($1, $2, $2) ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(entry.user_id)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    let balance: i64 =
        sqlx::query_scalar("SELECT balance FROM bonus_accounts WHERE user_id = $1 FOR UPDATE")
            .bind(entry.user_id)
            .fetch_one(&mut *conn)
            .await?;

    if let Some(key) = &entry.idempotency_key {
        let seen: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM bonus_transactions WHERE idempotency_key = $1)",
        )
        .bind(key)
        .fetch_one(&mut *conn)
        .await?;
        if seen {
            return Ok(AppendOutcome::Duplicate { balance });
        }
    }
    if balance + entry.amount < 0 {
        return Ok(AppendOutcome::Insufficient { balance });
    }

    let referral = if entry.amount > 0 && entry.kind.counts_as_referral() {
        entry.amount
    } else {
        0
    };
    let cashback = if entry.amount > 0 && entry.kind.counts_as_cashback() {
        entry.amount
    } else {
        0
    };
    let balance_after: i64 = sqlx::query_scalar(
        r#"UPDATE bonus_accounts SET
            balance = balance + $2,
            lifetime_referral = lifetime_referral + $3,
            lifetime_cashback = lifetime_cashback + $4,
            updated_at = $5
        WHERE user_id = $1
        RETURNING balance"#,
    )
    .bind(entry.user_id)
    .bind(entry.amount)
    .bind(referral)
    .bind(cashback)
    .bind(entry.created_at)
    .fetch_one(&mut *conn)
    .await?;

    let tx = BonusTransaction {
        id: Uuid::new_v4(),
        user_id: entry.user_id,
        amount: entry.amount,
        kind: entry.kind,
        balance_after,
        related_entity_id: entry.related_entity_id.clone(),
        idempotency_key: entry.idempotency_key.clone(),
        created_at: entry.created_at,
    };
    sqlx::query(
        r#"INSERT INTO bonus_transactions
            (id, user_id, amount, kind, balance_after, related_entity_id, idempotency_key, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
    )
    .bind(tx.id)
    .bind(tx.user_id)
    .bind(tx.amount)
    .bind(tx.kind.as_str())
    .bind(tx.balance_after)
    .bind(&tx.related_entity_id)
    .bind(&tx.idempotency_key)
    .bind(tx.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(AppendOutcome::Appended(tx))
}

#[async_trait]
impl EntitlementStore for PgStore {
    async fn load_entitlement(&self, user_id: Uuid) -> AppResult<Option<SubscriberEntitlement>> {
        let row: Option<EntitlementRow> = sqlx::query_as(&format!(
            "SELECT {ENTITLEMENT_COLUMNS} FROM entitlements WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SubscriberEntitlement::try_from).transpose()
    }

    async fn ensure_entitlement(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<SubscriberEntitlement> {
        sqlx::query(
            "INSERT INTO entitlements (user_id, updated_at) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.load_entitlement(user_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Entitlement for {user_id} vanished")))
    }

    async fn save_entitlement(
        &self,
        next: &SubscriberEntitlement,
        expected_version: u64,
        effects: SaveEffects,
    ) -> AppResult<SaveOutcome> {
        let expected = i64::try_from(expected_version)
            .map_err(|_| AppError::Internal("Version out of range".into()))?;
        let version = i64::try_from(next.version)
            .map_err(|_| AppError::Internal("Version out of range".into()))?;

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"UPDATE entitlements SET
                tier = $3, status = $4, expires_at = $5, duration_months = $6,
                price_paid_cents = $7, months_purchased_total = $8,
                freeze_tokens_total = $9, freeze_tokens_used = $10,
                freeze_days_total = $11, freeze_days_used = $12,
                is_frozen = $13, frozen_at = $14, frozen_until = $15,
                payment_method_linked = $16, version = $17, updated_at = $18
            WHERE user_id = $1 AND version = $2"#,
        )
        .bind(next.user_id)
        .bind(expected)
        .bind(next.tier.as_str())
        .bind(next.status.as_str())
        .bind(next.expires_at)
        .bind(to_i32(next.duration_months, "duration_months")?)
        .bind(next.price_paid_cents)
        .bind(to_i32(next.months_purchased_total, "months_purchased_total")?)
        .bind(to_i32(next.freeze.tokens_total, "freeze_tokens_total")?)
        .bind(to_i32(next.freeze.tokens_used, "freeze_tokens_used")?)
        .bind(to_i32(next.freeze.days_total, "freeze_days_total")?)
        .bind(to_i32(next.freeze.days_used, "freeze_days_used")?)
        .bind(next.freeze.is_frozen)
        .bind(next.freeze.frozen_at)
        .bind(next.freeze.frozen_until)
        .bind(next.payment_method_linked)
        .bind(version)
        .bind(next.updated_at)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(SaveOutcome::VersionConflict);
        }

        if let Some(payment_ref) = &effects.payment_ref {
            let inserted = sqlx::query(
                "INSERT INTO applied_payments (payment_ref, user_id, applied_at) VALUES ($1, $2, $3) ON CONFLICT (payment_ref) DO NOTHING",
            )
            .bind(payment_ref)
            .bind(next.user_id)
            .bind(next.updated_at)
            .execute(&mut *tx)
            .await?;
            if inserted.rows_affected() == 0 {
                return Ok(SaveOutcome::DuplicatePayment);
            }
        }

        match effects.freeze {
            Some(FreezeRecordChange::Open(record)) => {
                sqlx::query(
                    "INSERT INTO freeze_records (id, user_id, started_at) VALUES ($1, $2, $3)",
                )
                .bind(record.id)
                .bind(record.user_id)
                .bind(record.started_at)
                .execute(&mut *tx)
                .await?;
            }
            Some(FreezeRecordChange::Close {
                ended_at,
                days_used,
                reason,
            }) => {
                let closed = sqlx::query(
                    "UPDATE freeze_records SET ended_at = $2, days_used = $3, reason = $4 WHERE user_id = $1 AND ended_at IS NULL",
                )
                .bind(next.user_id)
                .bind(ended_at)
                .bind(to_i32(days_used, "days_used")?)
                .bind(reason.as_str())
                .execute(&mut *tx)
                .await?;
                if closed.rows_affected() != 1 {
                    return Err(AppError::Internal(format!(
                        "User {} has no open freeze record",
                        next.user_id
                    )));
                }
            }
            None => {}
        }

        tx.commit().await?;
        Ok(SaveOutcome::Saved)
    }

    async fn is_payment_applied(&self, payment_ref: &str) -> AppResult<bool> {
        let applied: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM applied_payments WHERE payment_ref = $1)",
        )
        .bind(payment_ref)
        .fetch_one(&self.pool)
        .await?;
        Ok(applied)
    }

    async fn freeze_history(&self, user_id: Uuid) -> AppResult<Vec<FreezeRecord>> {
        let rows: Vec<FreezeRecordRow> = sqlx::query_as(
            "SELECT id, user_id, started_at, ended_at, days_used, reason FROM freeze_records WHERE user_id = $1 ORDER BY started_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(FreezeRecord::try_from).collect()
    }

    async fn due_for_unfreeze(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM entitlements WHERE is_frozen AND frozen_until <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn due_for_expiry(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM entitlements WHERE status = 'active' AND NOT is_frozen AND expires_at <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn ensure_account(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<BonusAccount> {
        let row: AccountRow = sqlx::query_as(
            r#"INSERT INTO bonus_accounts (user_id, created_at, updated_at) VALUES ($1, $2, $2)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING user_id, balance, lifetime_referral, lifetime_cashback, created_at, updated_at"#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn account(&self, user_id: Uuid) -> AppResult<Option<BonusAccount>> {
        let row: Option<AccountRow> = sqlx::query_as(
            "SELECT user_id, balance, lifetime_referral, lifetime_cashback, created_at, updated_at FROM bonus_accounts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn append(&self, entry: NewTransaction) -> AppResult<AppendOutcome> {
        let mut tx = self.pool.begin().await?;
        let outcome = append_on(&mut tx, &entry).await?;
        if matches!(outcome, AppendOutcome::Appended(_)) {
            tx.commit().await?;
        }
        Ok(outcome)
    }

    async fn ledger_sum(&self, user_id: Uuid) -> AppResult<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::bigint FROM bonus_transactions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(sum)
    }

    async fn transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<BonusTransaction>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            r#"SELECT id, user_id, amount, kind, balance_after, related_entity_id, idempotency_key, created_at
            FROM bonus_transactions WHERE user_id = $1
            ORDER BY seq DESC LIMIT $2 OFFSET $3"#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(BonusTransaction::try_from).collect()
    }
}

#[async_trait]
impl ReferralStore for PgStore {
    async fn code_for_user(&self, user_id: Uuid) -> AppResult<Option<ReferralCode>> {
        let row: Option<(String, Uuid, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT code, user_id, display_name, created_at FROM referral_codes WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(code, user_id, display_name, created_at)| ReferralCode {
            user_id,
            code,
            display_name,
            created_at,
        }))
    }

    async fn insert_code(&self, code: &ReferralCode) -> AppResult<bool> {
        let inserted = sqlx::query(
            "INSERT INTO referral_codes (code, user_id, display_name, created_at) VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
        )
        .bind(&code.code)
        .bind(code.user_id)
        .bind(&code.display_name)
        .bind(code.created_at)
        .execute(&self.pool)
        .await?;
        Ok(inserted.rows_affected() == 1)
    }

    async fn find_code(&self, code: &str) -> AppResult<Option<ReferralCode>> {
        let row: Option<(String, Uuid, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT code, user_id, display_name, created_at FROM referral_codes WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(code, user_id, display_name, created_at)| ReferralCode {
            user_id,
            code,
            display_name,
            created_at,
        }))
    }

    async fn insert_relation(&self, relation: &ReferralRelation) -> AppResult<RelationInsert> {
        let inserted = sqlx::query(
            "INSERT INTO referral_relations (referee_id, referrer_id, code, registered_at) VALUES ($1, $2, $3, $4) ON CONFLICT (referee_id) DO NOTHING",
        )
        .bind(relation.referee_id)
        .bind(relation.referrer_id)
        .bind(&relation.code)
        .bind(relation.registered_at)
        .execute(&self.pool)
        .await?;
        if inserted.rows_affected() == 1 {
            return Ok(RelationInsert::Inserted);
        }
        self.relation_for_referee(relation.referee_id)
            .await?
            .map(RelationInsert::Existing)
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "Referral relation for {} neither inserted nor found",
                    relation.referee_id
                ))
            })
    }

    async fn relation_for_referee(&self, referee_id: Uuid) -> AppResult<Option<ReferralRelation>> {
        let row: Option<(Uuid, Uuid, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT referrer_id, referee_id, code, registered_at FROM referral_relations WHERE referee_id = $1",
        )
        .bind(referee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(referrer_id, referee_id, code, registered_at)| ReferralRelation {
            referrer_id,
            referee_id,
            code,
            registered_at,
        }))
    }

    async fn referee_count(&self, referrer_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::bigint FROM referral_relations WHERE referrer_id = $1",
        )
        .bind(referrer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[async_trait]
impl AchievementStore for PgStore {
    async fn unlocks(&self, user_id: Uuid) -> AppResult<Vec<AchievementUnlock>> {
        let rows: Vec<UnlockRow> = sqlx::query_as(
            "SELECT user_id, achievement_id, unlocked_at, reward, reward_credited FROM achievement_unlocks WHERE user_id = $1 ORDER BY unlocked_at, achievement_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn unlock_with_reward(
        &self,
        unlock: &AchievementUnlock,
        reward: Option<NewTransaction>,
    ) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"INSERT INTO achievement_unlocks (user_id, achievement_id, unlocked_at, reward, reward_credited)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, achievement_id) DO NOTHING"#,
        )
        .bind(unlock.user_id)
        .bind(&unlock.achievement_id)
        .bind(unlock.unlocked_at)
        .bind(unlock.reward)
        .bind(unlock.reward_credited)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            return Ok(false);
        }

        if let Some(entry) = reward {
            if let AppendOutcome::Insufficient { .. } = append_on(&mut tx, &entry).await? {
                return Err(AppError::Internal("Achievement reward must be positive".into()));
            }
        }

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl ProductCatalog for PgStore {
    async fn product(&self, product_id: &str) -> AppResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT id, title, tier, duration_months, price_cents FROM products WHERE id = $1 AND is_active",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Product::try_from).transpose()
    }

    async fn list_products(&self) -> AppResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            "SELECT id, title, tier, duration_months, price_cents FROM products WHERE is_active ORDER BY price_cents",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Product::try_from).collect()
    }
}

#[async_trait]
impl ActivitySource for PgStore {
    async fn diary_days(&self, user_id: Uuid, since: NaiveDate) -> AppResult<Vec<NaiveDate>> {
        let days: Vec<NaiveDate> = sqlx::query_scalar(
            "SELECT DISTINCT entry_date FROM diary_entries WHERE user_id = $1 AND entry_date >= $2 ORDER BY entry_date DESC",
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(days)
    }

    async fn diary_entry_count(&self, user_id: Uuid) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*)::bigint FROM diary_entries WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

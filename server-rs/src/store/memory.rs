use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    AchievementUnlock, AppendOutcome, BonusAccount, BonusTransaction, FreezeRecord,
    FreezeRecordChange, NewTransaction, Product, ReferralCode, ReferralRelation, RelationInsert,
    SaveEffects, SaveOutcome, SubscriberEntitlement,
};
use crate::store::{
    AchievementStore, ActivitySource, EntitlementStore, LedgerStore, ProductCatalog, ReferralStore,
};

/// In-process store. All tables sit behind one mutex, so every trait method
/// is trivially atomic. Cheap to clone.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<MemoryState>,
    fail_ledger_writes: AtomicBool,
}

#[derive(Default)]
struct MemoryState {
    entitlements: HashMap<Uuid, SubscriberEntitlement>,
    freeze_records: Vec<FreezeRecord>,
    applied_payments: HashSet<String>,
    accounts: HashMap<Uuid, BonusAccount>,
    transactions: Vec<BonusTransaction>,
    idempotency_keys: HashSet<String>,
    codes: HashMap<String, ReferralCode>,
    relations: HashMap<Uuid, ReferralRelation>,
    unlocks: HashMap<(Uuid, String), AchievementUnlock>,
    products: HashMap<String, Product>,
    diary: HashMap<Uuid, Vec<NaiveDate>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn seed_products(&self, products: impl IntoIterator<Item = Product>) {
        let mut state = self.state();
        for product in products {
            state.products.insert(product.id.clone(), product);
        }
    }

    pub fn record_diary_entry(&self, user_id: Uuid, day: NaiveDate) {
        self.state().diary.entry(user_id).or_default().push(day);
    }

    /// Makes every ledger write fail with a storage error until switched off.
    pub fn fail_ledger_writes(&self, fail: bool) {
        self.inner.fail_ledger_writes.store(fail, Ordering::SeqCst);
    }

    pub fn transaction_count(&self, user_id: Uuid) -> usize {
        self.state()
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .count()
    }

    fn check_ledger_writable(&self) -> AppResult<()> {
        if self.inner.fail_ledger_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

fn append_locked(state: &mut MemoryState, entry: NewTransaction) -> AppendOutcome {
    let account = state
        .accounts
        .entry(entry.user_id)
        .or_insert_with(|| BonusAccount::new(entry.user_id, entry.created_at));

    if let Some(key) = &entry.idempotency_key {
        if state.idempotency_keys.contains(key) {
            return AppendOutcome::Duplicate {
                balance: account.balance,
            };
        }
    }
    if account.balance + entry.amount < 0 {
        return AppendOutcome::Insufficient {
            balance: account.balance,
        };
    }

    account.apply(entry.amount, entry.kind, entry.created_at);
    let tx = BonusTransaction {
        id: Uuid::new_v4(),
        user_id: entry.user_id,
        amount: entry.amount,
        kind: entry.kind,
        balance_after: account.balance,
        related_entity_id: entry.related_entity_id,
        idempotency_key: entry.idempotency_key,
        created_at: entry.created_at,
    };
    if let Some(key) = &tx.idempotency_key {
        state.idempotency_keys.insert(key.clone());
    }
    state.transactions.push(tx.clone());
    AppendOutcome::Appended(tx)
}

#[async_trait]
impl EntitlementStore for MemoryStore {
    async fn load_entitlement(&self, user_id: Uuid) -> AppResult<Option<SubscriberEntitlement>> {
        Ok(self.state().entitlements.get(&user_id).cloned())
    }

    async fn ensure_entitlement(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<SubscriberEntitlement> {
        Ok(self
            .state()
            .entitlements
            .entry(user_id)
            .or_insert_with(|| SubscriberEntitlement::new_inactive(user_id, now))
            .clone())
    }

    async fn save_entitlement(
        &self,
        next: &SubscriberEntitlement,
        expected_version: u64,
        effects: SaveEffects,
    ) -> AppResult<SaveOutcome> {
        let mut state = self.state();
        match state.entitlements.get(&next.user_id) {
            Some(current) if current.version == expected_version => {}
            _ => return Ok(SaveOutcome::VersionConflict),
        }
        if let Some(payment_ref) = &effects.payment_ref {
            if state.applied_payments.contains(payment_ref) {
                return Ok(SaveOutcome::DuplicatePayment);
            }
        }

        match effects.freeze {
            Some(FreezeRecordChange::Open(record)) => {
                if state
                    .freeze_records
                    .iter()
                    .any(|r| r.user_id == next.user_id && r.is_open())
                {
                    return Err(AppError::Internal(format!(
                        "User {} already has an open freeze record",
                        next.user_id
                    )));
                }
                state.freeze_records.push(record);
            }
            Some(FreezeRecordChange::Close {
                ended_at,
                days_used,
                reason,
            }) => {
                let open = state
                    .freeze_records
                    .iter_mut()
                    .find(|r| r.user_id == next.user_id && r.is_open())
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "User {} has no open freeze record",
                            next.user_id
                        ))
                    })?;
                open.ended_at = Some(ended_at);
                open.days_used = Some(days_used);
                open.reason = Some(reason);
            }
            None => {}
        }
        if let Some(payment_ref) = effects.payment_ref {
            state.applied_payments.insert(payment_ref);
        }
        state.entitlements.insert(next.user_id, next.clone());
        Ok(SaveOutcome::Saved)
    }

    async fn is_payment_applied(&self, payment_ref: &str) -> AppResult<bool> {
        Ok(self.state().applied_payments.contains(payment_ref))
    }

    async fn freeze_history(&self, user_id: Uuid) -> AppResult<Vec<FreezeRecord>> {
        let mut records: Vec<FreezeRecord> = self
            .state()
            .freeze_records
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| std::cmp::Reverse(r.started_at));
        Ok(records)
    }

    async fn due_for_unfreeze(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        Ok(self
            .state()
            .entitlements
            .values()
            .filter(|e| e.freeze.is_frozen && e.freeze.frozen_until.is_some_and(|u| u <= now))
            .map(|e| e.user_id)
            .collect())
    }

    async fn due_for_expiry(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        Ok(self
            .state()
            .entitlements
            .values()
            .filter(|e| e.is_active() && !e.is_frozen() && e.expires_at.is_some_and(|x| x <= now))
            .map(|e| e.user_id)
            .collect())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn ensure_account(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<BonusAccount> {
        Ok(self
            .state()
            .accounts
            .entry(user_id)
            .or_insert_with(|| BonusAccount::new(user_id, now))
            .clone())
    }

    async fn account(&self, user_id: Uuid) -> AppResult<Option<BonusAccount>> {
        Ok(self.state().accounts.get(&user_id).cloned())
    }

    async fn append(&self, entry: NewTransaction) -> AppResult<AppendOutcome> {
        self.check_ledger_writable()?;
        Ok(append_locked(&mut self.state(), entry))
    }

    async fn ledger_sum(&self, user_id: Uuid) -> AppResult<i64> {
        Ok(self
            .state()
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.amount)
            .sum())
    }

    async fn transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<BonusTransaction>> {
        let state = self.state();
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReferralStore for MemoryStore {
    async fn code_for_user(&self, user_id: Uuid) -> AppResult<Option<ReferralCode>> {
        Ok(self
            .state()
            .codes
            .values()
            .find(|c| c.user_id == user_id)
            .cloned())
    }

    async fn insert_code(&self, code: &ReferralCode) -> AppResult<bool> {
        let mut state = self.state();
        if state.codes.contains_key(&code.code)
            || state.codes.values().any(|c| c.user_id == code.user_id)
        {
            return Ok(false);
        }
        state.codes.insert(code.code.clone(), code.clone());
        Ok(true)
    }

    async fn find_code(&self, code: &str) -> AppResult<Option<ReferralCode>> {
        Ok(self.state().codes.get(code).cloned())
    }

    async fn insert_relation(&self, relation: &ReferralRelation) -> AppResult<RelationInsert> {
        let mut state = self.state();
        if let Some(existing) = state.relations.get(&relation.referee_id) {
            return Ok(RelationInsert::Existing(existing.clone()));
        }
        state
            .relations
            .insert(relation.referee_id, relation.clone());
        Ok(RelationInsert::Inserted)
    }

    async fn relation_for_referee(&self, referee_id: Uuid) -> AppResult<Option<ReferralRelation>> {
        Ok(self.state().relations.get(&referee_id).cloned())
    }

    async fn referee_count(&self, referrer_id: Uuid) -> AppResult<i64> {
        let count = self
            .state()
            .relations
            .values()
            .filter(|r| r.referrer_id == referrer_id)
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl AchievementStore for MemoryStore {
    async fn unlocks(&self, user_id: Uuid) -> AppResult<Vec<AchievementUnlock>> {
        let mut unlocks: Vec<AchievementUnlock> = self
            .state()
            .unlocks
            .values()
            .filter(|u| u.user_id == user_id)
            .cloned()
            .collect();
        unlocks.sort_by(|a, b| a.unlocked_at.cmp(&b.unlocked_at).then(a.achievement_id.cmp(&b.achievement_id)));
        Ok(unlocks)
    }

    async fn unlock_with_reward(
        &self,
        unlock: &AchievementUnlock,
        reward: Option<NewTransaction>,
    ) -> AppResult<bool> {
        if reward.is_some() {
            self.check_ledger_writable()?;
        }
        let mut state = self.state();
        let key = (unlock.user_id, unlock.achievement_id.clone());
        if state.unlocks.contains_key(&key) {
            return Ok(false);
        }
        if let Some(entry) = reward {
            if let AppendOutcome::Insufficient { .. } = append_locked(&mut state, entry) {
                return Err(AppError::Internal("Achievement reward must be positive".into()));
            }
        }
        state.unlocks.insert(key, unlock.clone());
        Ok(true)
    }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn product(&self, product_id: &str) -> AppResult<Option<Product>> {
        Ok(self.state().products.get(product_id).cloned())
    }

    async fn list_products(&self) -> AppResult<Vec<Product>> {
        let mut products: Vec<Product> = self.state().products.values().cloned().collect();
        products.sort_by(|a, b| (a.tier, a.duration_months).cmp(&(b.tier, b.duration_months)));
        Ok(products)
    }
}

#[async_trait]
impl ActivitySource for MemoryStore {
    async fn diary_days(&self, user_id: Uuid, since: NaiveDate) -> AppResult<Vec<NaiveDate>> {
        Ok(self
            .state()
            .diary
            .get(&user_id)
            .map(|days| days.iter().copied().filter(|d| *d >= since).collect())
            .unwrap_or_default())
    }

    async fn diary_entry_count(&self, user_id: Uuid) -> AppResult<i64> {
        Ok(self
            .state()
            .diary
            .get(&user_id)
            .map_or(0, |days| days.len() as i64))
    }
}

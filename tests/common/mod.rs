use std::{sync::Arc, thread, time::Duration};

use points_ledger::{
    config::EngineConfig,
    domain::{
        Balance, Category, Item, ItemId, LedgerEntry, Page, PageRequest, PointsId, PointsRule,
        RuleEventLog, RuleId, TradeLog, UsageRecord, UserId,
    },
    engine::{NewItem, PointsEngine, TradeEngine},
    store::{ChangeSet, ItemFilter, ItemSort, MemoryStore, Store, StoreError, TradeLogFilter},
};

#[allow(dead_code)]
pub fn engine() -> TradeEngine {
    engine_with(EngineConfig::default())
}

#[allow(dead_code)]
pub fn engine_with(config: EngineConfig) -> TradeEngine {
    TradeEngine::new(PointsEngine::in_memory(config))
}

#[allow(dead_code)]
pub fn engine_over(store: Arc<dyn Store>, config: EngineConfig) -> TradeEngine {
    TradeEngine::new(PointsEngine::new(store, config))
}

#[allow(dead_code)]
pub fn user(id: &str) -> UserId {
    UserId::from(id)
}

#[allow(dead_code)]
pub fn item(engine: &TradeEngine, name: &str, category: Category, price: i64, stock: i64) -> Item {
    engine
        .create_item(NewItem::new(name, category, price, stock), &user("staff"))
        .unwrap()
}

/// Every entry of the user, oldest first.
#[allow(dead_code)]
pub fn history(engine: &TradeEngine, user: &UserId) -> Vec<LedgerEntry> {
    let mut entries = Vec::new();
    let mut page = 0;
    loop {
        let batch = engine.points().list_transactions(user, page, 100).unwrap();
        entries.extend(batch.content);
        page += 1;
        if page >= batch.total_pages {
            break;
        }
    }
    entries.reverse();
    entries
}

/// Asserts `balance_after[i] == balance_after[i-1] + delta[i]` from a zero base and
/// that the last snapshot matches the stored balance.
#[allow(dead_code)]
pub fn assert_ledger_consistent(engine: &TradeEngine, user: &UserId) {
    let mut running = 0;
    for entry in history(engine, user) {
        running += entry.delta;
        assert_eq!(entry.balance_after, running, "entry {}", entry.points_id);
        assert!(entry.balance_after >= 0);
    }
    assert_eq!(engine.points().get_balance(user).unwrap(), running);
}

type Reject = Box<dyn Fn(&ChangeSet) -> bool + Send + Sync>;

/// Wraps a [`MemoryStore`], rejecting selected commits and optionally stalling every commit.
#[allow(dead_code)]
pub struct FaultyStore {
    inner: MemoryStore,
    reject: Reject,
    commit_delay: Duration,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn rejecting(reject: impl Fn(&ChangeSet) -> bool + Send + Sync + 'static) -> Self {
        Self {
            inner: MemoryStore::new(),
            reject: Box::new(reject),
            commit_delay: Duration::ZERO,
        }
    }

    pub fn slow(commit_delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            reject: Box::new(|_| false),
            commit_delay,
        }
    }
}

impl Store for FaultyStore {
    fn balance(&self, user: &UserId) -> Result<Option<Balance>, StoreError> {
        self.inner.balance(user)
    }
    fn ledger_entry(&self, points_id: &PointsId) -> Result<Option<LedgerEntry>, StoreError> {
        self.inner.ledger_entry(points_id)
    }
    fn ledger_page(
        &self,
        user: &UserId,
        page: PageRequest,
    ) -> Result<Page<LedgerEntry>, StoreError> {
        self.inner.ledger_page(user, page)
    }
    fn refunded_points(&self, original: &PointsId) -> Result<i64, StoreError> {
        self.inner.refunded_points(original)
    }
    fn usage_record(&self, points_id: &PointsId) -> Result<Option<UsageRecord>, StoreError> {
        self.inner.usage_record(points_id)
    }
    fn item(&self, item_id: &ItemId) -> Result<Option<Item>, StoreError> {
        self.inner.item(item_id)
    }
    fn search_items(
        &self,
        filter: &ItemFilter,
        sort: ItemSort,
        page: PageRequest,
    ) -> Result<Page<Item>, StoreError> {
        self.inner.search_items(filter, sort, page)
    }
    fn has_trade_log(&self, user: &UserId, item_id: &ItemId) -> Result<bool, StoreError> {
        self.inner.has_trade_log(user, item_id)
    }
    fn search_trade_logs(
        &self,
        filter: &TradeLogFilter,
        page: PageRequest,
    ) -> Result<Page<TradeLog>, StoreError> {
        self.inner.search_trade_logs(filter, page)
    }
    fn rule(&self, rule_id: RuleId) -> Result<Option<PointsRule>, StoreError> {
        self.inner.rule(rule_id)
    }
    fn rule_by_code(&self, code: &str) -> Result<Option<PointsRule>, StoreError> {
        self.inner.rule_by_code(code)
    }
    fn rule_events(&self, user: &UserId) -> Result<Vec<RuleEventLog>, StoreError> {
        self.inner.rule_events(user)
    }
    fn next_sequence(&self) -> u64 {
        self.inner.next_sequence()
    }
    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        if !self.commit_delay.is_zero() {
            thread::sleep(self.commit_delay);
        }
        if (self.reject)(&changes) {
            return Err(StoreError::Unavailable("disk full on replica db-2".to_owned()));
        }
        self.inner.commit(changes)
    }
}

//! Persistence seam.
//!
//! Reads go straight to the [`Store`]. Writes are staged in a [`ChangeSet`] by a unit
//! of work and handed to [`Store::commit`], which applies all of them or none.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::{
    Balance, Category, Item, ItemId, LedgerEntry, Page, PageRequest, PointsId, PointsRule,
    RuleEventLog, RuleId, TradeLog, UsageRecord, UserId,
};

pub use locks::{LockTimeout, RowGuard, RowLocks};
pub use memory::MemoryStore;

mod locks;
mod memory;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Duplicate {table} key: {key}")]
    Duplicate { table: &'static str, key: String },
    #[error("Store lock poisoned")]
    Poisoned,
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Writes staged by one atomic unit.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub balances: HashMap<UserId, Balance>,
    pub ledger: Vec<LedgerEntry>,
    pub usages: Vec<UsageRecord>,
    pub items: HashMap<ItemId, Item>,
    pub trade_logs: Vec<TradeLog>,
    pub rules: HashMap<RuleId, PointsRule>,
    pub rule_events: Vec<RuleEventLog>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
            && self.ledger.is_empty()
            && self.usages.is_empty()
            && self.items.is_empty()
            && self.trade_logs.is_empty()
            && self.rules.is_empty()
            && self.rule_events.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    CreatedAt,
    Price,
    Name,
}

impl SortKey {
    /// Unknown keys fall back to creation time.
    pub fn parse(key: &str) -> Self {
        match key {
            "price" => SortKey::Price,
            "name" => SortKey::Name,
            _ => SortKey::CreatedAt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

impl SortDir {
    /// Anything other than `asc` (case-insensitive) sorts descending.
    pub fn parse(dir: &str) -> Self {
        if dir.eq_ignore_ascii_case("asc") {
            SortDir::Asc
        } else {
            SortDir::Desc
        }
    }
}

/// Catalog search filters. `None` fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    /// Case-insensitive substring of name or description.
    pub keyword: Option<String>,
    pub category: Option<Category>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub active: Option<bool>,
}

/// Trade log search filters. `None` fields do not filter; time bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct TradeLogFilter {
    pub user_id: Option<UserId>,
    pub item_id: Option<ItemId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TradeLogFilter {
    pub fn for_user(user_id: &UserId) -> Self {
        Self {
            user_id: Some(user_id.clone()),
            ..Self::default()
        }
    }

    pub(crate) fn matches(&self, log: &TradeLog) -> bool {
        self.user_id.as_ref().is_none_or(|user| &log.user_id == user)
            && self.item_id.is_none_or(|item| log.item_id == item)
            && self.from.is_none_or(|from| log.created_at >= from)
            && self.to.is_none_or(|to| log.created_at <= to)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ItemSort {
    pub key: SortKey,
    pub dir: SortDir,
}

pub trait Store: Send + Sync {
    fn balance(&self, user: &UserId) -> Result<Option<Balance>, StoreError>;
    fn ledger_entry(&self, points_id: &PointsId) -> Result<Option<LedgerEntry>, StoreError>;
    /// Newest first by sequence.
    fn ledger_page(
        &self,
        user: &UserId,
        page: PageRequest,
    ) -> Result<Page<LedgerEntry>, StoreError>;
    /// Sum of REFUND points already issued against `original`.
    fn refunded_points(&self, original: &PointsId) -> Result<i64, StoreError>;
    fn usage_record(&self, points_id: &PointsId) -> Result<Option<UsageRecord>, StoreError>;

    fn item(&self, item_id: &ItemId) -> Result<Option<Item>, StoreError>;
    fn search_items(
        &self,
        filter: &ItemFilter,
        sort: ItemSort,
        page: PageRequest,
    ) -> Result<Page<Item>, StoreError>;
    fn has_trade_log(&self, user: &UserId, item_id: &ItemId) -> Result<bool, StoreError>;
    /// Newest first by sequence.
    fn search_trade_logs(
        &self,
        filter: &TradeLogFilter,
        page: PageRequest,
    ) -> Result<Page<TradeLog>, StoreError>;

    fn rule(&self, rule_id: RuleId) -> Result<Option<PointsRule>, StoreError>;
    fn rule_by_code(&self, code: &str) -> Result<Option<PointsRule>, StoreError>;
    fn rule_events(&self, user: &UserId) -> Result<Vec<RuleEventLog>, StoreError>;

    /// Monotonic across the whole store.
    fn next_sequence(&self) -> u64;

    /// Applies every staged write or none of them.
    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;
}

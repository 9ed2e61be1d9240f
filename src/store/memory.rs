use std::{
    cmp::Reverse,
    collections::{HashMap, HashSet},
    sync::{
        RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::debug;
use uuid::Uuid;

use crate::{
    domain::{
        Balance, ChangeType, Item, ItemId, LedgerEntry, Page, PageRequest, PointsId, PointsRule,
        RuleEventLog, RuleId, TradeLog, UsageRecord, UserId,
    },
    store::{
        ChangeSet, ItemFilter, ItemSort, SortDir, SortKey, Store, StoreError, TradeLogFilter,
    },
};

#[derive(Debug, Default)]
struct Tables {
    balances: HashMap<UserId, Balance>,
    ledger: HashMap<PointsId, LedgerEntry>,
    ledger_by_user: HashMap<UserId, Vec<PointsId>>,
    refunds: HashMap<PointsId, i64>,
    usages: HashMap<PointsId, UsageRecord>,
    items: HashMap<ItemId, Item>,
    trade_logs: Vec<TradeLog>,
    purchases: HashSet<(UserId, ItemId)>,
    rules: HashMap<RuleId, PointsRule>,
    rule_codes: HashMap<String, RuleId>,
    rule_events: Vec<RuleEventLog>,
}

impl Tables {
    /// Rejects the whole change set if any append-only key already exists.
    fn check_unique(&self, changes: &ChangeSet) -> Result<(), StoreError> {
        let mut points = HashSet::new();
        for entry in &changes.ledger {
            if self.ledger.contains_key(&entry.points_id) || !points.insert(entry.points_id) {
                return Err(StoreError::Duplicate {
                    table: "ledger",
                    key: entry.points_id.to_string(),
                });
            }
        }
        for usage in &changes.usages {
            if self.usages.contains_key(&usage.points_id) {
                return Err(StoreError::Duplicate {
                    table: "usage",
                    key: usage.points_id.to_string(),
                });
            }
        }
        let mut logs = HashSet::new();
        for log in &changes.trade_logs {
            if !logs.insert(log.log_id) || self.trade_logs.iter().any(|l| l.log_id == log.log_id) {
                return Err(StoreError::Duplicate {
                    table: "trade_log",
                    key: log.log_id.to_string(),
                });
            }
        }
        for rule in changes.rules.values() {
            match self.rule_codes.get(&rule.code) {
                Some(existing) if *existing != rule.rule_id => {
                    return Err(StoreError::Duplicate {
                        table: "points_rule",
                        key: rule.code.clone(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) {
        self.balances.extend(changes.balances);
        for entry in changes.ledger {
            if entry.change_type == ChangeType::Refund {
                let original = entry
                    .ref_event_id
                    .as_deref()
                    .and_then(|id| id.parse::<Uuid>().ok())
                    .map(PointsId::from);
                if let Some(original) = original {
                    *self.refunds.entry(original).or_default() += entry.delta;
                }
            }
            self.ledger_by_user
                .entry(entry.user_id.clone())
                .or_default()
                .push(entry.points_id);
            self.ledger.insert(entry.points_id, entry);
        }
        for usage in changes.usages {
            self.usages.insert(usage.points_id, usage);
        }
        self.items.extend(changes.items);
        for log in changes.trade_logs {
            self.purchases.insert((log.user_id.clone(), log.item_id));
            self.trade_logs.push(log);
        }
        for (rule_id, rule) in changes.rules {
            self.rule_codes.insert(rule.code.clone(), rule_id);
            self.rules.insert(rule_id, rule);
        }
        self.rule_events.extend(changes.rule_events);
    }
}

/// Process-local [`Store`]. A single write lock around the tables makes each commit atomic.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    sequence: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            sequence: AtomicU64::new(1),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables.write().map_err(|_| StoreError::Poisoned)
    }
}

fn matches(item: &Item, filter: &ItemFilter) -> bool {
    if filter.active.is_some_and(|active| item.active != active) {
        return false;
    }
    if filter.category.is_some_and(|category| item.category != category) {
        return false;
    }
    if filter.min_price.is_some_and(|min| item.price < min) {
        return false;
    }
    if filter.max_price.is_some_and(|max| item.price > max) {
        return false;
    }
    match filter.keyword.as_deref().map(str::trim) {
        Some(keyword) if !keyword.is_empty() => {
            let keyword = keyword.to_lowercase();
            item.name.to_lowercase().contains(&keyword)
                || item.description.to_lowercase().contains(&keyword)
        }
        _ => true,
    }
}

fn sort_items(items: &mut [Item], sort: ItemSort) {
    items.sort_by(|a, b| {
        let ordering = match sort.key {
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SortKey::Price => a.price.cmp(&b.price),
            SortKey::Name => a.name.cmp(&b.name),
        }
        .then(a.seq.cmp(&b.seq));
        match sort.dir {
            SortDir::Asc => ordering,
            SortDir::Desc => ordering.reverse(),
        }
    });
}

impl Store for MemoryStore {
    fn balance(&self, user: &UserId) -> Result<Option<Balance>, StoreError> {
        Ok(self.read()?.balances.get(user).cloned())
    }

    fn ledger_entry(&self, points_id: &PointsId) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self.read()?.ledger.get(points_id).cloned())
    }

    fn ledger_page(
        &self,
        user: &UserId,
        page: PageRequest,
    ) -> Result<Page<LedgerEntry>, StoreError> {
        let tables = self.read()?;
        let mut entries: Vec<LedgerEntry> = tables
            .ledger_by_user
            .get(user)
            .into_iter()
            .flatten()
            .filter_map(|id| tables.ledger.get(id).cloned())
            .collect();
        entries.sort_by_key(|entry| Reverse(entry.seq));
        Ok(Page::slice(entries, page))
    }

    fn refunded_points(&self, original: &PointsId) -> Result<i64, StoreError> {
        Ok(self.read()?.refunds.get(original).copied().unwrap_or(0))
    }

    fn usage_record(&self, points_id: &PointsId) -> Result<Option<UsageRecord>, StoreError> {
        Ok(self.read()?.usages.get(points_id).cloned())
    }

    fn item(&self, item_id: &ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.read()?.items.get(item_id).cloned())
    }

    fn search_items(
        &self,
        filter: &ItemFilter,
        sort: ItemSort,
        page: PageRequest,
    ) -> Result<Page<Item>, StoreError> {
        let mut items: Vec<Item> = self
            .read()?
            .items
            .values()
            .filter(|item| matches(item, filter))
            .cloned()
            .collect();
        sort_items(&mut items, sort);
        Ok(Page::slice(items, page))
    }

    fn has_trade_log(&self, user: &UserId, item_id: &ItemId) -> Result<bool, StoreError> {
        Ok(self.read()?.purchases.contains(&(user.clone(), *item_id)))
    }

    fn search_trade_logs(
        &self,
        filter: &TradeLogFilter,
        page: PageRequest,
    ) -> Result<Page<TradeLog>, StoreError> {
        let mut logs: Vec<TradeLog> = self
            .read()?
            .trade_logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect();
        logs.sort_by_key(|log| Reverse(log.seq));
        Ok(Page::slice(logs, page))
    }

    fn rule(&self, rule_id: RuleId) -> Result<Option<PointsRule>, StoreError> {
        Ok(self.read()?.rules.get(&rule_id).cloned())
    }

    fn rule_by_code(&self, code: &str) -> Result<Option<PointsRule>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .rule_codes
            .get(code)
            .and_then(|id| tables.rules.get(id))
            .cloned())
    }

    fn rule_events(&self, user: &UserId) -> Result<Vec<RuleEventLog>, StoreError> {
        Ok(self
            .read()?
            .rule_events
            .iter()
            .filter(|event| &event.user_id == user)
            .cloned()
            .collect())
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        tables.check_unique(&changes)?;
        debug!(
            ledger = changes.ledger.len(),
            trade_logs = changes.trade_logs.len(),
            "committing change set"
        );
        tables.apply(changes);
        Ok(())
    }
}

//! One atomic unit: the row locks it holds plus the writes it has staged.
//!
//! Nothing reaches the store until [`UnitOfWork::commit`]. Dropping the unit without
//! committing discards every staged write and releases its locks, which is how every
//! failure path rolls back.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::{
    domain::{
        Balance, Item, ItemId, LedgerEntry, PointsRule, RuleEventLog, TradeLog, UsageRecord,
        UserId,
    },
    engine::{Context, EngineError},
    store::{ChangeSet, RowGuard},
};

pub(crate) struct UnitOfWork<'a> {
    ctx: &'a Context,
    item_guards: HashMap<ItemId, RowGuard<ItemId>>,
    balance_guards: HashMap<UserId, RowGuard<UserId>>,
    changes: ChangeSet,
}

impl<'a> UnitOfWork<'a> {
    pub(crate) fn begin(ctx: &'a Context) -> Self {
        Self {
            ctx,
            item_guards: HashMap::new(),
            balance_guards: HashMap::new(),
            changes: ChangeSet::default(),
        }
    }

    /// Locks the user's balance row and returns its current state, creating a zero
    /// balance if the user has none yet. Re-locking a row this unit holds is a no-op.
    pub(crate) fn lock_balance(&mut self, user_id: &UserId) -> Result<Balance, EngineError> {
        if !self.balance_guards.contains_key(user_id) {
            let guard = self
                .ctx
                .balance_locks
                .lock(user_id.clone(), self.ctx.config.lock_timeout)
                .map_err(|_| {
                    warn!(user = %user_id, "balance lock wait exceeded");
                    EngineError::Conflict(format!("balance of {user_id} is busy"))
                })?;
            debug!(user = %user_id, "balance row locked");
            self.balance_guards.insert(user_id.clone(), guard);
        }
        if let Some(staged) = self.changes.balances.get(user_id) {
            return Ok(staged.clone());
        }
        Ok(self
            .ctx
            .store
            .balance(user_id)?
            .unwrap_or_else(|| Balance::new(user_id.clone())))
    }

    /// Locks an item row. Item rows must be locked before any balance row.
    pub(crate) fn lock_item(&mut self, item_id: &ItemId) -> Result<Item, EngineError> {
        if !self.item_guards.contains_key(item_id) {
            if !self.balance_guards.is_empty() {
                return Err(EngineError::Internal(
                    "item lock requested while a balance lock is held",
                ));
            }
            let guard = self
                .ctx
                .item_locks
                .lock(*item_id, self.ctx.config.lock_timeout)
                .map_err(|_| {
                    warn!(item = %item_id, "item lock wait exceeded");
                    EngineError::Conflict(format!("item {item_id} is busy"))
                })?;
            debug!(item = %item_id, "item row locked");
            self.item_guards.insert(*item_id, guard);
        }
        if let Some(staged) = self.changes.items.get(item_id) {
            return Ok(staged.clone());
        }
        self.ctx
            .store
            .item(item_id)?
            .ok_or_else(|| EngineError::not_found("item", item_id))
    }

    pub(crate) fn has_trade_log(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
    ) -> Result<bool, EngineError> {
        let staged = self
            .changes
            .trade_logs
            .iter()
            .any(|log| &log.user_id == user_id && &log.item_id == item_id);
        Ok(staged || self.ctx.store.has_trade_log(user_id, item_id)?)
    }

    pub(crate) fn next_sequence(&self) -> u64 {
        self.ctx.store.next_sequence()
    }

    pub(crate) fn stage_balance(&mut self, balance: Balance) {
        self.changes
            .balances
            .insert(balance.user_id.clone(), balance);
    }

    pub(crate) fn stage_ledger(&mut self, entry: LedgerEntry) {
        self.changes.ledger.push(entry);
    }

    pub(crate) fn stage_usage(&mut self, usage: UsageRecord) {
        self.changes.usages.push(usage);
    }

    pub(crate) fn stage_item(&mut self, item: Item) {
        self.changes.items.insert(item.item_id, item);
    }

    pub(crate) fn stage_trade_log(&mut self, log: TradeLog) {
        self.changes.trade_logs.push(log);
    }

    pub(crate) fn stage_rule(&mut self, rule: PointsRule) {
        self.changes.rules.insert(rule.rule_id, rule);
    }

    pub(crate) fn stage_rule_event(&mut self, event: RuleEventLog) {
        self.changes.rule_events.push(event);
    }

    /// Applies all staged writes at once, then releases the held rows.
    pub(crate) fn commit(self) -> Result<(), EngineError> {
        let Self {
            ctx,
            item_guards,
            balance_guards,
            changes,
        } = self;
        if !changes.is_empty() {
            ctx.store.commit(changes)?;
        }
        drop(balance_guards);
        drop(item_guards);
        Ok(())
    }
}

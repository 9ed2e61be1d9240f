use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::{
    config::EngineConfig,
    domain::{
        ChangeType, LedgerEntry, Page, PointsId, RuleId, UsageId, UsageRecord, UserId,
    },
    engine::{Context, EngineError, require_user, unit_of_work::UnitOfWork},
    store::{MemoryStore, Store},
};

/// One requested balance change. The sign comes from `change_type`.
#[derive(Debug, Clone)]
pub(crate) struct PointsChange {
    pub(crate) user_id: UserId,
    pub(crate) change_type: ChangeType,
    pub(crate) points: i64,
    pub(crate) description: String,
    pub(crate) ref_rule_id: Option<RuleId>,
    pub(crate) ref_event_id: Option<String>,
}

impl PointsChange {
    fn new(user_id: &UserId, change_type: ChangeType, points: i64, description: &str) -> Self {
        Self {
            user_id: user_id.clone(),
            change_type,
            points,
            description: description.to_owned(),
            ref_rule_id: None,
            ref_event_id: None,
        }
    }
}

/// The single mutation gateway for point balances.
#[derive(Clone)]
pub struct PointsEngine {
    ctx: Arc<Context>,
}

impl PointsEngine {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        Self {
            ctx: Arc::new(Context::new(store, config)),
        }
    }

    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub(crate) fn context(&self) -> &Context {
        &self.ctx
    }

    /// Applies one balance change atomically and returns the new ledger entry.
    ///
    /// The user's balance row stays locked from read to commit, so concurrent changes
    /// for the same user apply one after another and never drive the balance below zero.
    pub fn apply_change(
        &self,
        user_id: &UserId,
        change_type: ChangeType,
        points: i64,
        description: &str,
        ref_rule_id: Option<RuleId>,
        ref_event_id: Option<String>,
    ) -> Result<LedgerEntry, EngineError> {
        let change = PointsChange {
            ref_rule_id,
            ref_event_id,
            ..PointsChange::new(user_id, change_type, points, description)
        };
        self.run(change, |uow, change| self.apply_in(uow, change))
    }

    pub fn grant(
        &self,
        user_id: &UserId,
        points: i64,
        description: &str,
        ref_rule_id: Option<RuleId>,
    ) -> Result<LedgerEntry, EngineError> {
        self.apply_change(user_id, ChangeType::Gain, points, description, ref_rule_id, None)
    }

    pub fn deduct(
        &self,
        user_id: &UserId,
        points: i64,
        description: &str,
        ref_rule_id: Option<RuleId>,
    ) -> Result<LedgerEntry, EngineError> {
        self.apply_change(user_id, ChangeType::Loss, points, description, ref_rule_id, None)
    }

    /// Spends points and records what they were spent on in the same atomic unit.
    pub fn use_points(
        &self,
        user_id: &UserId,
        points: i64,
        used_for: &str,
        metadata: Option<serde_json::Value>,
        description: &str,
    ) -> Result<LedgerEntry, EngineError> {
        let change = PointsChange::new(user_id, ChangeType::Use, points, description);
        self.run(change, |uow, change| {
            self.use_in(uow, change, used_for, metadata)
        })
    }

    /// Returns points spent by an earlier USE or LOSS entry of the same user.
    ///
    /// Refunds against one entry may never add up to more than it debited.
    pub fn refund(
        &self,
        user_id: &UserId,
        original: &PointsId,
        points: i64,
        description: &str,
    ) -> Result<LedgerEntry, EngineError> {
        let change = PointsChange {
            ref_event_id: Some(original.to_string()),
            ..PointsChange::new(user_id, ChangeType::Refund, points, description)
        };
        self.run(change, |uow, change| {
            validate(&change)?;
            // Taken first so concurrent refunds of the same entry see each other.
            uow.lock_balance(&change.user_id)?;
            let entry = self
                .ctx
                .store
                .ledger_entry(original)?
                .ok_or_else(|| EngineError::not_found("ledger entry", original))?;
            if entry.user_id != change.user_id {
                return Err(EngineError::invalid(format!(
                    "ledger entry {original} belongs to another user"
                )));
            }
            if !entry.change_type.is_debit() {
                return Err(EngineError::invalid(format!(
                    "{} entries cannot be refunded",
                    entry.change_type
                )));
            }
            let refundable = entry.delta.abs() - self.ctx.store.refunded_points(original)?;
            if change.points > refundable {
                return Err(EngineError::invalid(format!(
                    "refund of {} exceeds refundable {refundable}",
                    change.points
                )));
            }
            self.apply_in(uow, change)
        })
    }

    /// Current total, zero for users that never had a balance change.
    pub fn get_balance(&self, user_id: &UserId) -> Result<i64, EngineError> {
        require_user(user_id)?;
        Ok(self
            .ctx
            .store
            .balance(user_id)?
            .map_or(0, |balance| balance.total_points()))
    }

    /// Newest first.
    pub fn list_transactions(
        &self,
        user_id: &UserId,
        page: usize,
        size: usize,
    ) -> Result<Page<LedgerEntry>, EngineError> {
        require_user(user_id)?;
        let request = self.ctx.page_request(page, size);
        Ok(self.ctx.store.ledger_page(user_id, request)?)
    }

    pub fn get_entry(&self, points_id: &PointsId) -> Result<LedgerEntry, EngineError> {
        self.ctx
            .store
            .ledger_entry(points_id)?
            .ok_or_else(|| EngineError::not_found("ledger entry", points_id))
    }

    pub fn usage_for(&self, points_id: &PointsId) -> Result<Option<UsageRecord>, EngineError> {
        Ok(self.ctx.store.usage_record(points_id)?)
    }

    /// Runs `body` in a fresh unit of work and commits it, logging the outcome.
    pub(crate) fn run<F>(&self, change: PointsChange, body: F) -> Result<LedgerEntry, EngineError>
    where
        F: FnOnce(&mut UnitOfWork<'_>, PointsChange) -> Result<LedgerEntry, EngineError>,
    {
        let user_id = change.user_id.clone();
        let change_type = change.change_type;
        let points = change.points;
        let result = {
            let mut uow = UnitOfWork::begin(&self.ctx);
            body(&mut uow, change).and_then(|entry| uow.commit().map(|()| entry))
        };
        match &result {
            Ok(entry) => info!(
                user = %entry.user_id,
                change = %entry.change_type,
                delta = entry.delta,
                balance_after = entry.balance_after,
                "points change committed"
            ),
            Err(e) => warn!(
                user = %user_id,
                change = %change_type,
                points,
                kind = e.kind().code(),
                "points change rejected: {e}"
            ),
        }
        result
    }

    /// Stages one balance change inside `uow`. Nothing is visible until the unit commits.
    pub(crate) fn apply_in(
        &self,
        uow: &mut UnitOfWork<'_>,
        change: PointsChange,
    ) -> Result<LedgerEntry, EngineError> {
        validate(&change)?;
        let mut balance = uow.lock_balance(&change.user_id)?;
        let delta = change.change_type.delta(change.points);
        let balance_after = balance.try_apply(delta)?;

        let entry = LedgerEntry {
            points_id: PointsId::new(),
            seq: uow.next_sequence(),
            user_id: change.user_id,
            change_type: change.change_type,
            delta,
            balance_after,
            description: change.description,
            ref_rule_id: change.ref_rule_id,
            ref_event_id: change.ref_event_id,
            created_at: Utc::now(),
        };
        uow.stage_ledger(entry.clone());
        uow.stage_balance(balance);
        Ok(entry)
    }

    /// Stages a USE change together with its usage record.
    pub(crate) fn use_in(
        &self,
        uow: &mut UnitOfWork<'_>,
        change: PointsChange,
        used_for: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<LedgerEntry, EngineError> {
        if used_for.trim().is_empty() {
            return Err(EngineError::invalid("usage purpose is required"));
        }
        let entry = self.apply_in(uow, change)?;
        uow.stage_usage(UsageRecord {
            usage_id: UsageId::new(),
            user_id: entry.user_id.clone(),
            points_id: entry.points_id,
            used_for: used_for.to_owned(),
            metadata,
            created_at: entry.created_at,
        });
        Ok(entry)
    }
}

fn validate(change: &PointsChange) -> Result<(), EngineError> {
    require_user(&change.user_id)?;
    if change.points <= 0 {
        return Err(EngineError::invalid(format!(
            "points must be positive, got {}",
            change.points
        )));
    }
    Ok(())
}

//! Named grant/deduction rules applied through the points engine.

use chrono::Utc;
use tracing::{info, warn};

use crate::{
    domain::{ChangeType, EventId, LedgerEntry, PointsRule, RuleEventLog, RuleId, UserId},
    engine::{
        Context, EngineError, PointsEngine, require_user, points::PointsChange,
        unit_of_work::UnitOfWork,
    },
    store::RowGuard,
};

/// Held from the code's uniqueness or state read until its commit.
fn lock_rule(ctx: &Context, code: &str) -> Result<RowGuard<String>, EngineError> {
    ctx.rule_locks
        .lock(code.to_owned(), ctx.config.lock_timeout)
        .map_err(|_| {
            warn!(code, "rule lock wait exceeded");
            EngineError::Conflict(format!("rule {code} is busy"))
        })
}

impl PointsEngine {
    /// Registers an enabled rule. Codes are unique; only GAIN and LOSS rules exist.
    pub fn register_rule(
        &self,
        code: &str,
        change_type: ChangeType,
        points: i64,
        description: &str,
    ) -> Result<PointsRule, EngineError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(EngineError::invalid("rule code is required"));
        }
        if !matches!(change_type, ChangeType::Gain | ChangeType::Loss) {
            return Err(EngineError::invalid(format!(
                "rules cannot carry {change_type} changes"
            )));
        }
        if points <= 0 {
            return Err(EngineError::invalid(format!(
                "rule points must be positive, got {points}"
            )));
        }
        let ctx = self.context();
        let _guard = lock_rule(ctx, code)?;
        if ctx.store.rule_by_code(code)?.is_some() {
            return Err(EngineError::invalid(format!("rule code {code} already exists")));
        }

        let now = Utc::now();
        let rule = PointsRule {
            rule_id: RuleId::from(ctx.store.next_sequence()),
            code: code.to_owned(),
            change_type,
            points,
            description: description.to_owned(),
            enabled: true,
            created_at: now,
            updated_at: now,
        };
        let mut uow = UnitOfWork::begin(ctx);
        uow.stage_rule(rule.clone());
        uow.commit()?;
        info!(rule = %rule.rule_id, code = %rule.code, "points rule registered");
        Ok(rule)
    }

    pub fn set_rule_enabled(&self, rule_id: RuleId, enabled: bool) -> Result<PointsRule, EngineError> {
        let ctx = self.context();
        let code = ctx
            .store
            .rule(rule_id)?
            .ok_or_else(|| EngineError::not_found("points rule", rule_id))?
            .code;
        let _guard = lock_rule(ctx, &code)?;
        let mut rule = ctx
            .store
            .rule(rule_id)?
            .ok_or_else(|| EngineError::not_found("points rule", rule_id))?;
        if rule.enabled != enabled {
            rule.enabled = enabled;
            rule.updated_at = Utc::now();
            let mut uow = UnitOfWork::begin(ctx);
            uow.stage_rule(rule.clone());
            uow.commit()?;
        }
        Ok(rule)
    }

    /// Applies a rule's change to `user_id` and logs the rule event in the same unit.
    pub fn apply_rule(
        &self,
        user_id: &UserId,
        code: &str,
    ) -> Result<(LedgerEntry, RuleEventLog), EngineError> {
        require_user(user_id)?;
        let rule = self
            .context()
            .store
            .rule_by_code(code.trim())?
            .ok_or_else(|| EngineError::not_found("points rule", code))?;
        if !rule.enabled {
            return Err(EngineError::invalid(format!("rule {} is disabled", rule.code)));
        }

        let change = PointsChange {
            user_id: user_id.clone(),
            change_type: rule.change_type,
            points: rule.points,
            description: rule.description.clone(),
            ref_rule_id: Some(rule.rule_id),
            ref_event_id: None,
        };
        let mut event = None;
        let entry = self.run(change, |uow, change| {
            let entry = self.apply_in(uow, change)?;
            let logged = RuleEventLog {
                event_id: EventId::new(),
                user_id: entry.user_id.clone(),
                rule_id: rule.rule_id,
                points_id: entry.points_id,
                created_at: entry.created_at,
            };
            uow.stage_rule_event(logged.clone());
            event = Some(logged);
            Ok(entry)
        })?;
        let event = event.ok_or(EngineError::Internal("rule event was not staged"))?;
        Ok((entry, event))
    }

    pub fn rule_events(&self, user_id: &UserId) -> Result<Vec<RuleEventLog>, EngineError> {
        require_user(user_id)?;
        Ok(self.context().store.rule_events(user_id)?)
    }
}

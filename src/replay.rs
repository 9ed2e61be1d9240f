//! Replays a parsed command script against a [`TradeEngine`].
//!
//! Command failures are logged and skipped, like any other rejected request.

use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use crate::{
    domain::{ItemId, PointsId, UserId},
    engine::{EngineError, NewItem, TradeEngine},
    parsing::Command,
};

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Unknown item alias: {0}")]
    UnknownAlias(String),
    #[error("Row {0} did not produce a ledger entry")]
    UnknownRow(usize),
    #[error("{} ({})", .0, .0.kind().code())]
    Engine(#[from] EngineError),
}

/// Final state of one user, as printed by the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSummary {
    pub user: UserId,
    pub total_points: i64,
    pub entries: usize,
}

pub struct Replay {
    engine: TradeEngine,
    items: HashMap<String, ItemId>,
    entries_by_row: HashMap<usize, PointsId>,
    users: BTreeSet<UserId>,
}

impl Replay {
    pub fn new(engine: TradeEngine) -> Self {
        Self {
            engine,
            items: HashMap::new(),
            entries_by_row: HashMap::new(),
            users: BTreeSet::new(),
        }
    }

    pub fn engine(&self) -> &TradeEngine {
        &self.engine
    }

    pub fn process_commands(&mut self, commands: impl Iterator<Item = (usize, Command)>) {
        for (row, command) in commands {
            if let Err(e) = self.process_command(row, command) {
                warn!("Error processing row {row}: {e}");
            }
        }
    }

    fn item_id(&self, alias: &str) -> Result<ItemId, ReplayError> {
        self.items
            .get(alias)
            .copied()
            .ok_or_else(|| ReplayError::UnknownAlias(alias.to_owned()))
    }

    fn process_command(&mut self, row: usize, command: Command) -> Result<(), ReplayError> {
        let points = self.engine.points();
        let produced = match command {
            Command::Grant {
                user,
                points: amount,
                description,
            } => {
                self.users.insert(user.clone());
                Some(points.grant(&user, amount, &description, None)?)
            }
            Command::Deduct {
                user,
                points: amount,
                description,
            } => {
                self.users.insert(user.clone());
                Some(points.deduct(&user, amount, &description, None)?)
            }
            Command::Use {
                user,
                points: amount,
                used_for,
            } => {
                self.users.insert(user.clone());
                Some(points.use_points(&user, amount, &used_for, None, &used_for)?)
            }
            Command::Refund {
                user,
                points: amount,
                original_row,
            } => {
                let original = self
                    .entries_by_row
                    .get(&original_row)
                    .copied()
                    .ok_or(ReplayError::UnknownRow(original_row))?;
                self.users.insert(user.clone());
                Some(points.refund(&user, &original, amount, "refund")?)
            }
            Command::CreateItem {
                alias,
                creator,
                category,
                name,
                price,
                stock,
            } => {
                let item = self
                    .engine
                    .create_item(NewItem::new(name, category, price, stock), &creator)?;
                self.items.insert(alias, item.item_id);
                None
            }
            Command::Purchase {
                user,
                alias,
                quantity,
            } => {
                let item_id = self.item_id(&alias)?;
                self.users.insert(user.clone());
                let receipt = self.engine.purchase(&user, &item_id, quantity, None)?;
                Some(receipt.ledger_entry)
            }
            Command::DeleteItem { alias } => {
                let item_id = self.item_id(&alias)?;
                self.engine.delete_item(&item_id)?;
                None
            }
        };
        if let Some(entry) = produced {
            self.entries_by_row.insert(row, entry.points_id);
        }
        Ok(())
    }

    /// One summary per user seen in the script, ordered by user id.
    pub fn balances(&self) -> Result<Vec<BalanceSummary>, EngineError> {
        let points = self.engine.points();
        self.users
            .iter()
            .map(|user| {
                Ok(BalanceSummary {
                    user: user.clone(),
                    total_points: points.get_balance(user)?,
                    entries: points.list_transactions(user, 0, 1)?.total_elements,
                })
            })
            .collect()
    }
}

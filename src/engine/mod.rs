//! Points and trade engines.
//!
//! Every balance change flows through [`PointsEngine`], which serializes mutations per
//! user with a row lock and writes the ledger entry and balance in one atomic unit.
//! [`TradeEngine`] layers purchases on top: it locks the item row first, then debits
//! through the points engine inside the same unit, so stock, ledger and trade log
//! commit or roll back together. Locks are always taken item before balance.

use std::sync::Arc;

use crate::{
    config::EngineConfig,
    domain::{ItemId, PageRequest, UserId},
    store::{RowLocks, Store},
};

pub use errors::{EngineError, ErrorKind};
pub use points::PointsEngine;
pub use trade::TradeEngine;
pub use types::{ManualLog, NewItem, PurchaseReceipt};

pub mod errors;
mod points;
mod rules;
mod trade;
mod types;
mod unit_of_work;

/// State shared by both engines.
pub(crate) struct Context {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) balance_locks: Arc<RowLocks<UserId>>,
    pub(crate) item_locks: Arc<RowLocks<ItemId>>,
    /// Keyed by rule code.
    pub(crate) rule_locks: Arc<RowLocks<String>>,
    pub(crate) config: EngineConfig,
}

impl Context {
    fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        Self {
            store,
            balance_locks: Arc::new(RowLocks::new()),
            item_locks: Arc::new(RowLocks::new()),
            rule_locks: Arc::new(RowLocks::new()),
            config,
        }
    }

    /// Clamps the page size into `1..=max_page_size`.
    fn page_request(&self, page: usize, size: usize) -> PageRequest {
        PageRequest::new(page, size.clamp(1, self.config.max_page_size))
    }
}

fn require_user(user_id: &UserId) -> Result<(), EngineError> {
    if user_id.is_blank() {
        return Err(EngineError::invalid("user id is required"));
    }
    Ok(())
}

use chrono::Utc;
use tracing::{info, warn};

use crate::{
    domain::{ChangeType, Item, ItemId, LogId, Page, TradeLog, UserId},
    engine::{
        Context, EngineError, ManualLog, NewItem, PointsEngine, PurchaseReceipt, require_user,
        points::PointsChange, unit_of_work::UnitOfWork,
    },
    store::{ItemFilter, ItemSort, TradeLogFilter},
};

const TRADE_USAGE: &str = "trade";

/// Catalog and purchase orchestration on top of a [`PointsEngine`].
#[derive(Clone)]
pub struct TradeEngine {
    points: PointsEngine,
}

impl TradeEngine {
    pub fn new(points: PointsEngine) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &PointsEngine {
        &self.points
    }

    fn ctx(&self) -> &Context {
        self.points.context()
    }

    pub fn create_item(&self, new_item: NewItem, creator: &UserId) -> Result<Item, EngineError> {
        require_user(creator)?;
        if new_item.name.trim().is_empty() {
            return Err(EngineError::invalid("item name is required"));
        }
        if new_item.price < 1 {
            return Err(EngineError::invalid(format!(
                "price must be at least 1, got {}",
                new_item.price
            )));
        }
        if new_item.stock < 0 {
            return Err(EngineError::invalid(format!(
                "stock must not be negative, got {}",
                new_item.stock
            )));
        }

        let ctx = self.ctx();
        let now = Utc::now();
        let item = Item {
            item_id: ItemId::new(),
            seq: ctx.store.next_sequence(),
            name: new_item.name,
            description: new_item.description,
            price: new_item.price,
            stock: new_item.stock,
            active: new_item.active.unwrap_or(true),
            category: new_item.category,
            image_url: new_item.image_url,
            created_by: creator.clone(),
            created_at: now,
            updated_at: now,
        };
        let mut uow = UnitOfWork::begin(ctx);
        uow.stage_item(item.clone());
        uow.commit()?;
        info!(item = %item.item_id, name = %item.name, price = item.price, stock = item.stock, "item created");
        Ok(item)
    }

    pub fn get_item(&self, item_id: &ItemId) -> Result<Item, EngineError> {
        self.ctx()
            .store
            .item(item_id)?
            .ok_or_else(|| EngineError::not_found("item", item_id))
    }

    pub fn search_items(
        &self,
        filter: &ItemFilter,
        page: usize,
        size: usize,
        sort: ItemSort,
    ) -> Result<Page<Item>, EngineError> {
        let request = self.ctx().page_request(page, size);
        Ok(self.ctx().store.search_items(filter, sort, request)?)
    }

    /// Buys `quantity` units (at least one) of an item as one atomic unit.
    ///
    /// Stock is never decremented without the matching debit, and the debit never
    /// survives a failure of any later step.
    pub fn purchase(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
        quantity: i64,
        metadata: Option<serde_json::Value>,
    ) -> Result<PurchaseReceipt, EngineError> {
        let result = self.purchase_in(user_id, item_id, quantity, metadata);
        match &result {
            Ok(receipt) => info!(
                user = %user_id,
                item = %item_id,
                quantity = receipt.trade_log.quantity,
                total = receipt.trade_log.total_points,
                stock = receipt.item.stock,
                "purchase committed"
            ),
            Err(e) => warn!(
                user = %user_id,
                item = %item_id,
                quantity,
                kind = e.kind().code(),
                "purchase rejected: {e}"
            ),
        }
        result
    }

    fn purchase_in(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
        quantity: i64,
        metadata: Option<serde_json::Value>,
    ) -> Result<PurchaseReceipt, EngineError> {
        require_user(user_id)?;
        let ctx = self.ctx();
        let mut uow = UnitOfWork::begin(ctx);

        let mut item = uow.lock_item(item_id)?;
        if !item.active {
            return Err(EngineError::ItemInactive(*item_id));
        }
        let quantity = quantity.max(1);
        if quantity > ctx.config.max_quantity {
            return Err(EngineError::invalid(format!(
                "quantity {quantity} exceeds limit {}",
                ctx.config.max_quantity
            )));
        }
        // Must run under the item lock.
        if ctx.config.is_one_time(item.category) && uow.has_trade_log(user_id, item_id)? {
            return Err(EngineError::AlreadyPurchased(*item_id));
        }
        if item.stock < quantity {
            return Err(EngineError::InsufficientStock {
                available: item.stock,
                requested: quantity,
            });
        }
        let total = item
            .price
            .checked_mul(quantity)
            .ok_or_else(|| EngineError::invalid("purchase total out of range"))?;

        let debit = PointsChange {
            user_id: user_id.clone(),
            change_type: ChangeType::Use,
            points: total,
            description: format!("purchase: {}", item.name),
            ref_rule_id: None,
            ref_event_id: None,
        };
        let ledger_entry = self
            .points
            .use_in(&mut uow, debit, TRADE_USAGE, metadata.clone())?;

        item.take_stock(quantity)?;
        uow.stage_item(item.clone());

        let trade_log = TradeLog {
            log_id: LogId::new(),
            seq: uow.next_sequence(),
            user_id: user_id.clone(),
            item_id: *item_id,
            item_name: item.name.clone(),
            quantity,
            unit_price: item.price,
            total_points: total,
            points_id: Some(ledger_entry.points_id),
            metadata,
            created_at: ledger_entry.created_at,
        };
        uow.stage_trade_log(trade_log.clone());
        uow.commit()?;

        Ok(PurchaseReceipt {
            item,
            trade_log,
            ledger_entry,
        })
    }

    /// Backfills a trade log without touching any balance.
    pub fn create_manual_log(
        &self,
        user_id: &UserId,
        request: ManualLog,
    ) -> Result<TradeLog, EngineError> {
        require_user(user_id)?;
        let ctx = self.ctx();
        // Locked like a purchase so one-time checks see the backfilled log.
        let mut uow = UnitOfWork::begin(ctx);
        let item = uow.lock_item(&request.item_id)?;
        let item_name = request
            .item_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| item.name.clone());
        let quantity = request.quantity.max(1);
        let total_points = if request.total_points > 0 {
            request.total_points
        } else {
            item.price
                .checked_mul(quantity)
                .ok_or_else(|| EngineError::invalid("trade total out of range"))?
        };

        let log = TradeLog {
            log_id: LogId::new(),
            seq: uow.next_sequence(),
            user_id: user_id.clone(),
            item_id: item.item_id,
            item_name,
            quantity,
            unit_price: item.price,
            total_points,
            points_id: request.points_id,
            metadata: request.metadata,
            created_at: Utc::now(),
        };
        uow.stage_trade_log(log.clone());
        uow.commit()?;
        info!(user = %user_id, item = %item.item_id, log = %log.log_id, "manual trade log recorded");
        Ok(log)
    }

    /// Newest first.
    pub fn list_my_logs(
        &self,
        user_id: &UserId,
        page: usize,
        size: usize,
    ) -> Result<Page<TradeLog>, EngineError> {
        self.search_logs(&TradeLogFilter::for_user(user_id), page, size)
    }

    /// Trade logs matching every set field of `filter`, newest first.
    pub fn search_logs(
        &self,
        filter: &TradeLogFilter,
        page: usize,
        size: usize,
    ) -> Result<Page<TradeLog>, EngineError> {
        if let Some(user_id) = &filter.user_id {
            require_user(user_id)?;
        }
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(EngineError::invalid(format!(
                    "time range starts after it ends: {from} > {to}"
                )));
            }
        }
        let request = self.ctx().page_request(page, size);
        Ok(self.ctx().store.search_trade_logs(filter, request)?)
    }

    /// Takes the item off sale. History rows that reference it are kept.
    pub fn delete_item(&self, item_id: &ItemId) -> Result<Item, EngineError> {
        let mut uow = UnitOfWork::begin(self.ctx());
        let mut item = uow.lock_item(item_id)?;
        if item.active {
            item.deactivate();
            uow.stage_item(item.clone());
        }
        uow.commit()?;
        info!(item = %item_id, "item deactivated");
        Ok(item)
    }
}

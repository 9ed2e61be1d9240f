use crate::domain::{Category, Item, ItemId, LedgerEntry, PointsId, TradeLog};

/// Catalog row to insert. `active` defaults to true.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub price: i64,
    pub stock: i64,
    pub active: Option<bool>,
    pub category: Category,
    pub image_url: Option<String>,
}

impl NewItem {
    pub fn new(name: impl Into<String>, category: Category, price: i64, stock: i64) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            price,
            stock,
            active: None,
            category,
            image_url: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Administrative trade log backfill. Never touches balances.
#[derive(Debug, Clone, Default)]
pub struct ManualLog {
    pub item_id: ItemId,
    /// Falls back to the item's current name when blank.
    pub item_name: Option<String>,
    pub quantity: i64,
    /// Used as-is when positive, otherwise derived from price and quantity.
    pub total_points: i64,
    pub points_id: Option<PointsId>,
    pub metadata: Option<serde_json::Value>,
}

/// Everything a successful purchase committed.
#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    pub item: Item,
    pub trade_log: TradeLog,
    pub ledger_entry: LedgerEntry,
}

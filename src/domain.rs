//! Core domain types: balances, ledger entries, catalog items and trade receipts.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque caller identity handed over by the auth layer.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into,
)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

uuid_id!(
    /// Globally unique, immutable identifier of a ledger entry.
    PointsId
);
uuid_id!(ItemId);
uuid_id!(LogId);
uuid_id!(UsageId);
uuid_id!(EventId);

/// Store-assigned identifier of a points rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
pub struct RuleId(u64);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: i64, required: i64 },
    #[error("Insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i64, requested: i64 },
    #[error("Arithmetic overflow")]
    Overflow,
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
}

/// Kind of balance-affecting event. The sign of a ledger delta is derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Gain,
    Loss,
    Use,
    Refund,
}

impl ChangeType {
    pub fn is_debit(self) -> bool {
        matches!(self, ChangeType::Loss | ChangeType::Use)
    }

    /// Signed delta for a positive `points` amount.
    pub fn delta(self, points: i64) -> i64 {
        if self.is_debit() { -points } else { points }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Gain => "GAIN",
            ChangeType::Loss => "LOSS",
            ChangeType::Use => "USE",
            ChangeType::Refund => "REFUND",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current point total of one user. Invariant: `total_points >= 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    pub user_id: UserId,
    total_points: i64,
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// Zero balance, as created lazily by the first balance-affecting event.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            total_points: 0,
            updated_at: Utc::now(),
        }
    }
    pub fn total_points(&self) -> i64 {
        self.total_points
    }
    /// Applies a signed delta. Fails without mutating if the result would be negative.
    pub fn try_apply(&mut self, delta: i64) -> Result<i64, DomainError> {
        let next = self
            .total_points
            .checked_add(delta)
            .ok_or(DomainError::Overflow)?;
        if next < 0 {
            return Err(DomainError::InsufficientBalance {
                available: self.total_points,
                required: delta.saturating_neg(),
            });
        }
        self.total_points = next;
        self.updated_at = Utc::now();
        Ok(next)
    }
}

/// Immutable record of one balance change with the resulting balance snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub points_id: PointsId,
    /// Monotonic store sequence. Listings order by it.
    pub seq: u64,
    pub user_id: UserId,
    pub change_type: ChangeType,
    pub delta: i64,
    pub balance_after: i64,
    pub description: String,
    pub ref_rule_id: Option<RuleId>,
    pub ref_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Why a USE entry happened. Linked 1:1 to its ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub usage_id: UsageId,
    pub user_id: UserId,
    pub points_id: PointsId,
    pub used_for: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Snack,
    Stationery,
    Voucher,
    Badge,
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Snack => "snack",
            Category::Stationery => "stationery",
            Category::Voucher => "voucher",
            Category::Badge => "badge",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snack" => Ok(Category::Snack),
            "stationery" => Ok(Category::Stationery),
            "voucher" => Ok(Category::Voucher),
            "badge" => Ok(Category::Badge),
            "other" => Ok(Category::Other),
            _ => Err(DomainError::UnknownCategory(s.to_owned())),
        }
    }
}

/// Catalog row. Only `stock` and `active` are ever mutated by the trade engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: ItemId,
    pub seq: u64,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub stock: i64,
    pub active: bool,
    pub category: Category,
    pub image_url: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Removes `quantity` units. Fails without mutating when stock is short.
    pub fn take_stock(&mut self, quantity: i64) -> Result<(), DomainError> {
        if self.stock < quantity {
            return Err(DomainError::InsufficientStock {
                available: self.stock,
                requested: quantity,
            });
        }
        self.stock -= quantity;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn deactivate(&mut self) {
        if self.active {
            self.active = false;
            self.updated_at = Utc::now();
        }
    }
}

/// Append-only purchase receipt, snapshotting name and price at purchase time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLog {
    pub log_id: LogId,
    pub seq: u64,
    pub user_id: UserId,
    pub item_id: ItemId,
    pub item_name: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub total_points: i64,
    /// Ledger entry that debited the buyer. Absent for some manual backfills.
    pub points_id: Option<PointsId>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Named, reusable grant or deduction (e.g. `SIGNUP`, `DAILY_LOGIN`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsRule {
    pub rule_id: RuleId,
    pub code: String,
    pub change_type: ChangeType,
    pub points: i64,
    pub description: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Records that a rule was applied to a user, pointing at the resulting ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEventLog {
    pub event_id: EventId,
    pub user_id: UserId,
    pub rule_id: RuleId,
    pub points_id: PointsId,
    pub created_at: DateTime<Utc>,
}

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

impl PageRequest {
    pub fn new(page: usize, size: usize) -> Self {
        Self { page, size }
    }
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub page: usize,
    pub size: usize,
    pub total_elements: usize,
    pub total_pages: usize,
    pub content: Vec<T>,
}

impl<T> Page<T> {
    /// Cuts one page out of an already ordered sequence.
    pub fn slice(ordered: impl IntoIterator<Item = T>, request: PageRequest) -> Self {
        let all: Vec<T> = ordered.into_iter().collect();
        let total_elements = all.len();
        let size = request.size.max(1);
        let content = all
            .into_iter()
            .skip(request.offset())
            .take(size)
            .collect();
        Self {
            page: request.page,
            size,
            total_elements,
            total_pages: total_elements.div_ceil(size),
            content,
        }
    }
}

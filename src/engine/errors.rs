use crate::{
    domain::{DomainError, ItemId},
    store::StoreError,
};

/// Stable failure kind, for mapping onto API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    InsufficientBalance,
    InsufficientStock,
    ItemInactive,
    AlreadyPurchased,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorKind::InsufficientStock => "INSUFFICIENT_STOCK",
            ErrorKind::ItemInactive => "ITEM_INACTIVE",
            ErrorKind::AlreadyPurchased => "ALREADY_PURCHASED",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: i64, required: i64 },
    #[error("Insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i64, requested: i64 },
    #[error("Item is not on sale: {0}")]
    ItemInactive(ItemId),
    #[error("Item already purchased: {0}")]
    AlreadyPurchased(ItemId),
    #[error("Conflict: {0}")]
    Conflict(String),
    // Storage detail stays in the source chain and out of the message.
    #[error("Internal storage failure")]
    Storage(#[source] StoreError),
    #[error("Internal failure")]
    Internal(&'static str),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            EngineError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            EngineError::ItemInactive(_) => ErrorKind::ItemInactive,
            EngineError::AlreadyPurchased(_) => ErrorKind::AlreadyPurchased,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Storage(_) | EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        EngineError::InvalidArgument(message.into())
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Duplicate {
                table: "points_rule",
                key,
            } => EngineError::InvalidArgument(format!("rule code {key} already exists")),
            StoreError::Duplicate { table, .. } => {
                EngineError::Conflict(format!("concurrent write to {table}"))
            }
            other => EngineError::Storage(other),
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::InsufficientBalance {
                available,
                required,
            } => EngineError::InsufficientBalance {
                available,
                required,
            },
            DomainError::InsufficientStock {
                available,
                requested,
            } => EngineError::InsufficientStock {
                available,
                requested,
            },
            DomainError::Overflow => EngineError::invalid("points total out of range"),
            DomainError::UnknownCategory(category) => {
                EngineError::invalid(format!("unknown category {category}"))
            }
        }
    }
}

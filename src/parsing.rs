//! CSV command-script deserialization.
//!
//! Parsing happens in two stages:
//! 1. Serde deserializes each CSV row into a flat `CsvCommand`.
//! 2. `TryFrom<CsvCommand>` converts it into a strongly-typed [`Command`].
//!
//! Malformed rows or missing required fields are logged and skipped. Every command is
//! paired with its 1-based data row number so later rows can refer back to it.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{Category, DomainError, UserId};

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Op {
    Grant,
    Deduct,
    Use,
    Refund,
    Item,
    Purchase,
    DeleteItem,
}

/// Flat representation of a single CSV row. Which columns are required depends on `op`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CsvCommand {
    op: Op,
    user: Option<String>,
    item: Option<String>,
    points: Option<i64>,
    quantity: Option<i64>,
    text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Grant {
        user: UserId,
        points: i64,
        description: String,
    },
    Deduct {
        user: UserId,
        points: i64,
        description: String,
    },
    Use {
        user: UserId,
        points: i64,
        used_for: String,
    },
    Refund {
        user: UserId,
        points: i64,
        original_row: usize,
    },
    CreateItem {
        alias: String,
        creator: UserId,
        category: Category,
        name: String,
        price: i64,
        stock: i64,
    },
    Purchase {
        user: UserId,
        alias: String,
        quantity: i64,
    },
    DeleteItem {
        alias: String,
    },
}

/// Returns an iterator that lazily deserializes CSV rows into numbered commands,
/// skipping any rows that fail to parse or convert.
pub fn deserialize_csv<D: std::io::Read>(
    reader: &mut csv::Reader<D>,
) -> impl Iterator<Item = (usize, Command)> {
    reader
        .deserialize::<CsvCommand>()
        .enumerate()
        .filter_map(|(index, result)| match result {
            Ok(row) => Some((index + 1, row)),
            Err(e) => {
                warn!("Failed to parse command row {}: {e}", index + 1);
                None
            }
        })
        .filter_map(|(row, csv_command)| match Command::try_from(csv_command) {
            Ok(command) => Some((row, command)),
            Err(e) => {
                warn!("Failed to convert command row {row}: {e}");
                None
            }
        })
}

#[derive(Debug, thiserror::Error)]
pub enum IntoCommandError {
    #[error("Missing {0} column")]
    Missing(&'static str),
    #[error("Item text must look like category:name")]
    MalformedItemText,
    #[error("Refund text must be a row number")]
    MalformedRefundRow,
    #[error(transparent)]
    Domain(#[from] DomainError),
}

fn required<T>(value: Option<T>, column: &'static str) -> Result<T, IntoCommandError> {
    value.ok_or(IntoCommandError::Missing(column))
}

impl TryFrom<CsvCommand> for Command {
    type Error = IntoCommandError;

    fn try_from(value: CsvCommand) -> Result<Self, Self::Error> {
        let user = value
            .user
            .filter(|user| !user.is_empty())
            .map(UserId::from);
        let text = value.text.unwrap_or_default();
        match value.op {
            Op::Grant => Ok(Command::Grant {
                user: required(user, "user")?,
                points: required(value.points, "points")?,
                description: text,
            }),
            Op::Deduct => Ok(Command::Deduct {
                user: required(user, "user")?,
                points: required(value.points, "points")?,
                description: text,
            }),
            Op::Use => Ok(Command::Use {
                user: required(user, "user")?,
                points: required(value.points, "points")?,
                used_for: text,
            }),
            Op::Refund => Ok(Command::Refund {
                user: required(user, "user")?,
                points: required(value.points, "points")?,
                original_row: text
                    .parse()
                    .map_err(|_| IntoCommandError::MalformedRefundRow)?,
            }),
            Op::Item => {
                let (category, name) = text
                    .split_once(':')
                    .ok_or(IntoCommandError::MalformedItemText)?;
                Ok(Command::CreateItem {
                    alias: required(value.item, "item")?,
                    creator: required(user, "user")?,
                    category: category.parse()?,
                    name: name.trim().to_owned(),
                    price: required(value.points, "points")?,
                    stock: required(value.quantity, "quantity")?,
                })
            }
            Op::Purchase => Ok(Command::Purchase {
                user: required(user, "user")?,
                alias: required(value.item, "item")?,
                quantity: value.quantity.unwrap_or(1),
            }),
            Op::DeleteItem => Ok(Command::DeleteItem {
                alias: required(value.item, "item")?,
            }),
        }
    }
}

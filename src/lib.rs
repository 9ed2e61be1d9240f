//! Points ledger and item-purchase transaction engine.

pub mod config;
pub mod domain;
pub mod engine;
pub mod output;
pub mod parsing;
pub mod replay;
pub mod store;

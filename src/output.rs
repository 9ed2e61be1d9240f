//! Serializes final balances to CSV.

use serde::Serialize;

use crate::{domain::UserId, replay::BalanceSummary};

/// Maps directly to the output columns: user, total_points, entries.
#[derive(Debug, Serialize)]
struct OutputCsv<'a> {
    user: &'a UserId,
    total_points: i64,
    entries: usize,
}

pub fn print_balances(
    balances: &[BalanceSummary],
    writer: impl std::io::Write,
) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for summary in balances {
        wtr.serialize(OutputCsv {
            user: &summary.user,
            total_points: summary.total_points,
            entries: summary.entries,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

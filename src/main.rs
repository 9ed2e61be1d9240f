use std::{fs::File, time::Duration};

use anyhow::Context;
use clap::Parser;

use points_ledger::config::EngineConfig;
use points_ledger::domain::Category;
use points_ledger::engine::{PointsEngine, TradeEngine};
use points_ledger::output;
use points_ledger::parsing;
use points_ledger::replay::Replay;

fn main() -> anyhow::Result<()> {
    let args = Arguments::parse();
    if let Some(log_level) = args.log_level {
        tracing_subscriber::fmt().with_max_level(log_level).init();
    }

    let file = File::open(&args.input_file)
        .with_context(|| format!("failed to open {}", args.input_file))?;

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let commands = parsing::deserialize_csv(&mut rdr);

    let mut config = EngineConfig::default()
        .with_lock_timeout(Duration::from_millis(args.lock_timeout_ms))
        .with_max_quantity(args.max_quantity);
    if !args.one_time_category.is_empty() {
        config = config.with_one_time_categories(args.one_time_category);
    }
    let engine = TradeEngine::new(PointsEngine::in_memory(config));

    let mut replay = Replay::new(engine);
    replay.process_commands(commands);

    let balances = replay.balances()?;
    output::print_balances(&balances, std::io::stdout())
}

#[derive(Parser)]
struct Arguments {
    input_file: String,
    log_level: Option<tracing::Level>,
    #[arg(long, default_value_t = 5_000)]
    lock_timeout_ms: u64,
    #[arg(long, default_value_t = 10_000)]
    max_quantity: i64,
    /// Category limited to one purchase per user and item. Repeatable.
    #[arg(long)]
    one_time_category: Vec<Category>,
}

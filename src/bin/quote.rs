use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

use dex_matcher::models::BookUpdate;
use dex_matcher::planner::{FeeSchedule, Planner};
use dex_matcher::{MatchRequest, OrderBookSnapshot, Side};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SideArg {
    Buy,
    Sell,
}

impl From<SideArg> for Side {
    fn from(value: SideArg) -> Self {
        match value {
            SideArg::Buy => Side::Buy,
            SideArg::Sell => Side::Sell,
        }
    }
}

/// Runs one order against a JSON order book dump and prints the plan.
#[derive(Parser, Debug)]
#[command(name = "quote")]
struct Args {
    /// File holding a `BookUpdate` JSON document.
    #[arg(long)]
    book: PathBuf,
    #[arg(long, value_enum)]
    side: SideArg,
    #[arg(long)]
    amount: Decimal,
    /// Omit for a market order.
    #[arg(long)]
    limit_price: Option<Decimal>,
    #[arg(long, default_value_t = 0)]
    maker_fee_bps: u32,
    #[arg(long, default_value_t = 0)]
    taker_fee_bps: u32,
    #[arg(long, default_value_t = 10)]
    depth: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let raw = std::fs::read(&args.book)?;
    let update: BookUpdate = serde_json::from_slice(&raw)?;
    let book = OrderBookSnapshot::from_orders(update.orders)?;

    let request = MatchRequest {
        side: args.side.into(),
        amount: args.amount,
        limit_price: args.limit_price,
    };
    let planner = Planner::new(FeeSchedule {
        maker_fee_bps: args.maker_fee_bps,
        taker_fee_bps: args.taker_fee_bps,
    });
    let (bids, asks) = book.depth(args.depth)?;
    let plan = planner.quote(&book, &request)?;

    println!("market={}", update.market);
    println!("bids={}", serde_json::to_string(&bids)?);
    println!("asks={}", serde_json::to_string(&asks)?);
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

use rust_decimal::Decimal;

use dex_matcher::planner::{Balances, FeeSchedule, Planner};
use dex_matcher::{MatchRequest, OrderBookSnapshot, RestingOrder, Side};

fn main() -> anyhow::Result<()> {
    let book = OrderBookSnapshot::from_orders([
        RestingOrder::new("a", Side::Sell, Decimal::from(10), Decimal::from(5), 1),
        RestingOrder::new("b", Side::Sell, Decimal::from(10), Decimal::from(5), 2),
        RestingOrder::new("c", Side::Sell, Decimal::from(11), Decimal::from(10), 3),
        RestingOrder::new("x", Side::Buy, Decimal::from(9), Decimal::from(3), 4),
    ])?;

    let r1 = dex_matcher::execute(&book, &MatchRequest::market(Side::Buy, Decimal::from(8)))?;
    let r2 = dex_matcher::execute(&book, &MatchRequest::limit(Side::Buy, Decimal::from(12), Decimal::from(10)))?;

    let planner = Planner::new(FeeSchedule {
        maker_fee_bps: 0,
        taker_fee_bps: 10,
    });
    let balances = Balances::new(Decimal::ZERO, Decimal::from(1_000));
    let plan = planner.plan_limit(&book, Side::Buy, Decimal::from(12), Decimal::from(10), &balances)?;

    println!("r1: {r1:?}");
    println!("r2: {r2:?}");
    println!("plan: {plan:?}");
    println!("depth: {:?}", book.depth(5)?);
    Ok(())
}

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use dex_matcher::planner::{Asset, Balances, FeeSchedule, NewRestingOrder, PlanError, Planner};
use dex_matcher::{MatchRequest, OrderBookSnapshot, RestingOrder, Side};

fn book() -> OrderBookSnapshot {
    OrderBookSnapshot::from_orders([
        RestingOrder::new("s1", Side::Sell, dec!(10), dec!(5), 1),
        RestingOrder::new("s2", Side::Sell, dec!(11), dec!(5), 2),
        RestingOrder::new("b1", Side::Buy, dec!(9), dec!(4), 3),
    ])
    .unwrap()
}

fn planner() -> Planner {
    Planner::new(FeeSchedule {
        maker_fee_bps: 5,
        taker_fee_bps: 20,
    })
}

fn rich() -> Balances {
    Balances::new(dec!(1000), dec!(1000))
}

#[test]
fn market_order_that_cannot_fill_is_rejected() {
    let err = planner().plan_market(&book(), Side::Buy, dec!(11), &rich()).unwrap_err();
    assert_eq!(
        err,
        PlanError::InsufficientLiquidity {
            requested: dec!(11),
            available: dec!(10),
        }
    );
}

#[test]
fn market_buy_charges_taker_fee_on_quote() {
    let plan = planner().plan_market(&book(), Side::Buy, dec!(6), &rich()).unwrap();
    assert_eq!(plan.result.quote_amount, dec!(61));
    assert_eq!(plan.taker_fee, dec!(0.122));
    assert_eq!(plan.maker_fee, Decimal::ZERO);
    assert!(plan.posted.is_none());
}

#[test]
fn market_buy_needs_quote_balance() {
    let balances = Balances::new(Decimal::ZERO, dec!(60));
    let err = planner().plan_market(&book(), Side::Buy, dec!(6), &balances).unwrap_err();
    assert_eq!(
        err,
        PlanError::InsufficientBalance {
            asset: Asset::Quote,
            required: dec!(61),
            available: dec!(60),
        }
    );
}

#[test]
fn market_sell_needs_base_balance() {
    let balances = Balances::new(dec!(3), Decimal::ZERO);
    let err = planner().plan_market(&book(), Side::Sell, dec!(4), &balances).unwrap_err();
    assert!(matches!(err, PlanError::InsufficientBalance { asset: Asset::Base, .. }));
}

#[test]
fn limit_order_posts_remainder_at_limit() {
    let plan = planner()
        .plan_limit(&book(), Side::Buy, dec!(8), dec!(10), &rich())
        .unwrap();
    assert_eq!(plan.result.filled_amount, dec!(5));
    assert_eq!(
        plan.posted,
        Some(NewRestingOrder {
            side: Side::Buy,
            price: dec!(10),
            amount: dec!(3),
        })
    );
    assert_eq!(plan.taker_fee, dec!(0.1));
    assert_eq!(plan.maker_fee, dec!(0.015));
    assert_eq!(plan.required().unwrap(), (Asset::Quote, dec!(80)));
}

#[test]
fn limit_order_balance_covers_posted_part() {
    let balances = Balances::new(Decimal::ZERO, dec!(79));
    let err = planner()
        .plan_limit(&book(), Side::Buy, dec!(8), dec!(10), &balances)
        .unwrap_err();
    assert!(matches!(err, PlanError::InsufficientBalance { asset: Asset::Quote, .. }));
}

#[test]
fn fully_crossing_limit_posts_nothing() {
    let plan = planner()
        .plan_limit(&book(), Side::Sell, dec!(4), dec!(9), &rich())
        .unwrap();
    assert!(plan.result.fully_filled);
    assert!(plan.posted.is_none());
}

#[test]
fn invalid_request_surfaces_as_match_error() {
    let err = planner()
        .quote(&book(), &MatchRequest::limit(Side::Buy, dec!(1), dec!(-1)))
        .unwrap_err();
    assert!(matches!(err, PlanError::Match(_)));
}

#[test]
fn open_bids_reserve_quote_for_limit_buys() {
    let balances = Balances::new(Decimal::ZERO, dec!(100))
        .with_open_orders(&[NewRestingOrder {
            side: Side::Buy,
            price: dec!(10),
            amount: dec!(3),
        }])
        .unwrap();
    assert_eq!(balances.reserved_quote, dec!(30));
    let err = planner()
        .plan_limit(&book(), Side::Buy, dec!(8), dec!(10), &balances)
        .unwrap_err();
    assert_eq!(
        err,
        PlanError::InsufficientBalance {
            asset: Asset::Quote,
            required: dec!(80),
            available: dec!(70),
        }
    );
}

#[test]
fn open_asks_reserve_base_for_limit_sells() {
    let mut balances = Balances::new(dec!(5), Decimal::ZERO);
    balances
        .reserve(&NewRestingOrder {
            side: Side::Sell,
            price: dec!(12),
            amount: dec!(2),
        })
        .unwrap();
    let err = planner()
        .plan_limit(&book(), Side::Sell, dec!(4), dec!(9), &balances)
        .unwrap_err();
    assert!(matches!(err, PlanError::InsufficientBalance { asset: Asset::Base, .. }));
    assert!(planner().plan_limit(&book(), Side::Sell, dec!(3), dec!(9), &balances).is_ok());
}

#[test]
fn market_orders_check_the_whole_balance() {
    let balances = Balances::new(Decimal::ZERO, dec!(61))
        .with_open_orders(&[NewRestingOrder {
            side: Side::Buy,
            price: dec!(10),
            amount: dec!(3),
        }])
        .unwrap();
    assert!(planner().plan_market(&book(), Side::Buy, dec!(6), &balances).is_ok());
}

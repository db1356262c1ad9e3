use std::cmp::Ordering;

use crate::book::OrderBookSnapshot;
use crate::models::{RestingOrder, Side};

/// Best price first, then ascending arrival sequence. Limit prices are not applied here.
pub fn candidates(book: &OrderBookSnapshot, taker_side: Side) -> impl Iterator<Item = &RestingOrder> {
    let mut orders: Vec<&RestingOrder> = book.side(taker_side.opposite()).iter().collect();
    orders.sort_by(|a, b| priority(taker_side, a, b));
    orders.into_iter()
}

fn priority(taker_side: Side, a: &RestingOrder, b: &RestingOrder) -> Ordering {
    let by_price = match taker_side {
        Side::Buy => a.price.cmp(&b.price),
        Side::Sell => b.price.cmp(&a.price),
    };
    by_price.then_with(|| a.arrival_sequence.cmp(&b.arrival_sequence))
}

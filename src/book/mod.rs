use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::matching::{exact_add, selector};
use crate::models::{BookLevel, OrderId, Price, RestingOrder, Side};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookError {
    #[error("order {id} listed under {listed} but has side {actual}")]
    WrongSide { id: OrderId, listed: Side, actual: Side },
    #[error("duplicate order id {0}")]
    DuplicateId(OrderId),
    #[error("order {0} has a non-positive price")]
    NonPositivePrice(OrderId),
    #[error("order {0} has a negative remaining amount")]
    NegativeRemaining(OrderId),
    #[error("aggregated amount at price {0} is not representable")]
    LevelAmount(Price),
    #[error("encoding order book failed: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderBookSnapshot {
    buys: Vec<RestingOrder>,
    sells: Vec<RestingOrder>,
}

impl OrderBookSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(buys: Vec<RestingOrder>, sells: Vec<RestingOrder>) -> Result<Self, BookError> {
        let mut seen = HashSet::with_capacity(buys.len() + sells.len());
        for (listed, orders) in [(Side::Buy, &buys), (Side::Sell, &sells)] {
            for order in orders {
                if order.side != listed {
                    return Err(BookError::WrongSide {
                        id: order.id.clone(),
                        listed,
                        actual: order.side,
                    });
                }
                if order.price <= Decimal::ZERO {
                    return Err(BookError::NonPositivePrice(order.id.clone()));
                }
                if order.remaining_amount < Decimal::ZERO {
                    return Err(BookError::NegativeRemaining(order.id.clone()));
                }
                if !seen.insert(order.id.as_str()) {
                    return Err(BookError::DuplicateId(order.id.clone()));
                }
            }
        }
        Ok(Self { buys, sells })
    }

    pub fn from_orders<I>(orders: I) -> Result<Self, BookError>
    where
        I: IntoIterator<Item = RestingOrder>,
    {
        let (buys, sells) = orders.into_iter().partition(|o| o.side == Side::Buy);
        Self::new(buys, sells)
    }

    pub fn buys(&self) -> &[RestingOrder] {
        &self.buys
    }

    pub fn sells(&self) -> &[RestingOrder] {
        &self.sells
    }

    pub fn side(&self, side: Side) -> &[RestingOrder] {
        match side {
            Side::Buy => &self.buys,
            Side::Sell => &self.sells,
        }
    }

    pub fn len(&self) -> usize {
        self.buys.len() + self.sells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buys.is_empty() && self.sells.is_empty()
    }

    pub fn best_bid(&self) -> Option<Price> {
        live(&self.buys).map(|o| o.price).max()
    }

    pub fn best_ask(&self) -> Option<Price> {
        live(&self.sells).map(|o| o.price).min()
    }

    pub fn spread(&self) -> Option<Price> {
        Some(self.best_ask()? - self.best_bid()?)
    }

    /// Aggregated price levels for each side, best price first.
    pub fn depth(&self, levels: usize) -> Result<(Vec<BookLevel>, Vec<BookLevel>), BookError> {
        // A taker selling walks the bids, a taker buying walks the asks.
        Ok((
            aggregate(selector::candidates(self, Side::Sell), levels)?,
            aggregate(selector::candidates(self, Side::Buy), levels)?,
        ))
    }

    pub fn without<'a, I>(&self, excluded: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let excluded: HashSet<&str> = excluded.into_iter().collect();
        let keep = |orders: &[RestingOrder]| -> Vec<RestingOrder> {
            orders
                .iter()
                .filter(|o| !excluded.contains(o.id.as_str()))
                .cloned()
                .collect()
        };
        Self {
            buys: keep(&self.buys),
            sells: keep(&self.sells),
        }
    }

    pub fn fingerprint(&self) -> Result<blake3::Hash, BookError> {
        let encoded = bincode::serialize(self).map_err(|err| BookError::Encode(err.to_string()))?;
        Ok(blake3::hash(&encoded))
    }
}

fn live(orders: &[RestingOrder]) -> impl Iterator<Item = &RestingOrder> {
    orders.iter().filter(|o| o.remaining_amount > Decimal::ZERO)
}

fn aggregate<'a>(orders: impl Iterator<Item = &'a RestingOrder>, levels: usize) -> Result<Vec<BookLevel>, BookError> {
    let mut out: Vec<BookLevel> = Vec::new();
    for order in orders.filter(|o| o.remaining_amount > Decimal::ZERO) {
        match out.last_mut() {
            Some(level) if level.price == order.price => {
                level.amount = exact_add(level.amount, order.remaining_amount)
                    .map_err(|_| BookError::LevelAmount(level.price))?;
                level.orders += 1;
            }
            _ => {
                if out.len() == levels {
                    break;
                }
                out.push(BookLevel {
                    price: order.price,
                    amount: order.remaining_amount,
                    orders: 1,
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sell(id: &str, price: Decimal, remaining: Decimal, seq: u64) -> RestingOrder {
        RestingOrder::new(id, Side::Sell, price, remaining, seq)
    }

    fn buy(id: &str, price: Decimal, remaining: Decimal, seq: u64) -> RestingOrder {
        RestingOrder::new(id, Side::Buy, price, remaining, seq)
    }

    #[test]
    fn rejects_order_on_wrong_side() {
        let err = OrderBookSnapshot::new(vec![sell("a", dec!(1), dec!(1), 1)], vec![]).unwrap_err();
        assert!(matches!(err, BookError::WrongSide { listed: Side::Buy, .. }));
    }

    #[test]
    fn rejects_id_on_both_sides() {
        let err = OrderBookSnapshot::new(
            vec![buy("a", dec!(1), dec!(1), 1)],
            vec![sell("a", dec!(2), dec!(1), 2)],
        )
        .unwrap_err();
        assert_eq!(err, BookError::DuplicateId("a".to_string()));
    }

    #[test]
    fn rejects_zero_price() {
        let err = OrderBookSnapshot::from_orders([buy("a", dec!(0), dec!(1), 1)]).unwrap_err();
        assert_eq!(err, BookError::NonPositivePrice("a".to_string()));
    }

    #[test]
    fn from_orders_partitions_by_side() {
        let book = OrderBookSnapshot::from_orders([
            buy("b1", dec!(9), dec!(1), 1),
            sell("s1", dec!(11), dec!(1), 2),
            buy("b2", dec!(10), dec!(1), 3),
        ])
        .unwrap();
        assert_eq!(book.buys().len(), 2);
        assert_eq!(book.sells().len(), 1);
        assert_eq!(book.best_bid(), Some(dec!(10)));
        assert_eq!(book.best_ask(), Some(dec!(11)));
        assert_eq!(book.spread(), Some(dec!(1)));
    }

    #[test]
    fn depth_groups_levels_best_first() {
        let book = OrderBookSnapshot::from_orders([
            sell("s1", dec!(11), dec!(2), 1),
            sell("s2", dec!(10), dec!(1), 2),
            sell("s3", dec!(10), dec!(4), 3),
            sell("s4", dec!(12), dec!(1), 4),
            buy("b1", dec!(9), dec!(3), 5),
            buy("b2", dec!(8), dec!(0), 6),
        ])
        .unwrap();
        let (bids, asks) = book.depth(2).unwrap();
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].price, dec!(9));
        assert_eq!(asks.len(), 2);
        assert_eq!(asks[0], BookLevel { price: dec!(10), amount: dec!(5), orders: 2 });
        assert_eq!(asks[1].price, dec!(11));
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = OrderBookSnapshot::from_orders([sell("s1", dec!(11), dec!(2), 1)]).unwrap();
        let b = OrderBookSnapshot::from_orders([sell("s1", dec!(11), dec!(1), 1)]).unwrap();
        assert_eq!(a.fingerprint().unwrap(), a.clone().fingerprint().unwrap());
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn level_sum_beyond_decimal_range_is_an_error() {
        let book = OrderBookSnapshot::from_orders([
            sell("s1", dec!(1), Decimal::MAX, 1),
            sell("s2", dec!(1), Decimal::MAX, 2),
        ])
        .unwrap();
        assert_eq!(book.depth(5).unwrap_err(), BookError::LevelAmount(dec!(1)));
    }
}

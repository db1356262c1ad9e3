use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type MarketId = String;
pub type OrderId = String;
pub type Price = Decimal;
pub type Amount = Decimal;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestingOrder {
    pub id: OrderId,
    pub side: Side,
    pub price: Price,
    pub remaining_amount: Amount,
    pub arrival_sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maker: Option<String>,
}

impl RestingOrder {
    pub fn new(id: impl Into<OrderId>, side: Side, price: Price, remaining_amount: Amount, arrival_sequence: u64) -> Self {
        Self {
            id: id.into(),
            side,
            price,
            remaining_amount,
            arrival_sequence,
            maker: None,
        }
    }

    pub fn with_maker(mut self, maker: impl Into<String>) -> Self {
        self.maker = Some(maker.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchRequest {
    pub side: Side,
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Price>,
}

impl MatchRequest {
    pub fn market(side: Side, amount: Amount) -> Self {
        Self {
            side,
            amount,
            limit_price: None,
        }
    }

    pub fn limit(side: Side, amount: Amount, limit_price: Price) -> Self {
        Self {
            side,
            amount,
            limit_price: Some(limit_price),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fill {
    pub order_id: OrderId,
    pub price: Price,
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maker: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchResult {
    pub requested_amount: Amount,
    pub consumed_orders: Vec<Fill>,
    pub filled_amount: Amount,
    pub fully_filled: bool,
    /// Sum of `amount * price` over the consumed orders.
    pub quote_amount: Decimal,
    pub average_price: Option<Price>,
}

impl MatchResult {
    pub fn remaining_amount(&self) -> Amount {
        self.requested_amount - self.filled_amount
    }

    pub fn is_empty(&self) -> bool {
        self.consumed_orders.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookLevel {
    pub price: Price,
    pub amount: Amount,
    pub orders: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookUpdate {
    pub market: MarketId,
    pub orders: Vec<RestingOrder>,
}

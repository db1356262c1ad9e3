use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::book::OrderBookSnapshot;
use crate::config::MarketConfig;
use crate::matching::{self, MatchError, exact_add, exact_mul};
use crate::models::{Amount, MatchRequest, MatchResult, Price, Side};

const BPS_DENOMINATOR: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Asset {
    Base,
    Quote,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("insufficient orders to fill {requested}: only {available} available")]
    InsufficientLiquidity { requested: Amount, available: Amount },
    #[error("insufficient {asset:?} balance: need {required}, have {available}")]
    InsufficientBalance {
        asset: Asset,
        required: Decimal,
        available: Decimal,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub maker_fee_bps: u32,
    pub taker_fee_bps: u32,
}

impl From<&MarketConfig> for FeeSchedule {
    fn from(market: &MarketConfig) -> Self {
        Self {
            maker_fee_bps: market.maker_fee_bps,
            taker_fee_bps: market.taker_fee_bps,
        }
    }
}

/// Wallet balances of the taker. `reserved_*` is what the taker's own
/// fillable orders already commit; limit orders may only use the rest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub base: Decimal,
    pub quote: Decimal,
    #[serde(default)]
    pub reserved_base: Decimal,
    #[serde(default)]
    pub reserved_quote: Decimal,
}

impl Balances {
    pub fn new(base: Decimal, quote: Decimal) -> Self {
        Self {
            base,
            quote,
            ..Self::default()
        }
    }

    pub fn reserve(&mut self, open: &NewRestingOrder) -> Result<(), MatchError> {
        match open.side {
            Side::Buy => self.reserved_quote = exact_add(self.reserved_quote, open.notional()?)?,
            Side::Sell => self.reserved_base = exact_add(self.reserved_base, open.amount)?,
        }
        Ok(())
    }

    pub fn with_open_orders<'a, I>(mut self, open: I) -> Result<Self, MatchError>
    where
        I: IntoIterator<Item = &'a NewRestingOrder>,
    {
        for order in open {
            self.reserve(order)?;
        }
        Ok(self)
    }

    fn total(&self, asset: Asset) -> Decimal {
        match asset {
            Asset::Base => self.base,
            Asset::Quote => self.quote,
        }
    }

    fn free(&self, asset: Asset) -> Result<Decimal, MatchError> {
        let reserved = match asset {
            Asset::Base => self.reserved_base,
            Asset::Quote => self.reserved_quote,
        };
        self.total(asset).checked_sub(reserved).ok_or(MatchError::Overflow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRestingOrder {
    pub side: Side,
    pub price: Price,
    pub amount: Amount,
}

impl NewRestingOrder {
    pub fn notional(&self) -> Result<Decimal, MatchError> {
        exact_mul(self.amount, self.price)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlan {
    pub side: Side,
    pub result: MatchResult,
    pub posted: Option<NewRestingOrder>,
    pub taker_fee: Decimal,
    pub maker_fee: Decimal,
}

impl OrderPlan {
    pub fn required(&self) -> Result<(Asset, Decimal), MatchError> {
        match self.side {
            Side::Buy => {
                let posted = match &self.posted {
                    Some(order) => order.notional()?,
                    None => Decimal::ZERO,
                };
                Ok((Asset::Quote, exact_add(self.result.quote_amount, posted)?))
            }
            Side::Sell => {
                let posted = self.posted.as_ref().map_or(Decimal::ZERO, |order| order.amount);
                Ok((Asset::Base, exact_add(self.result.filled_amount, posted)?))
            }
        }
    }
}

/// Market orders are all-or-nothing; limit orders post what does not cross.
#[derive(Debug, Clone, Copy, Default)]
pub struct Planner {
    fees: FeeSchedule,
}

impl Planner {
    pub fn new(fees: FeeSchedule) -> Self {
        Self { fees }
    }

    pub fn fees(&self) -> FeeSchedule {
        self.fees
    }

    pub fn quote(&self, book: &OrderBookSnapshot, request: &MatchRequest) -> Result<OrderPlan, PlanError> {
        let result = matching::execute(book, request)?;
        let posted = match request.limit_price {
            None if !result.fully_filled => {
                return Err(PlanError::InsufficientLiquidity {
                    requested: request.amount,
                    available: result.filled_amount,
                });
            }
            None => None,
            Some(limit_price) => {
                let remainder = result.remaining_amount();
                (!remainder.is_zero()).then(|| NewRestingOrder {
                    side: request.side,
                    price: limit_price,
                    amount: remainder,
                })
            }
        };

        let taker_fee = fee(result.quote_amount, self.fees.taker_fee_bps)?;
        let maker_fee = match &posted {
            Some(order) => fee(order.notional()?, self.fees.maker_fee_bps)?,
            None => Decimal::ZERO,
        };
        debug!(
            side = %request.side,
            amount = %request.amount,
            filled = %result.filled_amount,
            posted = posted.is_some(),
            "planned order"
        );
        Ok(OrderPlan {
            side: request.side,
            result,
            posted,
            taker_fee,
            maker_fee,
        })
    }

    pub fn plan_market(
        &self,
        book: &OrderBookSnapshot,
        side: Side,
        amount: Amount,
        balances: &Balances,
    ) -> Result<OrderPlan, PlanError> {
        let plan = self.quote(book, &MatchRequest::market(side, amount))?;
        let (asset, required) = plan.required()?;
        check_balance(asset, required, balances.total(asset))?;
        Ok(plan)
    }

    pub fn plan_limit(
        &self,
        book: &OrderBookSnapshot,
        side: Side,
        amount: Amount,
        limit_price: Price,
        balances: &Balances,
    ) -> Result<OrderPlan, PlanError> {
        let plan = self.quote(book, &MatchRequest::limit(side, amount, limit_price))?;
        let (asset, required) = plan.required()?;
        check_balance(asset, required, balances.free(asset)?)?;
        Ok(plan)
    }
}

fn check_balance(asset: Asset, required: Decimal, available: Decimal) -> Result<(), PlanError> {
    if available < required {
        return Err(PlanError::InsufficientBalance {
            asset,
            required,
            available,
        });
    }
    Ok(())
}

fn fee(notional: Decimal, fee_bps: u32) -> Result<Decimal, MatchError> {
    notional
        .checked_mul(Decimal::from(fee_bps))
        .and_then(|scaled| scaled.checked_div(Decimal::from(BPS_DENOMINATOR)))
        .ok_or(MatchError::Overflow)
}

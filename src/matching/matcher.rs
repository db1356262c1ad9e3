use rust_decimal::Decimal;

use crate::book::OrderBookSnapshot;
use crate::matching::{MatchError, exact_add, exact_mul, exact_sub, selector};
use crate::models::{Amount, Fill, MatchResult, Price, RestingOrder, Side};

/// Fills as much of `amount` as the book offers, best price first.
pub fn match_market(book: &OrderBookSnapshot, side: Side, amount: Amount) -> Result<MatchResult, MatchError> {
    validate_amount(amount)?;
    walk(selector::candidates(book, side), amount)
}

pub fn match_limit(
    book: &OrderBookSnapshot,
    side: Side,
    amount: Amount,
    limit_price: Price,
) -> Result<MatchResult, MatchError> {
    validate_amount(amount)?;
    if limit_price <= Decimal::ZERO {
        return Err(MatchError::InvalidRequest("limit price must be positive"));
    }
    let eligible = selector::candidates(book, side).take_while(move |order| match side {
        Side::Buy => order.price <= limit_price,
        Side::Sell => order.price >= limit_price,
    });
    walk(eligible, amount)
}

fn validate_amount(amount: Amount) -> Result<(), MatchError> {
    if amount <= Decimal::ZERO {
        return Err(MatchError::InvalidRequest("amount must be positive"));
    }
    Ok(())
}

fn walk<'a>(candidates: impl Iterator<Item = &'a RestingOrder>, amount: Amount) -> Result<MatchResult, MatchError> {
    let mut remaining = amount;
    let mut consumed = Vec::new();
    let mut quote_amount = Decimal::ZERO;

    for order in candidates {
        if remaining.is_zero() {
            break;
        }
        // Exhausted orders should already be gone from a fresh snapshot.
        if order.remaining_amount <= Decimal::ZERO {
            continue;
        }
        let take = remaining.min(order.remaining_amount);
        let notional = exact_mul(take, order.price)?;
        quote_amount = exact_add(quote_amount, notional)?;
        remaining = exact_sub(remaining, take)?;
        consumed.push(Fill {
            order_id: order.id.clone(),
            price: order.price,
            amount: take,
            maker: order.maker.clone(),
        });
    }

    let filled_amount = exact_sub(amount, remaining)?;
    let average_price = if filled_amount.is_zero() {
        None
    } else {
        Some(
            quote_amount
                .checked_div(filled_amount)
                .ok_or(MatchError::Overflow)?
                .normalize(),
        )
    };

    Ok(MatchResult {
        requested_amount: amount,
        consumed_orders: consumed,
        filled_amount,
        fully_filled: remaining.is_zero(),
        quote_amount,
        average_price,
    })
}

pub mod matcher;
pub mod selector;

pub use matcher::{match_limit, match_market};

use rust_decimal::Decimal;

use crate::book::OrderBookSnapshot;
use crate::models::{MatchRequest, MatchResult};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("decimal overflow while matching")]
    Overflow,
    #[error("result of {0} is not exactly representable")]
    Inexact(&'static str),
}

pub fn execute(book: &OrderBookSnapshot, request: &MatchRequest) -> Result<MatchResult, MatchError> {
    match request.limit_price {
        Some(limit_price) => match_limit(book, request.side, request.amount, limit_price),
        None => match_market(book, request.side, request.amount),
    }
}

// `Decimal` silently drops trailing digits once a result needs more than 28
// of them, lowering the scale. An exact sum keeps the larger operand scale and
// an exact product the sum of both scales, so a lower scale means rounding.

pub(crate) fn exact_add(a: Decimal, b: Decimal) -> Result<Decimal, MatchError> {
    let (a, b) = (a.normalize(), b.normalize());
    let out = a.checked_add(b).ok_or(MatchError::Overflow)?;
    if out.scale() < a.scale().max(b.scale()) {
        return Err(MatchError::Inexact("addition"));
    }
    Ok(out)
}

pub(crate) fn exact_sub(a: Decimal, b: Decimal) -> Result<Decimal, MatchError> {
    let (a, b) = (a.normalize(), b.normalize());
    let out = a.checked_sub(b).ok_or(MatchError::Overflow)?;
    if out.scale() < a.scale().max(b.scale()) {
        return Err(MatchError::Inexact("subtraction"));
    }
    Ok(out)
}

pub(crate) fn exact_mul(a: Decimal, b: Decimal) -> Result<Decimal, MatchError> {
    let (a, b) = (a.normalize(), b.normalize());
    let out = a.checked_mul(b).ok_or(MatchError::Overflow)?;
    if out.scale() < a.scale() + b.scale() {
        return Err(MatchError::Inexact("multiplication"));
    }
    Ok(out)
}

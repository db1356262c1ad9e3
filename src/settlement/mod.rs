use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::feed::OrderBookSource;
use crate::matching::MatchError;
use crate::models::{Amount, Fill, Price, Side};
use crate::planner::{Balances, NewRestingOrder, PlanError, Planner};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    Settled { filled: Amount },
    Partial { filled: Amount },
    Failed { reason: String },
}

#[async_trait::async_trait]
pub trait SettlementSubmitter: Send + Sync {
    async fn submit(&self, market: &str, side: Side, fills: &[Fill]) -> anyhow::Result<SettlementOutcome>;
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("fetching order book failed: {0}")]
    Source(#[source] anyhow::Error),
    #[error("submitting settlement failed: {0}")]
    Submit(#[source] anyhow::Error),
    #[error("settlement rejected: {0}")]
    Rejected(String),
    #[error("settled {settled} of {requested} after {attempts} attempts")]
    Incomplete {
        requested: Amount,
        settled: Amount,
        attempts: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub requested: Amount,
    pub settled: Amount,
    pub attempts: usize,
    pub submitted: Vec<Fill>,
    pub posted: Option<NewRestingOrder>,
}

/// Re-matches against a fresh book while settlement reports less than predicted.
pub struct Reconciler {
    source: Arc<dyn OrderBookSource>,
    submitter: Arc<dyn SettlementSubmitter>,
    planner: Planner,
    max_attempts: usize,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn OrderBookSource>,
        submitter: Arc<dyn SettlementSubmitter>,
        planner: Planner,
        max_attempts: usize,
    ) -> Self {
        Self {
            source,
            submitter,
            planner,
            max_attempts: max_attempts.max(1),
        }
    }

    #[instrument(skip(self, balances))]
    pub async fn execute_market(
        &self,
        market: &str,
        side: Side,
        amount: Amount,
        balances: Balances,
    ) -> Result<Execution, ReconcileError> {
        let mut balances = balances;
        let mut settled = Decimal::ZERO;
        let mut submitted: Vec<Fill> = Vec::new();
        let mut attempts = 0;

        while attempts < self.max_attempts {
            attempts += 1;
            let outstanding = amount - settled;
            let book = self.source.fetch(market).await.map_err(ReconcileError::Source)?;
            let book = book.without(submitted.iter().map(|f| f.order_id.as_str()));

            let plan = match self.planner.plan_market(&book, side, outstanding, &balances) {
                Ok(plan) => plan,
                Err(err) if settled.is_zero() => return Err(err.into()),
                Err(err) => {
                    warn!(error = %err, %settled, "cannot re-match outstanding amount");
                    return Err(ReconcileError::Incomplete {
                        requested: amount,
                        settled,
                        attempts,
                    });
                }
            };

            let fills = plan.result.consumed_orders.clone();
            let outcome = self
                .submitter
                .submit(market, side, &fills)
                .await
                .map_err(ReconcileError::Submit)?;
            submitted.extend(fills);

            let filled = match outcome {
                SettlementOutcome::Settled { filled } | SettlementOutcome::Partial { filled } => filled.min(outstanding),
                SettlementOutcome::Failed { reason } => return Err(ReconcileError::Rejected(reason)),
            };
            settled += filled;
            spend(&mut balances, side, filled, plan.result.average_price).map_err(PlanError::from)?;

            if filled == outstanding {
                info!(%settled, attempts, "market order settled");
                return Ok(Execution {
                    requested: amount,
                    settled,
                    attempts,
                    submitted,
                    posted: None,
                });
            }
            warn!(predicted = %outstanding, %filled, "settlement differs from prediction, re-matching");
        }

        Err(ReconcileError::Incomplete {
            requested: amount,
            settled,
            attempts,
        })
    }

    #[instrument(skip(self, balances))]
    pub async fn execute_limit(
        &self,
        market: &str,
        side: Side,
        amount: Amount,
        limit_price: Price,
        balances: Balances,
    ) -> Result<Execution, ReconcileError> {
        let book = self.source.fetch(market).await.map_err(ReconcileError::Source)?;
        let plan = self.planner.plan_limit(&book, side, amount, limit_price, &balances)?;

        let mut settled = Decimal::ZERO;
        let submitted = plan.result.consumed_orders.clone();
        if !submitted.is_empty() {
            let outcome = self
                .submitter
                .submit(market, side, &submitted)
                .await
                .map_err(ReconcileError::Submit)?;
            settled = match outcome {
                SettlementOutcome::Settled { filled } | SettlementOutcome::Partial { filled } => {
                    filled.min(plan.result.filled_amount)
                }
                SettlementOutcome::Failed { reason } => {
                    warn!(%reason, "crossing fills rejected, posting full amount");
                    Decimal::ZERO
                }
            };
        }

        let remainder = amount - settled;
        let posted = (!remainder.is_zero()).then(|| NewRestingOrder {
            side,
            price: limit_price,
            amount: remainder,
        });
        info!(%settled, %remainder, "limit order executed");
        Ok(Execution {
            requested: amount,
            settled,
            attempts: 1,
            submitted,
            posted,
        })
    }
}

fn spend(balances: &mut Balances, side: Side, filled: Amount, average_price: Option<Price>) -> Result<(), MatchError> {
    match side {
        Side::Buy => {
            let cost = match average_price {
                Some(price) => price.checked_mul(filled).ok_or(MatchError::Overflow)?,
                None => Decimal::ZERO,
            };
            balances.quote = (balances.quote - cost).max(Decimal::ZERO);
        }
        Side::Sell => balances.base = (balances.base - filled).max(Decimal::ZERO),
    }
    Ok(())
}

use std::sync::Arc;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::book::OrderBookSnapshot;
use crate::bus::{Bus, request_json};
use crate::feed::OrderBookSource;
use crate::models::{BookUpdate, Fill, MarketId, Side};
use crate::settlement::{SettlementOutcome, SettlementSubmitter};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookFetch {
    pub market: MarketId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleRequest {
    pub market: MarketId,
    pub side: Side,
    pub fills: Vec<Fill>,
}

pub struct BusBookSource {
    bus: Arc<dyn Bus>,
    subject: String,
}

impl BusBookSource {
    pub fn new(bus: Arc<dyn Bus>, subject: impl Into<String>) -> Self {
        Self {
            bus,
            subject: subject.into(),
        }
    }
}

#[async_trait::async_trait]
impl OrderBookSource for BusBookSource {
    async fn fetch(&self, market: &str) -> anyhow::Result<OrderBookSnapshot> {
        let fetch = BookFetch {
            market: market.to_string(),
        };
        let update: BookUpdate = request_json(self.bus.as_ref(), &self.subject, &fetch).await?;
        if update.market != market {
            bail!("relayer answered {market} with the book of {}", update.market);
        }
        debug!(%market, orders = update.orders.len(), "fetched order book");
        Ok(OrderBookSnapshot::from_orders(update.orders)?)
    }
}

pub struct BusSettlementSubmitter {
    bus: Arc<dyn Bus>,
    subject: String,
}

impl BusSettlementSubmitter {
    pub fn new(bus: Arc<dyn Bus>, subject: impl Into<String>) -> Self {
        Self {
            bus,
            subject: subject.into(),
        }
    }
}

#[async_trait::async_trait]
impl SettlementSubmitter for BusSettlementSubmitter {
    async fn submit(&self, market: &str, side: Side, fills: &[Fill]) -> anyhow::Result<SettlementOutcome> {
        let request = SettleRequest {
            market: market.to_string(),
            side,
            fills: fills.to_vec(),
        };
        request_json(self.bus.as_ref(), &self.subject, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::MemoryBus;
    use crate::bus::publish_json;
    use crate::models::RestingOrder;
    use rust_decimal_macros::dec;
    use tokio_stream::StreamExt;

    async fn answer_once<Req, Resp>(bus: Arc<MemoryBus>, subject: &str, reply: impl FnOnce(Req) -> Resp + Send + 'static)
    where
        Req: serde::de::DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + Sync + 'static,
    {
        let mut requests = bus.subscribe(subject).await.unwrap();
        tokio::spawn(async move {
            let message = requests.stream.next().await.unwrap();
            let response = reply(message.decode::<Req>().unwrap());
            publish_json(bus.as_ref(), &message.reply.unwrap(), &response).await.unwrap();
        });
    }

    #[tokio::test]
    async fn fetches_book_for_the_requested_market() {
        let bus = Arc::new(MemoryBus::new());
        answer_once(bus.clone(), "relayer.book", |fetch: BookFetch| BookUpdate {
            market: fetch.market,
            orders: vec![RestingOrder::new("s1", Side::Sell, dec!(10), dec!(1), 1)],
        })
        .await;
        let source = BusBookSource::new(bus, "relayer.book");
        let book = source.fetch("ZRX-WETH").await.unwrap();
        assert_eq!(book.best_ask(), Some(dec!(10)));
    }

    #[tokio::test]
    async fn book_of_another_market_is_refused() {
        let bus = Arc::new(MemoryBus::new());
        answer_once(bus.clone(), "relayer.book", |_: BookFetch| BookUpdate {
            market: "DAI-WETH".to_string(),
            orders: Vec::new(),
        })
        .await;
        let source = BusBookSource::new(bus, "relayer.book");
        assert!(source.fetch("ZRX-WETH").await.is_err());
    }

    #[tokio::test]
    async fn settlement_outcome_comes_from_the_reply() {
        let bus = Arc::new(MemoryBus::new());
        answer_once(bus.clone(), "relayer.settle", |request: SettleRequest| SettlementOutcome::Partial {
            filled: request.fills[0].amount / dec!(2),
        })
        .await;
        let submitter = BusSettlementSubmitter::new(bus, "relayer.settle");
        let fills = [Fill {
            order_id: "s1".to_string(),
            price: dec!(10),
            amount: dec!(3),
            maker: None,
        }];
        let outcome = submitter.submit("ZRX-WETH", Side::Buy, &fills).await.unwrap();
        assert_eq!(outcome, SettlementOutcome::Partial { filled: dec!(1.5) });
    }
}

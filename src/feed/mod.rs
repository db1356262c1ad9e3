use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use metrics::counter;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, instrument, warn};

use crate::book::OrderBookSnapshot;
use crate::metrics::BOOK_UPDATES;
use crate::models::MarketId;

type Slot = Option<Arc<OrderBookSnapshot>>;

#[async_trait::async_trait]
pub trait OrderBookSource: Send + Sync {
    async fn fetch(&self, market: &str) -> anyhow::Result<OrderBookSnapshot>;
}

#[derive(Debug, Clone)]
pub struct BookHandle {
    rx: watch::Receiver<Slot>,
}

impl BookHandle {
    pub fn current(&self) -> Option<Arc<OrderBookSnapshot>> {
        self.rx.borrow().clone()
    }

    /// Resolves once the first snapshot has been published.
    pub async fn ready(&mut self) -> anyhow::Result<Arc<OrderBookSnapshot>> {
        let slot = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| anyhow::anyhow!("book feed closed before the first snapshot"))?;
        (*slot)
            .clone()
            .ok_or_else(|| anyhow::anyhow!("book feed published an empty slot"))
    }

    pub async fn changed(&mut self) -> anyhow::Result<Arc<OrderBookSnapshot>> {
        self.rx
            .changed()
            .await
            .map_err(|_| anyhow::anyhow!("book feed closed"))?;
        self.rx
            .borrow_and_update()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("book feed published an empty slot"))
    }
}

#[derive(Debug)]
pub struct BookPublisher {
    market: MarketId,
    tx: watch::Sender<Slot>,
    last: Option<blake3::Hash>,
}

impl BookPublisher {
    pub fn new(market: impl Into<MarketId>) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            market: market.into(),
            tx,
            last: None,
        }
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    pub fn subscribe(&self) -> BookHandle {
        BookHandle { rx: self.tx.subscribe() }
    }

    pub fn current(&self) -> Option<Arc<OrderBookSnapshot>> {
        self.tx.borrow().clone()
    }

    /// Returns `false` when the book is identical to the one already published.
    pub fn publish(&mut self, snapshot: OrderBookSnapshot) -> bool {
        let fingerprint = match snapshot.fingerprint() {
            Ok(fingerprint) => Some(fingerprint),
            Err(err) => {
                warn!(market = %self.market, error = %err, "cannot fingerprint order book, publishing as changed");
                None
            }
        };
        self.replace(snapshot, fingerprint)
    }

    fn replace(&mut self, snapshot: OrderBookSnapshot, fingerprint: Option<blake3::Hash>) -> bool {
        if fingerprint.is_some() && self.last == fingerprint {
            debug!(market = %self.market, "order book unchanged");
            return false;
        }
        self.last = fingerprint;
        debug!(market = %self.market, orders = snapshot.len(), "publishing order book");
        self.tx.send_replace(Some(Arc::new(snapshot)));
        true
    }
}

pub struct LatestBooks {
    handles: HashMap<MarketId, BookHandle>,
}

impl LatestBooks {
    pub fn new(handles: HashMap<MarketId, BookHandle>) -> Self {
        Self { handles }
    }
}

#[async_trait::async_trait]
impl OrderBookSource for LatestBooks {
    async fn fetch(&self, market: &str) -> anyhow::Result<OrderBookSnapshot> {
        let handle = self.handles.get(market).ok_or_else(|| anyhow!("unknown market {market}"))?;
        let book = handle.current().ok_or_else(|| anyhow!("order book not ready"))?;
        Ok(book.as_ref().clone())
    }
}

pub struct BookFeed {
    publisher: BookPublisher,
    source: Arc<dyn OrderBookSource>,
}

impl BookFeed {
    pub fn new(market: impl Into<MarketId>, source: Arc<dyn OrderBookSource>) -> Self {
        Self {
            publisher: BookPublisher::new(market),
            source,
        }
    }

    pub fn subscribe(&self) -> BookHandle {
        self.publisher.subscribe()
    }

    #[instrument(skip(self), fields(market = %self.publisher.market))]
    pub async fn refresh(&mut self) -> anyhow::Result<bool> {
        let snapshot = self.source.fetch(&self.publisher.market).await?;
        let changed = self.publisher.publish(snapshot);
        if changed {
            counter!(BOOK_UPDATES).increment(1);
        }
        Ok(changed)
    }

    /// A failed fetch keeps the previous snapshot current.
    pub async fn run(mut self, period: Duration, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.refresh().await {
                        warn!(market = %self.publisher.market, error = %err, "order book refresh failed");
                    }
                }
            }
        }
        info!(market = %self.publisher.market, "book feed stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RestingOrder, Side};
    use rust_decimal_macros::dec;

    #[test]
    fn identical_snapshot_is_not_republished() {
        let mut publisher = BookPublisher::new("m");
        let book = OrderBookSnapshot::from_orders([RestingOrder::new("a", Side::Sell, dec!(1), dec!(1), 1)]).unwrap();
        assert!(publisher.publish(book.clone()));
        assert!(!publisher.publish(book));
        assert!(publisher.current().is_some());
    }

    #[test]
    fn unfingerprinted_snapshot_is_always_published() {
        let mut publisher = BookPublisher::new("m");
        assert!(publisher.replace(OrderBookSnapshot::empty(), None));
        assert!(publisher.replace(OrderBookSnapshot::empty(), None));
        let fingerprint = OrderBookSnapshot::empty().fingerprint().ok();
        assert!(publisher.replace(OrderBookSnapshot::empty(), fingerprint));
        assert!(!publisher.replace(OrderBookSnapshot::empty(), fingerprint));
    }

    #[tokio::test]
    async fn ready_resolves_after_first_publish() {
        let mut publisher = BookPublisher::new("m");
        let mut handle = publisher.subscribe();
        assert!(handle.current().is_none());
        publisher.publish(OrderBookSnapshot::empty());
        let book = handle.ready().await.unwrap();
        assert!(book.is_empty());
    }

    #[tokio::test]
    async fn ready_fails_when_publisher_dropped() {
        let publisher = BookPublisher::new("m");
        let mut handle = publisher.subscribe();
        drop(publisher);
        assert!(handle.ready().await.is_err());
    }
}

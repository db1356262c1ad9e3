use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio::sync::oneshot;

use dex_matcher::feed::{BookFeed, OrderBookSource};
use dex_matcher::{OrderBookSnapshot, RestingOrder, Side};

/// Serves a growing book on each fetch; the first fetch fails.
struct FlakySource {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl OrderBookSource for FlakySource {
    async fn fetch(&self, _market: &str) -> anyhow::Result<OrderBookSnapshot> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            anyhow::bail!("relayer unavailable");
        }
        let orders = (0..call).map(|i| RestingOrder::new(format!("s{i}"), Side::Sell, dec!(10), dec!(1), i as u64));
        Ok(OrderBookSnapshot::from_orders(orders)?)
    }
}

#[tokio::test]
async fn refresh_error_leaves_book_unset() {
    let source = Arc::new(FlakySource { calls: AtomicUsize::new(0) });
    let mut feed = BookFeed::new("ZRX-WETH", source);
    let handle = feed.subscribe();
    assert!(feed.refresh().await.is_err());
    assert!(handle.current().is_none());
    assert!(feed.refresh().await.unwrap());
    assert_eq!(handle.current().unwrap().len(), 1);
}

#[tokio::test]
async fn dependents_wait_for_first_snapshot() {
    let source = Arc::new(FlakySource { calls: AtomicUsize::new(0) });
    let feed = BookFeed::new("ZRX-WETH", source);
    let mut first = feed.subscribe();
    let mut second = first.clone();
    let (stop, shutdown) = oneshot::channel();
    let task = tokio::spawn(feed.run(Duration::from_millis(5), shutdown));

    let book = tokio::time::timeout(Duration::from_secs(5), first.ready())
        .await
        .unwrap()
        .unwrap();
    assert!(!book.is_empty());
    let newer = tokio::time::timeout(Duration::from_secs(5), second.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(!newer.is_empty());

    stop.send(()).unwrap();
    task.await.unwrap();
}

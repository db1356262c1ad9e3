use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use lru::LruCache;
use metrics::counter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_stream::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::book::OrderBookSnapshot;
use crate::bus::{Bus, BusMessage, BusSubscription, publish_json};
use crate::config::Settings;
use crate::feed::{BookFeed, BookHandle, BookPublisher, LatestBooks, OrderBookSource};
use crate::metrics::{BOOK_UPDATES, EXECUTION_FAILURES, EXECUTIONS, QUOTE_REJECTIONS, QUOTE_REQUESTS};
use crate::models::{BookUpdate, MarketId, MatchRequest};
use crate::planner::{Balances, FeeSchedule, OrderPlan, Planner};
use crate::relayer::{BusBookSource, BusSettlementSubmitter};
use crate::settlement::{Execution, Reconciler, SettlementSubmitter};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub request_id: String,
    pub market: MarketId,
    #[serde(flatten)]
    pub request: MatchRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteOutcome {
    Planned(OrderPlan),
    Rejected(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteResponse {
    pub request_id: String,
    pub market: MarketId,
    pub outcome: QuoteOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub request_id: String,
    pub market: MarketId,
    #[serde(flatten)]
    pub request: MatchRequest,
    #[serde(default)]
    pub balances: Balances,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteOutcome {
    Executed(Execution),
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub request_id: String,
    pub market: MarketId,
    pub outcome: ExecuteOutcome,
}

pub struct MatchService {
    planners: HashMap<MarketId, Planner>,
    handles: HashMap<MarketId, BookHandle>,
    // Empty when books are polled.
    publishers: DashMap<MarketId, BookPublisher>,
    reconcilers: HashMap<MarketId, Reconciler>,
    dedupe: Mutex<LruCache<String, ()>>,
}

impl MatchService {
    pub fn new(settings: &Settings) -> Self {
        let publishers: DashMap<MarketId, BookPublisher> = settings
            .markets
            .iter()
            .map(|m| (m.market.clone(), BookPublisher::new(m.market.clone())))
            .collect();
        let handles = publishers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().subscribe()))
            .collect();
        Self::with_books(settings, handles, publishers)
    }

    /// The caller runs the returned feeds.
    pub fn polling(settings: &Settings, source: Arc<dyn OrderBookSource>) -> (Self, Vec<BookFeed>) {
        let feeds: Vec<BookFeed> = settings
            .markets
            .iter()
            .map(|m| BookFeed::new(m.market.clone(), source.clone()))
            .collect();
        let handles = settings
            .markets
            .iter()
            .zip(&feeds)
            .map(|(m, feed)| (m.market.clone(), feed.subscribe()))
            .collect();
        (Self::with_books(settings, handles, DashMap::new()), feeds)
    }

    fn with_books(
        settings: &Settings,
        handles: HashMap<MarketId, BookHandle>,
        publishers: DashMap<MarketId, BookPublisher>,
    ) -> Self {
        let planners = settings
            .markets
            .iter()
            .map(|m| (m.market.clone(), Planner::new(FeeSchedule::from(m))))
            .collect();
        let window = NonZeroUsize::new(settings.dedupe_window).unwrap_or(NonZeroUsize::MIN);
        Self {
            planners,
            handles,
            publishers,
            reconcilers: HashMap::new(),
            dedupe: Mutex::new(LruCache::new(window)),
        }
    }

    pub fn with_execution(
        mut self,
        source: Arc<dyn OrderBookSource>,
        submitter: Arc<dyn SettlementSubmitter>,
        max_attempts: usize,
    ) -> Self {
        self.reconcilers = self
            .planners
            .iter()
            .map(|(market, planner)| {
                let reconciler = Reconciler::new(source.clone(), submitter.clone(), *planner, max_attempts);
                (market.clone(), reconciler)
            })
            .collect();
        self
    }

    pub fn book(&self, market: &str) -> Option<BookHandle> {
        self.handles.get(market).cloned()
    }

    pub fn latest_books(&self) -> LatestBooks {
        LatestBooks::new(self.handles.clone())
    }

    pub fn apply_book_update(&self, update: BookUpdate) -> anyhow::Result<bool> {
        let mut publisher = self
            .publishers
            .get_mut(&update.market)
            .ok_or_else(|| anyhow::anyhow!("market {} does not take pushed updates", update.market))?;
        let snapshot = OrderBookSnapshot::from_orders(update.orders)?;
        let changed = publisher.publish(snapshot);
        if changed {
            counter!(BOOK_UPDATES).increment(1);
        }
        Ok(changed)
    }

    fn first_seen(&self, key: String) -> bool {
        self.dedupe.lock().put(key, ()).is_none()
    }

    /// Answers a quote request. `None` for a request id seen recently.
    #[instrument(skip(self, request), fields(request_id = %request.request_id, market = %request.market))]
    pub fn handle_quote(&self, request: QuoteRequest) -> Option<QuoteResponse> {
        if !self.first_seen(format!("quote:{}", request.request_id)) {
            debug!("duplicate quote request dropped");
            return None;
        }
        counter!(QUOTE_REQUESTS).increment(1);

        let outcome = match self.quote(&request) {
            Ok(outcome) => outcome,
            Err(reason) => {
                counter!(QUOTE_REJECTIONS).increment(1);
                QuoteOutcome::Rejected(reason)
            }
        };
        Some(QuoteResponse {
            request_id: request.request_id,
            market: request.market,
            outcome,
        })
    }

    fn quote(&self, request: &QuoteRequest) -> Result<QuoteOutcome, String> {
        let planner = self
            .planners
            .get(&request.market)
            .ok_or_else(|| format!("unknown market {}", request.market))?;
        let book = self
            .handles
            .get(&request.market)
            .and_then(BookHandle::current)
            .ok_or_else(|| "order book not ready".to_string())?;
        planner
            .quote(&book, &request.request)
            .map(QuoteOutcome::Planned)
            .map_err(|err| err.to_string())
    }

    #[instrument(skip(self, request), fields(request_id = %request.request_id, market = %request.market))]
    pub async fn handle_execute(&self, request: ExecuteRequest) -> Option<ExecuteResponse> {
        if !self.first_seen(format!("execute:{}", request.request_id)) {
            debug!("duplicate execute request dropped");
            return None;
        }
        counter!(EXECUTIONS).increment(1);

        let outcome = match self.execute(&request).await {
            Ok(execution) => ExecuteOutcome::Executed(execution),
            Err(reason) => {
                counter!(EXECUTION_FAILURES).increment(1);
                warn!(%reason, "execution failed");
                ExecuteOutcome::Failed(reason)
            }
        };
        Some(ExecuteResponse {
            request_id: request.request_id,
            market: request.market,
            outcome,
        })
    }

    async fn execute(&self, request: &ExecuteRequest) -> Result<Execution, String> {
        if !self.planners.contains_key(&request.market) {
            return Err(format!("unknown market {}", request.market));
        }
        let reconciler = self
            .reconcilers
            .get(&request.market)
            .ok_or_else(|| "execution is not enabled".to_string())?;
        let order = &request.request;
        let executed = match order.limit_price {
            Some(limit_price) => {
                reconciler
                    .execute_limit(&request.market, order.side, order.amount, limit_price, request.balances)
                    .await
            }
            None => {
                reconciler
                    .execute_market(&request.market, order.side, order.amount, request.balances)
                    .await
            }
        };
        executed.map_err(|err| err.to_string())
    }
}

async fn next_message(subscription: &mut Option<BusSubscription>) -> Option<BusMessage> {
    match subscription {
        Some(subscription) => subscription.stream.next().await,
        None => std::future::pending().await,
    }
}

pub async fn run_service(settings: Settings, bus: Arc<dyn Bus>) -> anyhow::Result<()> {
    let fetch_source: Option<Arc<dyn OrderBookSource>> = settings
        .bus
        .book_fetch_subject
        .as_ref()
        .map(|subject| Arc::new(BusBookSource::new(bus.clone(), subject.clone())) as Arc<dyn OrderBookSource>);
    let (service, feeds) = match &fetch_source {
        Some(source) => MatchService::polling(&settings, source.clone()),
        None => (MatchService::new(&settings), Vec::new()),
    };
    let service = match &settings.bus.execution {
        Some(execution) => {
            let source: Arc<dyn OrderBookSource> = match &fetch_source {
                Some(source) => source.clone(),
                None => Arc::new(service.latest_books()),
            };
            let submitter = Arc::new(BusSettlementSubmitter::new(bus.clone(), execution.settle_subject.clone()));
            service.with_execution(source, submitter, settings.max_settlement_attempts)
        }
        None => service,
    };
    let service = Arc::new(service);

    let period = Duration::from_millis(settings.refresh_interval_ms.max(1));
    let mut stop_feeds = Vec::with_capacity(feeds.len());
    for feed in feeds {
        let (stop, stopped) = oneshot::channel();
        stop_feeds.push(stop);
        tokio::spawn(feed.run(period, stopped));
    }

    let mut books = bus.subscribe(&settings.bus.book_subject).await?;
    let mut requests = bus.subscribe(&settings.bus.request_subject).await?;
    let mut executions = match &settings.bus.execution {
        Some(execution) => Some(bus.subscribe(&execution.request_subject).await?),
        None => None,
    };
    info!(
        markets = settings.markets.len(),
        polling = fetch_source.is_some(),
        execution = executions.is_some(),
        "match service started"
    );

    loop {
        tokio::select! {
            message = books.stream.next() => {
                let Some(message) = message else { break };
                match message.decode::<BookUpdate>() {
                    Ok(update) => {
                        let market = update.market.clone();
                        if let Err(err) = service.apply_book_update(update) {
                            warn!(%market, error = %err, "rejected order book update");
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to decode order book update"),
                }
            }
            message = requests.stream.next() => {
                let Some(message) = message else { break };
                let request = match message.decode::<QuoteRequest>() {
                    Ok(request) => request,
                    Err(err) => {
                        warn!(error = %err, "failed to decode quote request");
                        continue;
                    }
                };
                let Some(response) = service.handle_quote(request) else { continue };
                if let Err(err) = publish_json(bus.as_ref(), &settings.bus.response_subject, &response).await {
                    warn!(error = %err, "failed to publish quote response");
                }
            }
            Some(message) = next_message(&mut executions) => {
                let Some(execution) = &settings.bus.execution else { continue };
                let request = match message.decode::<ExecuteRequest>() {
                    Ok(request) => request,
                    Err(err) => {
                        warn!(error = %err, "failed to decode execute request");
                        continue;
                    }
                };
                let service = service.clone();
                let bus = bus.clone();
                let subject = execution.response_subject.clone();
                tokio::spawn(async move {
                    let Some(response) = service.handle_execute(request).await else { return };
                    if let Err(err) = publish_json(bus.as_ref(), &subject, &response).await {
                        warn!(error = %err, "failed to publish execute response");
                    }
                });
            }
        }
    }

    drop(stop_feeds);
    info!("match service stopped");
    Ok(())
}

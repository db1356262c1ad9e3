pub mod book;
pub mod bus;
pub mod config;
pub mod feed;
pub mod matching;
pub mod models;
pub mod planner;
pub mod relayer;
pub mod service;
pub mod settlement;

pub mod metrics;

pub use book::{BookError, OrderBookSnapshot};
pub use matching::{MatchError, execute, match_limit, match_market};
pub use models::{Amount, Fill, MarketId, MatchRequest, MatchResult, OrderId, Price, RestingOrder, Side};

use serde::Deserialize;

use crate::models::MarketId;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bus: BusConfig,
    pub markets: Vec<MarketConfig>,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_max_settlement_attempts")]
    pub max_settlement_attempts: usize,
    #[serde(default = "default_dedupe_window")]
    pub dedupe_window: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    pub nats_url: String,
    pub book_subject: String,
    pub request_subject: String,
    pub response_subject: String,
    /// Relayer subject answering book fetches. When set, every market is
    /// polled each `refresh_interval_ms` instead of taking pushed updates.
    #[serde(default)]
    pub book_fetch_subject: Option<String>,
    #[serde(default)]
    pub execution: Option<ExecutionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    pub request_subject: String,
    pub response_subject: String,
    pub settle_subject: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    pub market: MarketId,
    #[serde(default)]
    pub maker_fee_bps: u32,
    #[serde(default)]
    pub taker_fee_bps: u32,
}

fn default_refresh_interval_ms() -> u64 {
    2_000
}

fn default_max_settlement_attempts() -> usize {
    3
}

fn default_dedupe_window() -> usize {
    10_000
}

impl Settings {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("DEX_MATCHER").separator("__"));
        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn market(&self, market: &str) -> Option<&MarketConfig> {
        self.markets.iter().find(|m| m.market == market)
    }
}

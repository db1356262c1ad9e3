use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dex_matcher::bus::nats::NatsBus;
use dex_matcher::config::Settings;
use dex_matcher::metrics::install_recorder;
use dex_matcher::service::run_service;

#[derive(Parser, Debug)]
#[command(name = "matcher")]
struct Args {
    #[arg(long, default_value = "config/example.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();
    let _prom = install_recorder()?;

    let args = Args::parse();
    let settings = Settings::load(&args.config)?;
    let bus = NatsBus::connect(&settings.bus.nats_url).await?;
    run_service(settings, Arc::new(bus)).await
}

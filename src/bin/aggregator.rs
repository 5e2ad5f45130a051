use std::path::PathBuf;

use blinky_metrics::{
    aggregator::Aggregator,
    config::{AggregatorConfig, load_config},
    util::parse_args_or_exit,
};
use clap::Parser;
use tracing::{level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Collects CPU samples from agents and streams snapshots to clients
#[derive(Debug, Clone, Parser)]
#[command(version)]
struct Args {
    /// Config file (defaults to ~/.config/blinky/aggregator.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("blinky_metrics", LevelFilter::TRACE),
        ("blinky_aggregator", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args: Args = parse_args_or_exit();
    trace!("started with args: {args:?}");

    let config = load_config::<AggregatorConfig>(args.config.as_deref())?.with_env_overrides();

    let aggregator = Aggregator::bind(&config).await?;

    aggregator
        .serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
}

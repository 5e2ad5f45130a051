use std::path::PathBuf;

use blinky_metrics::{
    client::{Client, SerialConnector},
    config::{ClientConfig, RoleConfig, load_config},
    util::parse_args_or_exit,
};
use clap::Parser;
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Shows per-host CPU load from a blinky aggregator on a BlinkyTape
#[derive(Debug, Clone, Parser)]
#[command(version)]
struct Args {
    /// Aggregator address, `host` or `host:port`
    server: String,

    /// Config file (defaults to ~/.config/blinky/client.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Regex selecting the serial port of the LED strip
    #[arg(short, long)]
    port_pattern: Option<String>,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("blinky_metrics", LevelFilter::TRACE),
        ("blinky_client", LevelFilter::TRACE),
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

    let mut config: ClientConfig = load_config(args.config.as_deref())?;
    if let Some(pattern) = args.port_pattern {
        config.port_pattern = pattern;
        config.validate()?;
    }

    let connector = SerialConnector::new(&config)?;
    let mut client = Client::spawn(&args.server, &config, connector)?;

    tokio::select! {
        _ = client.join() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, exiting");
        }
    }

    client.shutdown();
    Ok(())
}

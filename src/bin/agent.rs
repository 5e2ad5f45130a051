use std::path::PathBuf;

use blinky_metrics::{
    agent::{Agent, SysinfoSampler},
    config::{AgentConfig, load_config},
    util::parse_args_or_exit,
};
use clap::Parser;
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Samples local CPU usage and reports it to a blinky aggregator
#[derive(Debug, Clone, Parser)]
#[command(version)]
struct Args {
    /// Aggregator address, `host` or `host:port`
    server: String,

    /// Config file (defaults to ~/.config/blinky/agent.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("blinky_metrics", LevelFilter::TRACE),
        ("blinky_agent", LevelFilter::TRACE),
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

    let config: AgentConfig = load_config(args.config.as_deref())?;

    let sampler = match SysinfoSampler::new() {
        Ok(sampler) => sampler,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let agent = Agent::new(&args.server, &config, sampler)?;
    info!("reporting as {}", agent.host_name());

    tokio::select! {
        _ = agent.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, exiting");
        }
    }

    Ok(())
}

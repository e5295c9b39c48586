use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weft_server::{bootstrap, config};

/// Command line arguments for the Weft runtime server
#[derive(Parser, Debug)]
#[command(name = "weft-server")]
#[command(about = "Actor runtime for concurrent server applications")]
struct Args {
    /// Path to the runtime config file
    #[arg(default_value = "config", env = "WEFT_CONFIG")]
    config: PathBuf,

    /// Worker thread count (overrides config)
    #[arg(short, long, env = "WEFT_THREADS")]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weft_server=info,weft_core=info,weft=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = config::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    if let Some(threads) = args.threads {
        config.thread = threads;
    }
    info!(
        threads = config.thread,
        harbor = config.harbor,
        start = config.start.as_deref().unwrap_or("-"),
        "configuration loaded"
    );

    let runtime = bootstrap(&config)?;
    runtime.run(config.thread);

    info!("weft exit");
    Ok(())
}

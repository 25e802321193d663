//! `shvbroker`: loads a TOML config, starts the broker, and runs until
//! `SIGINT`/`SIGTERM` (spec §6.4).

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Exit codes are the BSD `sysexits.h` values spec.md's CLI surface
/// names explicitly: 0 clean shutdown, 64 config error, 71 listen bind
/// failure.
const EXIT_OK: i32 = 0;
const EXIT_CONFIG_ERROR: i32 = 64;
const EXIT_LISTEN_FAILURE: i32 = 71;

#[derive(Parser, Debug)]
#[command(name = "shvbroker")]
#[command(about = "Silicon Heaven RPC broker")]
struct Args {
    /// Path to the broker's TOML configuration file.
    #[arg(short = 'c', long = "config")]
    config: std::path::PathBuf,

    /// Log level passed through to `tracing_subscriber::EnvFilter`.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level.clone())),
        )
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    rt.block_on(run(args));
}

async fn run(args: Args) {
    let config = match shv_broker::BrokerConfig::from_path(&args.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, path = %args.config.display(), "failed to load configuration");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    let broker = match shv_broker::start(config).await {
        Ok(broker) => broker,
        Err(e) => {
            tracing::error!(error = %e, "failed to start broker");
            std::process::exit(EXIT_LISTEN_FAILURE);
        }
    };

    tracing::info!("broker running, waiting for shutdown signal");
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to install signal handler, shutting down immediately");
    }

    tracing::info!("shutdown signal received, stopping broker");
    broker.shutdown().await;
    std::process::exit(EXIT_OK);
}

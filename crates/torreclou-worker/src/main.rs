//! Worker process entry point: wires the event log, dispatchers, stages,
//! task runtime, and recovery supervisor into one binary, then serves its
//! configured queues until a shutdown signal arrives.

mod api;
mod app;
mod cli;
mod dispatch;
mod failure_hook;
mod handlers;
mod logging;
mod profile_lookup;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use torreclou_core::config::TorreClouConfig;

use crate::app::App;
use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = match TorreClouConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };
    apply_cli_overrides(&mut config, &cli);

    let app = match App::build(config).await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "failed to start worker");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received interrupt, shutting down");
            signal_shutdown.cancel();
        }
    });

    if let Err(e) = app.run(cli.concurrency, shutdown).await {
        tracing::error!(error = %e, "worker exited with error");
        std::process::exit(1);
    }
}

fn apply_cli_overrides(config: &mut TorreClouConfig, cli: &Cli) {
    if let Some(queues) = &cli.queues {
        config.queues = queues.clone();
    }
    if let Some(database_url) = &cli.database_url {
        config.database_url = database_url.clone();
    }
    if let Some(redis_url) = &cli.redis_url {
        config.redis_url = redis_url.clone();
    }
    if let Some(torrent_root) = &cli.torrent_root {
        config.torrent_root = torrent_root.clone();
    }
}

use std::sync::Arc;

use channelsite::Server;
use channelsite::api::{self, AppState};
use channelsite::background::spawn_warmup;
use channelsite::config::{Cli, Config};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG wins over the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_cli(Cli::parse())?;

    if config.api_key.is_none() {
        warn!("YOUTUBE_API_KEY is not set; the YouTube endpoints will answer 500");
    }
    info!(
        site_root = %config.site_root.display(),
        channel = %config.channel_id,
        ttl = ?config.cache.ttl,
        launch_mode = ?config.launch_mode,
        "starting channelsite"
    );

    let state = Arc::new(AppState::from_config(&config));

    let warmup = config
        .warm_up()
        .then(|| spawn_warmup(state.warmers()));

    let pipeline = Arc::new(api::pipeline(Arc::clone(&state)));
    let server = Server::bind(config.bind.to_string()).await?;

    server
        .run_until(
            move |req| {
                let pipeline = Arc::clone(&pipeline);
                async move { pipeline.handle(req).await }
            },
            async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            },
        )
        .await?;

    if let Some(warmup) = warmup {
        warmup.abort();
    }
    info!("shut down");
    Ok(())
}

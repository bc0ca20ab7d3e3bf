mod backfill;
mod bot;
mod checkpoint;
mod config;
mod dispatch;
mod liveness;
mod music;
mod platform;
mod scanner;
mod scheduler;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::dispatch::ConnectionState;
use crate::music::spotify::SpotifyClient;
use crate::music::MusicService;
use crate::scheduler::Scheduler;

/// Filter directive used when `RUST_LOG` is unset, driven by `LOGLEVEL`
fn default_filter(loglevel: Option<&str>) -> String {
    let level = match loglevel.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
        Some("critical") | Some("error") => "error",
        Some("warning") | Some("warn") => "warn",
        Some("info") => "info",
        Some("trace") => "trace",
        _ => "debug",
    };
    format!("info,spootifybot={level}")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let loglevel = std::env::var("LOGLEVEL").ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(loglevel.as_deref()).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => Config::from_env().context("Failed to load config from environment")?,
    };

    info!("Configuration loaded successfully");
    info!("  Playlist: {}", config.spotify.playlist_id);
    info!("  Token cache: {}", config.spotify.token_cache_path().display());
    info!("  Liveness port: {}", config.liveness.port);
    info!("  Backfill window: {} messages", config.backfill.history_limit);

    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    let port = config.liveness.port;
    tokio::spawn(async move {
        if let Err(e) = liveness::serve(port, state_rx).await {
            error!("Liveness endpoint stopped: {:#}", e);
        }
    });

    // Keep the scheduler alive for the lifetime of the bot
    let _scheduler = match &config.liveness.ping_url {
        Some(url) => {
            let scheduler = Scheduler::new().await?;
            scheduler::tasks::register_keepalive(
                &scheduler,
                url.clone(),
                Duration::from_secs(config.liveness.ping_interval_sec),
            )
            .await?;
            scheduler.start().await?;
            Some(scheduler)
        }
        None => None,
    };

    let spotify = SpotifyClient::new(config.spotify.clone())?;
    info!("Firing off Spotify API call...");
    let me = spotify
        .current_user()
        .await
        .context("Spotify credentials were rejected")?;
    info!(
        "Spotify API call succeeded: logged in as {}",
        me.display_name.as_deref().unwrap_or(&me.id)
    );

    info!("Bot is starting...");
    bot::run(&config, Arc::new(spotify), state_tx).await?;

    Ok(())
}

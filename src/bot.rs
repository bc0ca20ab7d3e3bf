use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::backfill::BackfillCoordinator;
use crate::checkpoint::Checkpoint;
use crate::config::Config;
use crate::dispatch::{ConnectionState, Dispatcher};
use crate::music::MusicService;
use crate::platform::discord;
use crate::scanner::{default_scanners, ScanContext};

/// Connect to Discord and serve until the gateway client stops
pub async fn run(
    config: &Config,
    music: Arc<dyn MusicService>,
    state: watch::Sender<ConnectionState>,
) -> Result<()> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (mut client, platform) = discord::connect(&config.discord.token, events_tx).await?;

    let ctx = ScanContext {
        platform,
        checkpoint: Arc::new(Checkpoint::new()),
        backfill: Arc::new(BackfillCoordinator::new((&config.backfill).into())),
    };
    let backfill = Arc::clone(&ctx.backfill);

    let scanners = default_scanners(music, &config.spotify.playlist_id);
    info!(
        "Scanners: {}",
        scanners.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
    );

    let dispatcher = Dispatcher::new(ctx, scanners, state);
    let dispatch_task = tokio::spawn(dispatcher.run(events_rx));

    info!("Starting Discord client...");
    let result = client.start().await.context("Discord client stopped");

    dispatch_task.abort();
    if let Err(e) = dispatch_task.await {
        if e.is_panic() {
            warn!("Dispatcher task panicked: {}", e);
        }
    }
    backfill.wait_idle().await;

    result
}

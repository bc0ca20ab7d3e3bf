use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::BackfillConfig;
use crate::platform::{deliver, ChatPlatform, Message};
use crate::scanner::{ScanContext, Scanner};

pub const FOUND_BANNER: &str = "These were here all along I swear :sunglasses:";
pub const QUIET_BANNER: &str = "Phew! Nothing major happened while I was gone :relieved:";

/// Timing and sizing of a catch-up run
#[derive(Debug, Clone, Copy)]
pub struct BackfillSettings {
    pub history_limit: usize,
    /// Pause after the scan, before anything is posted
    pub reading_pause: Duration,
    /// Pause between the banner and the replayed replies
    pub replay_pause: Duration,
    /// Extra pause before announcing that nothing was missed
    pub quiet_pause: Duration,
    pub typing_interval: Duration,
}

impl From<&BackfillConfig> for BackfillSettings {
    fn from(config: &BackfillConfig) -> Self {
        Self {
            history_limit: config.history_limit,
            reading_pause: config.reading_pause(),
            replay_pause: config.replay_pause(),
            quiet_pause: config.quiet_pause(),
            typing_interval: config.typing_interval(),
        }
    }
}

/// What a single catch-up run saw and did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub fetched: usize,
    pub visited: usize,
    /// Ids of matching messages, in walk order (newest first)
    pub matched: Vec<u64>,
    pub replied: usize,
    /// The walk stopped at a message the bot wrote itself
    pub caught_up: bool,
    /// Where the checkpoint was moved to, if it was
    pub checkpoint: Option<DateTime<Utc>>,
}

/// Result of walking one page of history, newest to oldest
#[derive(Debug)]
pub struct Walk<'a> {
    pub visited: usize,
    pub matched: Vec<&'a Message>,
    pub last_visited: Option<&'a Message>,
    pub caught_up: bool,
}

/// Walk `history` (newest first) until the bot's own message, collecting
/// messages `scanner` matches. The bot's message is visited but not tested.
pub fn walk_history<'a>(history: &'a [Message], scanner: &dyn Scanner) -> Walk<'a> {
    let mut walk = Walk {
        visited: 0,
        matched: Vec::new(),
        last_visited: None,
        caught_up: false,
    };

    for message in history {
        debug!(
            "Checking msg {} sent at {} by {}: {}",
            message.id, message.created_at, message.author_id, message.content
        );
        walk.visited += 1;
        walk.last_visited = Some(message);

        if message.is_from_self {
            info!(
                "All caught up with messages. Recent bot reply at {}",
                message.created_at.to_rfc3339()
            );
            walk.caught_up = true;
            break;
        }

        if scanner.is_match(message) {
            walk.matched.push(message);
        }
    }

    walk
}

/// Keeps the typing indicator alive until dropped
struct TypingGuard(JoinHandle<()>);

impl TypingGuard {
    async fn start(platform: Arc<dyn ChatPlatform>, channel_id: u64, every: Duration) -> Self {
        if let Err(e) = platform.typing(channel_id).await {
            debug!("Typing indicator failed: {:#}", e);
        }
        let every = every.max(Duration::from_millis(100));
        Self(tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;
                if let Err(e) = platform.typing(channel_id).await {
                    debug!("Typing indicator failed: {:#}", e);
                }
            }
        }))
    }
}

impl Drop for TypingGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs catch-up scans as supervised background tasks, one at a time.
pub struct BackfillCoordinator {
    settings: BackfillSettings,
    /// Single permit: at most one run touches the checkpoint at a time
    gate: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
}

impl BackfillCoordinator {
    pub fn new(settings: BackfillSettings) -> Self {
        Self {
            settings,
            gate: Arc::new(Semaphore::new(1)),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Queue a run for `channel_id` and return without waiting for it.
    pub async fn schedule(&self, ctx: ScanContext, channel_id: u64, scanner: Arc<dyn Scanner>) {
        let gate = Arc::clone(&self.gate);
        let settings = self.settings;

        let mut tasks = self.tasks.lock().await;
        while let Some(finished) = tasks.try_join_next() {
            log_finished(finished);
        }

        tasks.spawn(async move {
            match run_gated(&gate, settings, &ctx, channel_id, scanner.as_ref()).await {
                Ok(report) => info!(
                    "Backfill in channel {} done: {} fetched, {} visited, {} matched, {} replied",
                    channel_id,
                    report.fetched,
                    report.visited,
                    report.matched.len(),
                    report.replied
                ),
                Err(e) => error!("Backfill in channel {} failed: {:#}", channel_id, e),
            }
        });
        debug!("{} backfill task(s) outstanding", tasks.len());
    }

    /// Run one catch-up to completion on the caller's task.
    #[allow(dead_code)]
    pub async fn run_once(
        &self,
        ctx: &ScanContext,
        channel_id: u64,
        scanner: &dyn Scanner,
    ) -> Result<BackfillReport> {
        run_gated(&self.gate, self.settings, ctx, channel_id, scanner).await
    }

    /// Wait for every scheduled run to finish.
    pub async fn wait_idle(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(finished) = tasks.join_next().await {
            log_finished(finished);
        }
    }
}

fn log_finished(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Backfill task panicked: {}", e);
        } else {
            warn!("Backfill task cancelled: {}", e);
        }
    }
}

async fn run_gated(
    gate: &Semaphore,
    settings: BackfillSettings,
    ctx: &ScanContext,
    channel_id: u64,
    scanner: &dyn Scanner,
) -> Result<BackfillReport> {
    let _permit = gate
        .acquire()
        .await
        .context("Backfill gate closed")?;
    catch_up(settings, ctx, channel_id, scanner).await
}

async fn catch_up(
    settings: BackfillSettings,
    ctx: &ScanContext,
    channel_id: u64,
    scanner: &dyn Scanner,
) -> Result<BackfillReport> {
    let snapshot = ctx.checkpoint.snapshot().await;
    info!(
        "Looking back over messages in channel {} from before {}",
        channel_id, snapshot.at
    );

    let _typing = TypingGuard::start(
        Arc::clone(&ctx.platform),
        channel_id,
        settings.typing_interval,
    )
    .await;

    let history = ctx
        .platform
        .fetch_history(channel_id, snapshot.at, settings.history_limit)
        .await
        .context("Failed to fetch channel history")?;

    let walk = walk_history(&history, scanner);
    if !walk.caught_up && history.len() >= settings.history_limit {
        warn!(
            "No earlier bot message within the last {} messages; older history will not be scanned",
            settings.history_limit
        );
    }

    tokio::time::sleep(settings.reading_pause).await;

    let mut replied = 0;
    if walk.matched.is_empty() {
        tokio::time::sleep(settings.quiet_pause).await;
        ctx.platform
            .send(channel_id, QUIET_BANNER, None)
            .await
            .context("Failed to send quiet banner")?;
    } else {
        ctx.platform
            .send(channel_id, FOUND_BANNER, None)
            .await
            .context("Failed to send backfill banner")?;
        tokio::time::sleep(settings.replay_pause).await;

        for message in &walk.matched {
            match scanner.handle(ctx, message).await {
                Ok(Some(reply)) => match deliver(ctx.platform.as_ref(), message, &reply).await {
                    Ok(()) => replied += 1,
                    Err(e) => warn!("Failed to replay reply to {}: {:#}", message.id, e),
                },
                Ok(None) => debug!("No reply for old message {}", message.id),
                Err(e) => warn!(
                    "Scanner '{}' failed on old message {}: {:#}",
                    scanner.name(),
                    message.id,
                    e
                ),
            }
        }
    }

    let mut checkpoint = None;
    if let Some(last) = walk.last_visited {
        if ctx.checkpoint.advance(&snapshot, last.created_at).await {
            checkpoint = Some(last.created_at);
        }
    }

    Ok(BackfillReport {
        fetched: history.len(),
        visited: walk.visited,
        matched: walk.matched.iter().map(|m| m.id).collect(),
        replied,
        caught_up: walk.caught_up,
        checkpoint,
    })
}

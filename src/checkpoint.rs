use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// The boundary between history the bot has already handled and history it
/// has not seen yet.
///
/// Two writers exist: the dispatcher when a connection becomes ready, and a
/// backfill when it finishes. Every ready transition starts a new epoch; a
/// backfill only advances the checkpoint if no ready transition happened
/// while it was running.
pub struct Checkpoint {
    inner: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    at: Option<DateTime<Utc>>,
    epoch: u64,
}

/// A consistent read of the checkpoint taken when a backfill starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointSnapshot {
    pub at: DateTime<Utc>,
    epoch: u64,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(State::default()),
        }
    }

    /// Record a fresh connection. Returns the new epoch.
    pub async fn mark_ready(&self, at: DateTime<Utc>) -> u64 {
        let mut state = self.inner.write().await;
        state.at = Some(at);
        state.epoch += 1;
        info!("Checkpoint reset to {} (epoch {})", at, state.epoch);
        state.epoch
    }

    #[allow(dead_code)]
    pub async fn current(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.at
    }

    /// Current boundary, or `now` if no connection has become ready yet.
    pub async fn snapshot(&self) -> CheckpointSnapshot {
        let state = self.inner.read().await;
        CheckpointSnapshot {
            at: state.at.unwrap_or_else(Utc::now),
            epoch: state.epoch,
        }
    }

    /// Move the boundary to `to` unless a ready transition superseded the
    /// snapshot the caller started from.
    pub async fn advance(&self, from: &CheckpointSnapshot, to: DateTime<Utc>) -> bool {
        let mut state = self.inner.write().await;
        if state.epoch != from.epoch {
            warn!(
                "Discarding checkpoint advance to {}: reconnected since (epoch {} -> {})",
                to, from.epoch, state.epoch
            );
            return false;
        }
        debug!("Checkpoint advanced from {:?} to {}", state.at, to);
        state.at = Some(to);
        true
    }
}

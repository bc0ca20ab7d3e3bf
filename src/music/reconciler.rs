use std::sync::Arc;

use tracing::{debug, warn};

use crate::music::MusicService;

/// Keeps the target playlist free of duplicates: a track mentioned again is
/// removed and re-appended, which bumps it to the most recent slot.
#[derive(Clone)]
pub struct PlaylistReconciler {
    music: Arc<dyn MusicService>,
    playlist_id: String,
}

/// Which of the two playlist calls produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub removed: bool,
    pub added: bool,
}

impl PlaylistReconciler {
    pub fn new(music: Arc<dyn MusicService>, playlist_id: impl Into<String>) -> Self {
        Self {
            music,
            playlist_id: playlist_id.into(),
        }
    }

    /// Remove-then-insert. Best effort: failures are logged, never returned.
    pub async fn reconcile(&self, track_id: &str) -> ReconcileOutcome {
        debug!("Adding track {} to playlist {}", track_id, self.playlist_id);

        let removed = match self.music.remove_track(&self.playlist_id, track_id).await {
            Ok(Some(snapshot)) => {
                debug!("Removed existing {} (snapshot {})", track_id, snapshot);
                true
            }
            Ok(None) => {
                warn!("No response from remove playlist items call");
                false
            }
            Err(e) => {
                warn!("Failed to remove {} from playlist: {:#}", track_id, e);
                false
            }
        };

        let added = match self.music.add_track(&self.playlist_id, track_id).await {
            Ok(Some(snapshot)) => {
                debug!("Added {} (snapshot {})", track_id, snapshot);
                true
            }
            Ok(None) => {
                warn!("No response from add playlist items call");
                false
            }
            Err(e) => {
                warn!("Failed to add {} to playlist: {:#}", track_id, e);
                false
            }
        };

        ReconcileOutcome { removed, added }
    }
}

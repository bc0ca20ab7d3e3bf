pub mod emote;
pub mod greet;
pub mod playlist;
pub mod wake;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::backfill::BackfillCoordinator;
use crate::checkpoint::Checkpoint;
use crate::music::reconciler::PlaylistReconciler;
use crate::music::MusicService;
use crate::platform::{ChatPlatform, Message, Reply};

use self::emote::EmoteReactionScanner;
use self::greet::GreetScanner;
use self::playlist::PlaylistIngestScanner;
use self::wake::WakeUpScanner;

/// Shared handles a scanner may use while producing a reply. The checkpoint
/// is the only mutable state shared between scanners.
#[derive(Clone)]
pub struct ScanContext {
    pub platform: Arc<dyn ChatPlatform>,
    pub checkpoint: Arc<Checkpoint>,
    pub backfill: Arc<BackfillCoordinator>,
}

/// Recognises a message pattern and, when it matches, produces an optional
/// reply.
#[async_trait]
pub trait Scanner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pure predicate, no I/O. Also used to re-classify old messages.
    fn is_match(&self, message: &Message) -> bool;

    /// Only called for messages where `is_match` holds. `Ok(None)` means the
    /// match turned out not to warrant a reply.
    async fn handle(&self, ctx: &ScanContext, message: &Message) -> Result<Option<Reply>>;
}

/// The scanner list in dispatch order. The wake-up scanner replays missed
/// messages through the same playlist scanner used for live traffic.
pub fn default_scanners(music: Arc<dyn MusicService>, playlist_id: &str) -> Vec<Arc<dyn Scanner>> {
    let reconciler = PlaylistReconciler::new(Arc::clone(&music), playlist_id);
    let playlist: Arc<dyn Scanner> = Arc::new(PlaylistIngestScanner::new(music, reconciler));

    vec![
        Arc::clone(&playlist),
        Arc::new(EmoteReactionScanner::new()),
        Arc::new(WakeUpScanner::new(playlist)),
        Arc::new(GreetScanner),
    ]
}

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::music::reconciler::PlaylistReconciler;
use crate::music::MusicService;
use crate::platform::{Message, Reply};
use crate::scanner::{ScanContext, Scanner};

const LINK_ACK: &str = "Adding that one to the collection";

fn query_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([^<>]*)>").unwrap())
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:https?://)?(?:[^./\s]+\.)?open\.spotify\.com/(?:intl-[a-z]+/)?track/([A-Za-z0-9]+)")
            .unwrap()
    })
}

/// Discord wraps mentions, channels, custom emoji, timestamps and
/// embed-suppressed links in angle brackets too.
fn is_platform_markup(inner: &str) -> bool {
    let lower = inner.to_ascii_lowercase();
    inner.starts_with('@')
        || inner.starts_with('#')
        || inner.starts_with(':')
        || lower.starts_with("a:")
        || lower.starts_with("t:")
        || lower.starts_with("http://")
        || lower.starts_with("https://")
}

/// First `<song title>` in the text, with hyphens removed
pub fn song_query(content: &str) -> Option<String> {
    query_re()
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|inner| !inner.trim().is_empty() && !is_platform_markup(inner))
        .map(|inner| inner.replace('-', "").split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Track id of the first direct link in the text
pub fn track_link(content: &str) -> Option<&str> {
    link_re()
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Links the bot posted itself are never ingested again
fn link_target(message: &Message) -> Option<&str> {
    if message.is_from_self {
        return None;
    }
    track_link(&message.content)
}

/// Adds songs mentioned in chat to the shared playlist. `<title>` triggers a
/// catalogue search; a direct track link is added as-is.
pub struct PlaylistIngestScanner {
    music: Arc<dyn MusicService>,
    reconciler: PlaylistReconciler,
}

impl PlaylistIngestScanner {
    pub fn new(music: Arc<dyn MusicService>, reconciler: PlaylistReconciler) -> Self {
        Self { music, reconciler }
    }

    async fn ingest_query(&self, query: &str) -> Option<Reply> {
        debug!("Searching for track: {}", query);
        let track = match self.music.search_track(query).await {
            Ok(Some(track)) => track,
            Ok(None) => {
                warn!("No query results found for '{}'", query);
                return None;
            }
            Err(e) => {
                warn!("Track search for '{}' failed: {:#}", query, e);
                return None;
            }
        };

        debug!(
            "Found '{}' by {} at {}",
            track.name,
            track.artists.join(", "),
            track.url
        );
        self.reconciler.reconcile(&track.id).await;
        Some(Reply::Text(track.url))
    }
}

#[async_trait]
impl Scanner for PlaylistIngestScanner {
    fn name(&self) -> &'static str {
        "playlist"
    }

    fn is_match(&self, message: &Message) -> bool {
        song_query(&message.content).is_some() || link_target(message).is_some()
    }

    async fn handle(&self, _ctx: &ScanContext, message: &Message) -> Result<Option<Reply>> {
        if let Some(query) = song_query(&message.content) {
            debug!("Found a song in message {}: {}", message.id, query);
            return Ok(self.ingest_query(&query).await);
        }

        if let Some(track_id) = link_target(message) {
            debug!("Found a link to track {} in message {}", track_id, message.id);
            self.reconciler.reconcile(track_id).await;
            return Ok(Some(Reply::Text(LINK_ACK.to_string())));
        }

        Ok(None)
    }
}

pub mod reconciler;
pub mod spotify;

use anyhow::Result;
use async_trait::async_trait;

/// A track returned by a catalogue search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    /// Canonical share link, e.g. `https://open.spotify.com/track/<id>`
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
}

/// Operations consumed from the music service. Playlist mutations return
/// the new playlist snapshot id, or `None` when the service answered with
/// an empty body.
#[async_trait]
pub trait MusicService: Send + Sync {
    /// Best match for a free-text query
    async fn search_track(&self, query: &str) -> Result<Option<Track>>;

    /// Remove every occurrence of a track from a playlist
    async fn remove_track(&self, playlist_id: &str, track_id: &str) -> Result<Option<String>>;

    async fn add_track(&self, playlist_id: &str, track_id: &str) -> Result<Option<String>>;

    async fn current_user(&self) -> Result<UserProfile>;
}

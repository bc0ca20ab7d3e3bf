use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::SpotifyConfig;
use crate::music::{MusicService, Track, UserProfile};

const API_BASE: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Scopes the cached refresh token must have been granted
pub const SCOPE: &str = "playlist-modify-public playlist-read-collaborative playlist-modify-private";

/// Refresh this long before the access token actually expires
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// A non-success HTTP answer from the Web API
#[derive(Debug, thiserror::Error)]
#[error("Spotify API error on {endpoint} ({status}): {body}")]
pub struct ApiError {
    pub endpoint: String,
    pub status: reqwest::StatusCode,
    pub body: String,
}

/// The OAuth token cache written when the bot account was first authorized
#[derive(Debug, Deserialize)]
struct TokenCache {
    refresh_token: String,
    #[serde(default)]
    access_token: Option<String>,
    /// Unix seconds
    #[serde(default)]
    expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug)]
struct TokenState {
    refresh_token: String,
    access_token: Option<String>,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Paging<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    /// Absent for local files
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Debug, Deserialize, Default)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    snapshot_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserObject {
    id: String,
    display_name: Option<String>,
}

fn track_uri(track_id: &str) -> String {
    format!("spotify:track:{}", track_id)
}

impl TrackObject {
    fn into_track(self) -> Option<Track> {
        let id = self.id?;
        let url = self
            .external_urls
            .spotify
            .unwrap_or_else(|| format!("https://open.spotify.com/track/{}", id));
        Some(Track {
            id,
            name: self.name,
            artists: self.artists.into_iter().map(|a| a.name).collect(),
            url,
        })
    }
}

fn parse_token_cache(raw: &str) -> Result<TokenState> {
    let cache: TokenCache =
        serde_json::from_str(raw).context("Token cache is not valid JSON")?;

    let now_unix = chrono::Utc::now().timestamp();
    let expires_at = match (cache.access_token.as_ref(), cache.expires_at) {
        (Some(_), Some(at)) if at > now_unix => {
            Instant::now() + Duration::from_secs((at - now_unix) as u64)
        }
        _ => Instant::now(),
    };

    Ok(TokenState {
        refresh_token: cache.refresh_token,
        access_token: cache.access_token,
        expires_at,
    })
}

/// Spotify Web API client authenticated as the bot's own user account
pub struct SpotifyClient {
    client: reqwest::Client,
    config: SpotifyConfig,
    token: Mutex<TokenState>,
}

impl SpotifyClient {
    /// Reads the token cache from `TOKEN_CACHE`, falling back to the cache
    /// file next to the working directory.
    pub fn new(config: SpotifyConfig) -> Result<Self> {
        let raw = match &config.token_cache {
            Some(raw) => raw.clone(),
            None => {
                let path = config.token_cache_path();
                std::fs::read_to_string(&path).with_context(|| {
                    format!(
                        "TOKEN_CACHE not set and no token cache at {}",
                        path.display()
                    )
                })?
            }
        };
        let token = parse_token_cache(&raw)?;

        info!(
            "Spotify client configured for playlist {} (redirect {}, scopes: {})",
            config.playlist_id, config.redirect_uri, SCOPE
        );

        Ok(Self {
            client: reqwest::Client::new(),
            config,
            token: Mutex::new(token),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if let Some(access) = &token.access_token {
            if Instant::now() + EXPIRY_MARGIN < token.expires_at {
                return Ok(access.clone());
            }
        }

        debug!("Refreshing Spotify access token");
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", token.refresh_token.as_str()),
            ])
            .send()
            .await
            .context("Failed to send token refresh request")?;

        let fresh: TokenResponse = Self::read_json(TOKEN_URL, response).await?;
        token.access_token = Some(fresh.access_token.clone());
        token.expires_at = Instant::now() + Duration::from_secs(fresh.expires_in);
        if let Some(rotated) = fresh.refresh_token {
            token.refresh_token = rotated;
        }

        Ok(fresh.access_token)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError {
                endpoint: endpoint.to_string(),
                status,
                body,
            }
            .into());
        }
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse Spotify response from {}", endpoint))
    }

    async fn snapshot_of(endpoint: &str, response: reqwest::Response) -> Result<Option<String>> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ApiError {
                endpoint: endpoint.to_string(),
                status,
                body,
            }
            .into());
        }
        if body.trim().is_empty() {
            return Ok(None);
        }
        let parsed: SnapshotResponse = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse Spotify response from {}", endpoint))?;
        Ok(parsed.snapshot_id)
    }
}

#[async_trait]
impl MusicService for SpotifyClient {
    async fn search_track(&self, query: &str) -> Result<Option<Track>> {
        let token = self.access_token().await?;
        let url = format!("{}/search", API_BASE);

        debug!("Searching Spotify for: {}", query);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[("q", query), ("type", "track"), ("limit", "1")])
            .send()
            .await
            .context("Failed to send search request to Spotify")?;

        let results: SearchResponse = Self::read_json(&url, response).await?;
        Ok(results
            .tracks
            .items
            .into_iter()
            .find_map(TrackObject::into_track))
    }

    async fn remove_track(&self, playlist_id: &str, track_id: &str) -> Result<Option<String>> {
        let token = self.access_token().await?;
        let url = format!("{}/playlists/{}/tracks", API_BASE, playlist_id);

        let response = self
            .client
            .delete(&url)
            .bearer_auth(token)
            .json(&json!({ "tracks": [{ "uri": track_uri(track_id) }] }))
            .send()
            .await
            .context("Failed to send playlist removal to Spotify")?;

        Self::snapshot_of(&url, response).await
    }

    async fn add_track(&self, playlist_id: &str, track_id: &str) -> Result<Option<String>> {
        let token = self.access_token().await?;
        let url = format!("{}/playlists/{}/tracks", API_BASE, playlist_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "uris": [track_uri(track_id)] }))
            .send()
            .await
            .context("Failed to send playlist insert to Spotify")?;

        Self::snapshot_of(&url, response).await
    }

    async fn current_user(&self) -> Result<UserProfile> {
        let token = self.access_token().await?;
        let url = format!("{}/me", API_BASE);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to send current user request to Spotify")?;

        let user: UserObject = Self::read_json(&url, response).await?;
        Ok(UserProfile {
            id: user.id,
            display_name: user.display_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_first_playable_track() {
        let body = r#"{
            "tracks": {
                "href": "https://api.spotify.com/v1/search?query=x",
                "items": [
                    { "id": null, "name": "Local file", "artists": [] },
                    {
                        "id": "4uLU6hMCjMI75M1A2tKUQC",
                        "name": "Never Gonna Give You Up",
                        "artists": [{ "name": "Rick Astley" }],
                        "external_urls": { "spotify": "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC" }
                    }
                ]
            }
        }"#;
        let results: SearchResponse = serde_json::from_str(body).unwrap();
        let track = results
            .tracks
            .items
            .into_iter()
            .find_map(TrackObject::into_track)
            .unwrap();

        assert_eq!(track.id, "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(track.artists, vec!["Rick Astley".to_string()]);
        assert_eq!(
            track.url,
            "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"
        );
    }

    #[test]
    fn test_missing_share_link_is_derived() {
        let track = TrackObject {
            id: Some("abc".to_string()),
            name: "Song".to_string(),
            artists: vec![],
            external_urls: ExternalUrls::default(),
        }
        .into_track()
        .unwrap();
        assert_eq!(track.url, "https://open.spotify.com/track/abc");
    }

    #[test]
    fn test_token_cache_with_expired_access_token() {
        let raw = r#"{
            "access_token": "old",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "playlist-modify-public",
            "expires_at": 1000,
            "refresh_token": "refresh-me"
        }"#;
        let state = parse_token_cache(raw).unwrap();
        assert_eq!(state.refresh_token, "refresh-me");
        assert!(state.expires_at <= Instant::now());
    }

    #[test]
    fn test_token_cache_requires_refresh_token() {
        let err = parse_token_cache(r#"{ "access_token": "a" }"#).unwrap_err();
        assert!(format!("{:#}", err).contains("not valid JSON"));
    }

    #[test]
    fn test_track_uri() {
        assert_eq!(track_uri("abc123"), "spotify:track:abc123");
    }
}

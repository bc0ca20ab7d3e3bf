use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Startup configuration failures. Any of these aborts the process before a
/// connection to Discord or Spotify is attempted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DiscordConfig {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SpotifyConfig {
    /// Only used to locate the on-disk token cache (`.cache-<username>`).
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default)]
    pub playlist_id: String,
    /// Raw JSON token cache, takes precedence over the cache file.
    #[serde(default)]
    pub token_cache: Option<String>,
}

impl SpotifyConfig {
    /// Path of the token cache file written by a previous authorization.
    pub fn token_cache_path(&self) -> PathBuf {
        match &self.username {
            Some(name) => PathBuf::from(format!(".cache-{}", name)),
            None => PathBuf::from(".cache"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LivenessConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub ping_url: Option<String>,
    #[serde(default = "default_ping_interval_sec")]
    pub ping_interval_sec: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            ping_url: None,
            ping_interval_sec: default_ping_interval_sec(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackfillConfig {
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_reading_pause_ms")]
    pub reading_pause_ms: u64,
    #[serde(default = "default_replay_pause_ms")]
    pub replay_pause_ms: u64,
    #[serde(default = "default_quiet_pause_ms")]
    pub quiet_pause_ms: u64,
    #[serde(default = "default_typing_interval_ms")]
    pub typing_interval_ms: u64,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            reading_pause_ms: default_reading_pause_ms(),
            replay_pause_ms: default_replay_pause_ms(),
            quiet_pause_ms: default_quiet_pause_ms(),
            typing_interval_ms: default_typing_interval_ms(),
        }
    }
}

impl BackfillConfig {
    pub fn reading_pause(&self) -> Duration {
        Duration::from_millis(self.reading_pause_ms)
    }

    pub fn replay_pause(&self) -> Duration {
        Duration::from_millis(self.replay_pause_ms)
    }

    pub fn quiet_pause(&self) -> Duration {
        Duration::from_millis(self.quiet_pause_ms)
    }

    pub fn typing_interval(&self) -> Duration {
        Duration::from_millis(self.typing_interval_ms)
    }
}

fn default_port() -> u16 {
    8080
}

fn default_ping_interval_sec() -> u64 {
    60
}

/// Discord caps a single history page at 100 messages.
fn default_history_limit() -> usize {
    100
}

fn default_reading_pause_ms() -> u64 {
    3000
}

fn default_replay_pause_ms() -> u64 {
    2000
}

fn default_quiet_pause_ms() -> u64 {
    5000
}

fn default_typing_interval_ms() -> u64 {
    8000
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

impl Config {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then let environment variables override it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay every recognised key that `lookup` can resolve.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DISCORD_TOKEN") {
            self.discord.token = v;
        }
        if let Some(v) = get("SPOTIFY_USERNAME") {
            self.spotify.username = Some(v);
        }
        if let Some(v) = get("SPOTIFY_CLIENT_ID") {
            self.spotify.client_id = v;
        }
        if let Some(v) = get("SPOTIFY_CLIENT_SECRET") {
            self.spotify.client_secret = v;
        }
        if let Some(v) = get("SPOTIFY_REDIRECT_URI") {
            self.spotify.redirect_uri = v;
        }
        if let Some(v) = get("SPOTIFY_PLAYLIST_ID") {
            self.spotify.playlist_id = v;
        }
        if let Some(v) = get("TOKEN_CACHE") {
            self.spotify.token_cache = Some(v);
        }

        if let Some(v) = get("PORT") {
            self.liveness.port = parse_number("PORT", &v)?;
        }
        if let Some(v) = get("PING_URL") {
            self.liveness.ping_url = Some(v);
        }
        if let Some(v) = get("PING_INTERVAL_SEC") {
            self.liveness.ping_interval_sec = parse_number("PING_INTERVAL_SEC", &v)?;
        }

        if let Some(v) = get("BACKFILL_HISTORY_LIMIT") {
            self.backfill.history_limit = parse_number("BACKFILL_HISTORY_LIMIT", &v)?;
        }
        if let Some(v) = get("BACKFILL_READING_PAUSE_MS") {
            self.backfill.reading_pause_ms = parse_number("BACKFILL_READING_PAUSE_MS", &v)?;
        }
        if let Some(v) = get("BACKFILL_REPLAY_PAUSE_MS") {
            self.backfill.replay_pause_ms = parse_number("BACKFILL_REPLAY_PAUSE_MS", &v)?;
        }
        if let Some(v) = get("BACKFILL_QUIET_PAUSE_MS") {
            self.backfill.quiet_pause_ms = parse_number("BACKFILL_QUIET_PAUSE_MS", &v)?;
        }
        if let Some(v) = get("BACKFILL_TYPING_INTERVAL_MS") {
            self.backfill.typing_interval_ms = parse_number("BACKFILL_TYPING_INTERVAL_MS", &v)?;
        }

        Ok(())
    }

    /// Reject the configuration if any required setting is absent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("DISCORD_TOKEN", &self.discord.token),
            ("SPOTIFY_CLIENT_ID", &self.spotify.client_id),
            ("SPOTIFY_CLIENT_SECRET", &self.spotify.client_secret),
            ("SPOTIFY_REDIRECT_URI", &self.spotify.redirect_uri),
            ("SPOTIFY_PLAYLIST_ID", &self.spotify.playlist_id),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(key));
            }
        }

        if self.backfill.history_limit == 0 || self.backfill.history_limit > 100 {
            return Err(ConfigError::Invalid {
                key: "BACKFILL_HISTORY_LIMIT",
                reason: format!("{} is outside 1..=100", self.backfill.history_limit),
            });
        }

        if self.liveness.ping_url.is_some() && self.liveness.ping_interval_sec == 0 {
            return Err(ConfigError::Invalid {
                key: "PING_INTERVAL_SEC",
                reason: "must be at least 1 second".to_string(),
            });
        }

        Ok(())
    }
}

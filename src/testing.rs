//! In-memory stand-ins for Discord and Spotify used by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::backfill::{BackfillCoordinator, BackfillSettings};
use crate::checkpoint::Checkpoint;
use crate::music::{MusicService, Track, UserProfile};
use crate::platform::{ChatPlatform, Emote, Message, Reply};
use crate::scanner::{ScanContext, Scanner};

pub const CHANNEL: u64 = 42;
pub const USER: u64 = 7;
pub const BOT: u64 = 1;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// A user message whose creation time is `id` seconds after a fixed base
pub fn message(id: u64, content: &str) -> Message {
    message_at(id, content, base_time() + chrono::Duration::seconds(id as i64))
}

pub fn message_at(id: u64, content: &str, created_at: DateTime<Utc>) -> Message {
    Message {
        id,
        channel_id: CHANNEL,
        author_id: USER,
        content: content.to_string(),
        created_at,
        is_from_self: false,
    }
}

/// Same as [`message`] but authored by the bot
pub fn own_message(id: u64, content: &str) -> Message {
    Message {
        author_id: BOT,
        is_from_self: true,
        ..message(id, content)
    }
}

pub fn immediate_settings() -> BackfillSettings {
    BackfillSettings {
        history_limit: 100,
        reading_pause: Duration::ZERO,
        replay_pause: Duration::ZERO,
        quiet_pause: Duration::ZERO,
        typing_interval: Duration::from_secs(3600),
    }
}

/// Fresh context around `platform` with zero courtesy pauses
pub fn context(platform: Arc<FakePlatform>) -> ScanContext {
    ScanContext {
        platform,
        checkpoint: Arc::new(Checkpoint::new()),
        backfill: Arc::new(BackfillCoordinator::new(immediate_settings())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        channel_id: u64,
        text: String,
        reply_to: Option<u64>,
    },
    Reaction {
        message_id: u64,
        emote: Emote,
    },
    Typing(u64),
}

#[derive(Default)]
pub struct FakePlatform {
    sent: Mutex<Vec<Sent>>,
    history: Mutex<Vec<Message>>,
    history_requests: Mutex<Vec<(u64, DateTime<Utc>, usize)>>,
    fail_history: AtomicBool,
    fail_sends: AtomicBool,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_history(&self, messages: Vec<Message>) {
        *self.history.lock().unwrap() = messages;
    }

    pub fn fail_history(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Text of every posted message, in order
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn history_requests(&self) -> Vec<(u64, DateTime<Utc>, usize)> {
        self.history_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn send(&self, channel_id: u64, text: &str, reply_to: Option<u64>) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            bail!("send rejected");
        }
        self.sent.lock().unwrap().push(Sent::Text {
            channel_id,
            text: text.to_string(),
            reply_to,
        });
        Ok(())
    }

    async fn react(&self, message: &Message, emote: Emote) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Reaction {
            message_id: message.id,
            emote,
        });
        Ok(())
    }

    async fn typing(&self, channel_id: u64) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Typing(channel_id));
        Ok(())
    }

    async fn fetch_history(
        &self,
        channel_id: u64,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        self.history_requests
            .lock()
            .unwrap()
            .push((channel_id, before, limit));
        if self.fail_history.load(Ordering::SeqCst) {
            bail!("history unavailable");
        }

        let mut older: Vec<Message> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.channel_id == channel_id && m.created_at < before)
            .cloned()
            .collect();
        older.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        older.truncate(limit);
        Ok(older)
    }
}

/// Spotify stand-in with an in-memory playlist
#[derive(Default)]
pub struct FakeMusic {
    results: Mutex<HashMap<String, Track>>,
    playlist: Mutex<Vec<String>>,
    searches: AtomicUsize,
    fail_search: AtomicBool,
    fail_playlist_calls: AtomicBool,
    silent_add: AtomicBool,
}

impl FakeMusic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&self, query: &str, track: Track) {
        self.results
            .lock()
            .unwrap()
            .insert(query.to_string(), track);
    }

    pub fn seed_playlist(&self, track_ids: &[&str]) {
        *self.playlist.lock().unwrap() = track_ids.iter().map(|t| t.to_string()).collect();
    }

    pub fn playlist(&self) -> Vec<String> {
        self.playlist.lock().unwrap().clone()
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn fail_search(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    pub fn fail_playlist_calls(&self, fail: bool) {
        self.fail_playlist_calls.store(fail, Ordering::SeqCst);
    }

    /// Perform inserts but answer with an empty body
    pub fn silent_add(&self, silent: bool) {
        self.silent_add.store(silent, Ordering::SeqCst);
    }

    fn snapshot(&self) -> String {
        format!("snapshot-{}", self.playlist.lock().unwrap().len())
    }
}

#[async_trait]
impl MusicService for FakeMusic {
    async fn search_track(&self, query: &str) -> Result<Option<Track>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_search.load(Ordering::SeqCst) {
            bail!("search unavailable");
        }
        Ok(self.results.lock().unwrap().get(query).cloned())
    }

    async fn remove_track(&self, _playlist_id: &str, track_id: &str) -> Result<Option<String>> {
        if self.fail_playlist_calls.load(Ordering::SeqCst) {
            bail!("playlist unavailable");
        }
        self.playlist.lock().unwrap().retain(|t| t != track_id);
        Ok(Some(self.snapshot()))
    }

    async fn add_track(&self, _playlist_id: &str, track_id: &str) -> Result<Option<String>> {
        if self.fail_playlist_calls.load(Ordering::SeqCst) {
            bail!("playlist unavailable");
        }
        self.playlist.lock().unwrap().push(track_id.to_string());
        if self.silent_add.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(self.snapshot()))
    }

    async fn current_user(&self) -> Result<UserProfile> {
        Ok(UserProfile {
            id: "bot-account".to_string(),
            display_name: Some("Spootify Bot".to_string()),
        })
    }
}

/// Matches messages containing `trigger` and replies `<name>:<message id>`.
/// Counts calls so tests can check which scanners ran.
pub struct RecordingScanner {
    name: &'static str,
    trigger: &'static str,
    fail_on: Option<&'static str>,
    match_checks: AtomicUsize,
    handled: Mutex<Vec<u64>>,
}

impl RecordingScanner {
    pub fn new(name: &'static str, trigger: &'static str) -> Self {
        Self {
            name,
            trigger,
            fail_on: None,
            match_checks: AtomicUsize::new(0),
            handled: Mutex::new(Vec::new()),
        }
    }

    /// Make `handle` fail for messages containing `needle`
    pub fn failing_on(mut self, needle: &'static str) -> Self {
        self.fail_on = Some(needle);
        self
    }

    pub fn match_checks(&self) -> usize {
        self.match_checks.load(Ordering::SeqCst)
    }

    pub fn handled(&self) -> Vec<u64> {
        self.handled.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scanner for RecordingScanner {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_match(&self, message: &Message) -> bool {
        self.match_checks.fetch_add(1, Ordering::SeqCst);
        message.content.contains(self.trigger)
    }

    async fn handle(&self, _ctx: &ScanContext, message: &Message) -> Result<Option<Reply>> {
        self.handled.lock().unwrap().push(message.id);
        if let Some(needle) = self.fail_on {
            if message.content.contains(needle) {
                bail!("{} choked on message {}", self.name, message.id);
            }
        }
        Ok(Some(Reply::Text(format!("{}:{}", self.name, message.id))))
    }
}

pub mod discord;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A chat message as seen by the scanners. Read-only once produced by the
/// platform adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u64,
    pub channel_id: u64,
    pub author_id: u64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// True when the bot itself authored the message
    pub is_from_self: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Emote {
    pub shortcode: &'static str,
    pub unicode: &'static str,
}

pub const SOB: Emote = Emote {
    shortcode: ":sob:",
    unicode: "😭",
};

pub const FLUSHED: Emote = Emote {
    shortcode: ":flushed:",
    unicode: "😳",
};

/// What a scanner asks the bot to do with the message that triggered it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Reaction(Emote),
}

/// Lifecycle and traffic events emitted by a platform adapter
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    Connecting,
    Disconnected,
    Ready { user_name: String, guilds: Vec<String> },
    Message(Message),
}

/// Outbound operations the bot needs from a chat platform
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Post `text` to a channel, optionally threaded onto an earlier message.
    async fn send(&self, channel_id: u64, text: &str, reply_to: Option<u64>) -> Result<()>;

    async fn react(&self, message: &Message, emote: Emote) -> Result<()>;

    /// Show the "typing" indicator in a channel for a few seconds.
    async fn typing(&self, channel_id: u64) -> Result<()>;

    /// Up to `limit` messages created before `before`, newest first.
    async fn fetch_history(
        &self,
        channel_id: u64,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>>;
}

/// Deliver a reply addressed to the message that triggered it
pub async fn deliver(platform: &dyn ChatPlatform, message: &Message, reply: &Reply) -> Result<()> {
    match reply {
        Reply::Text(text) => {
            platform
                .send(message.channel_id, text, Some(message.id))
                .await
        }
        Reply::Reaction(emote) => platform.react(message, *emote).await,
    }
}

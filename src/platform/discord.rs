use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serenity::all::{
    ChannelId, ConnectionStage, CreateMessage, GatewayIntents, GetMessages, Http, MessageId,
    ReactionType, Ready, ShardStageUpdateEvent,
};
use serenity::client::{Client, Context, EventHandler};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::platform::{ChatPlatform, Emote, Message, PlatformEvent};

/// Milliseconds between the Unix epoch and the first second of 2015,
/// the zero point of Discord snowflakes.
const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Creation time encoded in the upper 42 bits of a snowflake
pub fn snowflake_created_at(id: u64) -> DateTime<Utc> {
    let millis = (id >> 22) as i64 + DISCORD_EPOCH_MS;
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Smallest snowflake created at `at`; usable as an exclusive `before` bound.
pub fn snowflake_at(at: DateTime<Utc>) -> u64 {
    let millis = at.timestamp_millis() - DISCORD_EPOCH_MS;
    if millis <= 0 {
        1
    } else {
        (millis as u64) << 22
    }
}

fn convert(msg: &serenity::model::channel::Message, self_id: u64) -> Message {
    Message {
        id: msg.id.get(),
        channel_id: msg.channel_id.get(),
        author_id: msg.author.id.get(),
        content: msg.content.clone(),
        created_at: snowflake_created_at(msg.id.get()),
        is_from_self: self_id != 0 && msg.author.id.get() == self_id,
    }
}

/// REST side of the Discord connection
pub struct DiscordPlatform {
    http: Arc<Http>,
    self_id: Arc<AtomicU64>,
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn send(&self, channel_id: u64, text: &str, reply_to: Option<u64>) -> Result<()> {
        let channel = ChannelId::new(channel_id);
        let mut builder = CreateMessage::new().content(text);
        if let Some(message_id) = reply_to {
            builder = builder.reference_message((channel, MessageId::new(message_id)));
        }
        channel
            .send_message(&*self.http, builder)
            .await
            .with_context(|| format!("Failed to send message to channel {}", channel_id))?;
        Ok(())
    }

    async fn react(&self, message: &Message, emote: Emote) -> Result<()> {
        ChannelId::new(message.channel_id)
            .create_reaction(
                &*self.http,
                MessageId::new(message.id),
                ReactionType::Unicode(emote.unicode.to_string()),
            )
            .await
            .with_context(|| format!("Failed to react {} to message {}", emote.shortcode, message.id))
    }

    async fn typing(&self, channel_id: u64) -> Result<()> {
        ChannelId::new(channel_id)
            .broadcast_typing(&*self.http)
            .await
            .with_context(|| format!("Failed to broadcast typing in channel {}", channel_id))
    }

    async fn fetch_history(
        &self,
        channel_id: u64,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let page = GetMessages::new()
            .before(MessageId::new(snowflake_at(before)))
            .limit(limit.min(100) as u8);

        let messages = ChannelId::new(channel_id)
            .messages(&*self.http, page)
            .await
            .with_context(|| format!("Failed to fetch history for channel {}", channel_id))?;

        let self_id = self.self_id.load(Ordering::Relaxed);
        debug!(
            "Fetched {} messages from channel {} before {}",
            messages.len(),
            channel_id,
            before
        );
        Ok(messages.iter().map(|m| convert(m, self_id)).collect())
    }
}

/// Gateway side: forwards every event into the dispatcher's queue so
/// messages are handled one at a time, in arrival order.
struct Handler {
    events: mpsc::UnboundedSender<PlatformEvent>,
    self_id: Arc<AtomicU64>,
}

impl Handler {
    fn forward(&self, event: PlatformEvent) {
        if self.events.send(event).is_err() {
            warn!("Dispatcher is gone, dropping Discord event");
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        self.self_id.store(ready.user.id.get(), Ordering::Relaxed);
        info!("{} has connected to Discord!", ready.user.name);

        let guilds = ready.guilds.iter().map(|g| g.id.to_string()).collect();
        self.forward(PlatformEvent::Ready {
            user_name: ready.user.name.clone(),
            guilds,
        });
    }

    async fn message(&self, _ctx: Context, msg: serenity::model::channel::Message) {
        let self_id = self.self_id.load(Ordering::Relaxed);
        self.forward(PlatformEvent::Message(convert(&msg, self_id)));
    }

    async fn shard_stage_update(&self, _ctx: Context, event: ShardStageUpdateEvent) {
        debug!(
            "Shard {} stage {:?} -> {:?}",
            event.shard_id, event.old, event.new
        );
        match event.new {
            ConnectionStage::Disconnected => self.forward(PlatformEvent::Disconnected),
            ConnectionStage::Connecting
            | ConnectionStage::Handshake
            | ConnectionStage::Identifying
            | ConnectionStage::Resuming => self.forward(PlatformEvent::Connecting),
            _ => {}
        }
    }
}

/// Build the gateway client. Events flow into `events`; the returned
/// platform performs REST calls on the same HTTP client.
pub async fn connect(
    token: &str,
    events: mpsc::UnboundedSender<PlatformEvent>,
) -> Result<(Client, Arc<DiscordPlatform>)> {
    let self_id = Arc::new(AtomicU64::new(0));
    let handler = Handler {
        events,
        self_id: Arc::clone(&self_id),
    };

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let client = Client::builder(token, intents)
        .event_handler(handler)
        .await
        .context("Failed to build Discord client")?;

    let platform = Arc::new(DiscordPlatform {
        http: Arc::clone(&client.http),
        self_id,
    });

    Ok((client, platform))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_timestamp_roundtrip() {
        // 2021-01-01T00:00:00Z
        let at = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let id = snowflake_at(at);
        assert_eq!(snowflake_created_at(id), at);
        // Any message created a millisecond later sorts after the bound
        assert!(snowflake_at(at + chrono::Duration::milliseconds(1)) > id);
    }

    #[test]
    fn test_known_snowflake() {
        // Example id from the Discord developer docs
        let created = snowflake_created_at(175_928_847_299_117_063);
        assert_eq!(created.timestamp_millis(), 1_462_015_105_796);
    }

    #[test]
    fn test_pre_epoch_bound_is_nonzero() {
        let at = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(snowflake_at(at), 1);
    }
}

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tracing::info;

use crate::platform::{Message, Reply};
use crate::scanner::{ScanContext, Scanner};

pub const DOZED_OFF: &str = "Oh my :flushed: I must have dozed off...let me see what I've missed";

fn wake_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)w+a+k+e+[\s\-]*u+p+[\s,.!]*b+[o0]+t+").unwrap())
}

/// "wake up bot" kicks off a catch-up over the history the bot missed,
/// replayed through `inner`.
pub struct WakeUpScanner {
    inner: Arc<dyn Scanner>,
}

impl WakeUpScanner {
    pub fn new(inner: Arc<dyn Scanner>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Scanner for WakeUpScanner {
    fn name(&self) -> &'static str {
        "wake-up"
    }

    fn is_match(&self, message: &Message) -> bool {
        wake_re().is_match(&message.content)
    }

    async fn handle(&self, ctx: &ScanContext, message: &Message) -> Result<Option<Reply>> {
        info!(
            "Wake-up call in channel {}, scheduling backfill with '{}' scanner",
            message.channel_id,
            self.inner.name()
        );
        ctx.backfill
            .schedule(ctx.clone(), message.channel_id, Arc::clone(&self.inner))
            .await;
        Ok(Some(Reply::Text(DOZED_OFF.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, message, FakePlatform, RecordingScanner};

    #[test]
    fn test_wake_phrases() {
        for text in [
            "wake up bot",
            "wake up bot!",
            "WAKE UP BOT!!!",
            "waaake uuup boooot",
            "wakeup bot",
            "hey, wake up, bot",
            "wake up b0t",
        ] {
            assert!(wake_re().is_match(text), "{}", text);
        }
    }

    #[test]
    fn test_non_wake_phrases() {
        for text in ["wake me up", "wake up everyone", "bot wake up", "make up bot"] {
            assert!(!wake_re().is_match(text), "{}", text);
        }
    }

    #[tokio::test]
    async fn test_replies_immediately_and_schedules_backfill() {
        let platform = Arc::new(FakePlatform::new());
        let ctx = context(platform.clone());
        ctx.checkpoint.mark_ready(chrono::Utc::now()).await;
        let inner = Arc::new(RecordingScanner::new("inner", "never"));
        let scanner = WakeUpScanner::new(inner);

        let reply = scanner
            .handle(&ctx, &message(1, "wake up bot!"))
            .await
            .unwrap();
        assert_eq!(reply, Some(Reply::Text(DOZED_OFF.to_string())));

        ctx.backfill.wait_idle().await;
        assert_eq!(platform.history_requests().len(), 1);
        assert_eq!(platform.texts(), vec![crate::backfill::QUIET_BANNER]);
    }
}

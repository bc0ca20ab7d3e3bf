use std::sync::OnceLock;

use anyhow::Result;
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};

use crate::platform::{Emote, Message, Reply, FLUSHED, SOB};
use crate::scanner::{ScanContext, Scanner};

/// Patterns are checked in order; the first one that matches decides
const RULES: [(&str, Emote); 2] = [
    (r"b+a+d+\s+b+[o0]+t+", SOB),
    (r"g+[o0]{2,}d+\s+b+[o0]+t+", FLUSHED),
];

fn rules() -> &'static [(Regex, Emote)] {
    static RULES_RE: OnceLock<Vec<(Regex, Emote)>> = OnceLock::new();
    RULES_RE.get_or_init(|| {
        RULES
            .iter()
            .map(|(pattern, emote)| {
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .unwrap();
                (re, *emote)
            })
            .collect()
    })
}

/// Reacts to "good bot" / "bad bot"
pub struct EmoteReactionScanner {
    rules: &'static [(Regex, Emote)],
}

impl EmoteReactionScanner {
    pub fn new() -> Self {
        Self { rules: rules() }
    }

    fn reaction_for(&self, content: &str) -> Option<Emote> {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(content))
            .map(|(_, emote)| *emote)
    }
}

#[async_trait]
impl Scanner for EmoteReactionScanner {
    fn name(&self) -> &'static str {
        "emote"
    }

    fn is_match(&self, message: &Message) -> bool {
        self.reaction_for(&message.content).is_some()
    }

    async fn handle(&self, _ctx: &ScanContext, message: &Message) -> Result<Option<Reply>> {
        Ok(self.reaction_for(&message.content).map(Reply::Reaction))
    }
}

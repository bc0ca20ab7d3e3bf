use std::sync::OnceLock;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;

use crate::platform::{Message, Reply};
use crate::scanner::{ScanContext, Scanner};

fn greet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^!greet\s+(\S+)").unwrap())
}

/// `!greet <name>`; only the first word is the name
pub struct GreetScanner;

impl GreetScanner {
    fn name_in<'a>(&self, content: &'a str) -> Option<&'a str> {
        greet_re()
            .captures(content.trim())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

#[async_trait]
impl Scanner for GreetScanner {
    fn name(&self) -> &'static str {
        "greet"
    }

    fn is_match(&self, message: &Message) -> bool {
        !message.is_from_self && self.name_in(&message.content).is_some()
    }

    async fn handle(&self, _ctx: &ScanContext, message: &Message) -> Result<Option<Reply>> {
        Ok(self
            .name_in(&message.content)
            .map(|name| Reply::Text(format!("Whaddup {}!", name))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::testing::{context, message, own_message, FakePlatform};

    #[test]
    fn test_greet_name() {
        let scanner = GreetScanner;
        assert_eq!(scanner.name_in("!greet Sam"), Some("Sam"));
        assert_eq!(scanner.name_in("  !greet   Sam Smith  "), Some("Sam"));
        assert_eq!(scanner.name_in("!greet"), None);
        assert_eq!(scanner.name_in("please !greet Sam"), None);
    }

    #[tokio::test]
    async fn test_greets_first_word_only() {
        let ctx = context(Arc::new(FakePlatform::new()));
        let reply = GreetScanner
            .handle(&ctx, &message(1, "!greet Sam Smith"))
            .await
            .unwrap();
        assert_eq!(reply, Some(Reply::Text("Whaddup Sam!".to_string())));
    }

    #[test]
    fn test_ignores_own_messages() {
        assert!(GreetScanner.is_match(&message(1, "!greet Sam")));
        assert!(!GreetScanner.is_match(&own_message(2, "!greet Sam")));
    }
}

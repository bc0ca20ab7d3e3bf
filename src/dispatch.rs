use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::platform::{deliver, Message, PlatformEvent};
use crate::scanner::{ScanContext, Scanner};

pub const APOLOGY: &str = "Whoops that hurt my brain...maybe try again?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Ready => write!(f, "ready"),
        }
    }
}

/// What happened to one live message
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Scanners whose `handle` ran, in order
    pub handled_by: Vec<&'static str>,
    pub replies: usize,
    pub failures: usize,
}

/// Feeds every live message through the scanner list, in order.
pub struct Dispatcher {
    ctx: ScanContext,
    scanners: Vec<Arc<dyn Scanner>>,
    state: watch::Sender<ConnectionState>,
}

impl Dispatcher {
    pub fn new(
        ctx: ScanContext,
        scanners: Vec<Arc<dyn Scanner>>,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            ctx,
            scanners,
            state,
        }
    }

    /// Process platform events one at a time until the adapter goes away.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<PlatformEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        info!("Platform event stream closed");
    }

    pub async fn handle_event(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::Connecting => self.set_state(ConnectionState::Connecting),
            PlatformEvent::Disconnected => self.set_state(ConnectionState::Disconnected),
            PlatformEvent::Ready { user_name, guilds } => self.on_ready(&user_name, &guilds).await,
            PlatformEvent::Message(message) => {
                self.on_message(&message).await;
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!("Connection state: {} -> {}", previous, next);
        }
    }

    async fn on_ready(&self, user_name: &str, guilds: &[String]) {
        info!("{} is ready", user_name);
        for guild in guilds {
            info!("Serving guild: {}", guild);
        }
        self.ctx.checkpoint.mark_ready(Utc::now()).await;
        self.set_state(ConnectionState::Ready);
    }

    /// Run every matching scanner against `message`. A scanner that fails
    /// costs that scanner's reply only; the user gets a single apology.
    pub async fn on_message(&self, message: &Message) -> DispatchReport {
        info!(
            "Received message {} in channel {}: {}",
            message.id, message.channel_id, message.content
        );

        let mut report = DispatchReport::default();
        for scanner in &self.scanners {
            if !scanner.is_match(message) {
                continue;
            }
            report.handled_by.push(scanner.name());

            let outcome = AssertUnwindSafe(scanner.handle(&self.ctx, message))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(Some(reply))) => {
                    match deliver(self.ctx.platform.as_ref(), message, &reply).await {
                        Ok(()) => report.replies += 1,
                        Err(e) => error!(
                            "Failed to deliver '{}' reply to {}: {:#}",
                            scanner.name(),
                            message.id,
                            e
                        ),
                    }
                }
                Ok(Ok(None)) => debug!("Scanner '{}' matched without a reply", scanner.name()),
                Ok(Err(e)) => {
                    error!(
                        "Scanner '{}' failed on message {}: {:#}",
                        scanner.name(),
                        message.id,
                        e
                    );
                    report.failures += 1;
                }
                Err(_) => {
                    error!(
                        "Scanner '{}' panicked on message {}",
                        scanner.name(),
                        message.id
                    );
                    report.failures += 1;
                }
            }
        }

        if report.failures > 0 {
            if let Err(e) = self
                .ctx
                .platform
                .send(message.channel_id, APOLOGY, None)
                .await
            {
                warn!("Failed to send apology: {:#}", e);
            }
        }

        report
    }
}

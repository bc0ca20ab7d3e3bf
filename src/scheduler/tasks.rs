use std::time::Duration;

use tracing::{debug, warn};

use crate::scheduler::Scheduler;

/// Ping `url` on a fixed interval so free-tier hosts don't idle the process.
pub async fn register_keepalive(
    scheduler: &Scheduler,
    url: String,
    interval: Duration,
) -> anyhow::Result<()> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    scheduler
        .add_repeated_job(interval, "keepalive", move || {
            let http = http.clone();
            let url = url.clone();
            Box::pin(async move {
                ping(&http, &url).await;
            })
        })
        .await?;

    Ok(())
}

async fn ping(http: &reqwest::Client, url: &str) {
    match http.get(url).send().await {
        Ok(resp) if resp.status().is_success() => {
            debug!("Keepalive ping to {} returned {}", url, resp.status())
        }
        Ok(resp) => warn!("Keepalive ping to {} returned {}", url, resp.status()),
        Err(e) => warn!("Keepalive ping to {} failed: {}", url, e),
    }
}

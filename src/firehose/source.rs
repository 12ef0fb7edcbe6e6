// Event source — the black-box transport delivering repository change
// events in order, with a resumption cursor.
//
// The pipeline pulls one batch at a time and does not ask for the next until
// the current one is fully processed, so ordering across batches is
// preserved by construction.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use super::events::EventBatch;

/// An ordered sequence of event batches, resumable from a cursor.
#[async_trait]
pub trait EventSource: Send {
    /// Fetch the next batch after `cursor`. `Ok(None)` means the stream has
    /// ended — finite sources only; the live source waits and retries
    /// instead.
    async fn next_batch(&mut self, cursor: Option<&str>) -> Result<Option<EventBatch>>;
}

/// HTTP polling adapter over a relay that serves JSON event batches.
///
/// Each poll passes the cursor as a query parameter and deserializes an
/// `EventBatch`. A batch that fails to decode is skipped (logged) without
/// advancing the cursor — the relay's own redelivery handles recovery.
pub struct HttpEventSource {
    client: reqwest::Client,
    relay_url: String,
    /// How long to sleep when the relay has nothing new.
    idle_wait: Duration,
}

impl HttpEventSource {
    pub fn new(relay_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("cinder/0.1 (feed-generation)")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            relay_url: relay_url.trim_end_matches('/').to_string(),
            idle_wait: Duration::from_secs(2),
        })
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn next_batch(&mut self, cursor: Option<&str>) -> Result<Option<EventBatch>> {
        loop {
            let mut request = self.client.get(&self.relay_url);
            if let Some(c) = cursor {
                request = request.query(&[("cursor", c)]);
            }

            let response = request
                .send()
                .await
                .context("Event source request failed")?;

            if !response.status().is_success() {
                let status = response.status();
                anyhow::bail!("Event source returned {status}");
            }

            let batch: EventBatch = match response.json().await {
                Ok(batch) => batch,
                Err(e) => {
                    // Skip the undecodable batch; the relay redelivers from
                    // the unchanged cursor.
                    warn!(error = %e, "Failed to decode event batch, skipping");
                    tokio::time::sleep(self.idle_wait).await;
                    continue;
                }
            };

            if batch.events.is_empty() && batch.cursor.as_deref() == cursor {
                debug!("Event source idle, waiting");
                tokio::time::sleep(self.idle_wait).await;
                continue;
            }

            return Ok(Some(batch));
        }
    }
}

//! Outbound delivery of agent output to chat channels.

use std::time::Duration;

use ct_domain::config::ChannelsConfig;
use ct_domain::error::{Error, Result};
use ct_domain::payload::Payload;

use crate::delivery::DeliveryTarget;

const MAX_ATTEMPTS: u32 = 3;
const USER_AGENT: &str = concat!("cronturn/", env!("CARGO_PKG_VERSION"));

#[async_trait::async_trait]
pub trait OutboundSink: Send + Sync {
    /// Send `payloads` to a resolved target, in order.  Failures are
    /// [`Error::Delivery`].
    async fn deliver(&self, target: &DeliveryTarget, payloads: &[Payload]) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Webhook sink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Posts each payload as JSON to the channel's configured bridge URL.
///
/// Server errors and transport failures are retried with exponential
/// back-off; client errors are not.
pub struct WebhookSink {
    channels: ChannelsConfig,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(channels: ChannelsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self { channels, client })
    }

    async fn post_with_retry(
        &self,
        url: &str,
        token: Option<&str>,
        body: &serde_json::Value,
        jitter_seed: u64,
    ) -> Result<()> {
        for attempt in 1..=MAX_ATTEMPTS {
            let mut req = self.client.post(url).json(body);
            if let Some(token) = token {
                req = req.bearer_auth(token);
            }

            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!(url = %url, status = %resp.status(), attempt, "payload delivered");
                    return Ok(());
                }
                Ok(resp) if resp.status().is_server_error() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(url = %url, status = %resp.status(), attempt, "delivery 5xx, will retry");
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    return Err(Error::Delivery(format!(
                        "{url} returned HTTP {}: {}",
                        status.as_u16(),
                        text.trim()
                    )));
                }
                Err(e) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!(url = %url, error = %e, attempt, "delivery failed, will retry");
                }
                Err(e) => {
                    return Err(Error::Delivery(format!(
                        "{url} failed after {MAX_ATTEMPTS} attempts: {e}"
                    )));
                }
            }
            // Exponential back-off with jitter: base 1s/2s + 0-255ms.
            let base_ms = (1u64 << (attempt - 1)) * 1000;
            let jitter_ms = jitter_seed.wrapping_mul(attempt as u64 * 37) % 256;
            tokio::time::sleep(Duration::from_millis(base_ms + jitter_ms)).await;
        }
        Err(Error::Delivery(format!("{url}: no attempts made")))
    }
}

fn payload_body(target: &DeliveryTarget, payload: &Payload) -> serde_json::Value {
    serde_json::json!({
        "channel": target.channel.map(|c| c.as_str()),
        "to": target.to,
        "account_id": target.account_id,
        "text": payload.trimmed_text(),
        "media_urls": payload.media_urls,
        "channel_data": payload.channel_data,
    })
}

#[async_trait::async_trait]
impl OutboundSink for WebhookSink {
    async fn deliver(&self, target: &DeliveryTarget, payloads: &[Payload]) -> Result<()> {
        if let Some(error) = &target.error {
            return Err(Error::Delivery(format!("unusable target: {error}")));
        }
        let channel = target
            .channel
            .ok_or_else(|| Error::Delivery("target has no channel".into()))?;
        let config = self
            .channels
            .get(channel)
            .ok_or_else(|| Error::Delivery(format!("channel {channel} is not configured")))?;

        let token = match config.token_env.as_deref() {
            Some(var) => Some(
                std::env::var(var)
                    .ok()
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| {
                        Error::Delivery(format!("environment variable '{var}' not set or empty"))
                    })?,
            ),
            None => None,
        };

        let jitter_seed = uuid::Uuid::new_v4().as_bytes()[15] as u64;
        for payload in payloads {
            let body = payload_body(target, payload);
            self.post_with_retry(&config.webhook_url, token.as_deref(), &body, jitter_seed)
                .await?;
        }
        Ok(())
    }
}

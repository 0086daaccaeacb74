//! HTTP push sender — POSTs the JSON payload to each subscription endpoint.
//!
//! Endpoints are expected to be a push relay that accepts the JSON body and
//! Web Push style `TTL` / `Topic` / `Urgency` headers. 404 and 410 mean the
//! subscription no longer exists.

use std::time::Duration;

use async_trait::async_trait;
use readwell_core::PushSubscription;
use readwell_core::config::PushConfig;
use readwell_scheduler::{DispatchError, PushPayload, PushSender};

pub struct HttpPushSender {
    client: reqwest::Client,
    topic: String,
    ttl_secs: u64,
}

impl HttpPushSender {
    pub fn from_config(config: &PushConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            topic: config.topic.clone(),
            ttl_secs: config.ttl_secs,
        }
    }

    fn request(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> reqwest::RequestBuilder {
        self.client
            .post(&subscription.endpoint)
            .header("TTL", self.ttl_secs.to_string())
            .header("Topic", &self.topic)
            .header("Urgency", "normal")
            .json(&serde_json::json!({
                "keys": { "p256dh": subscription.p256dh, "auth": subscription.auth },
                "payload": payload.to_json(),
            }))
            .timeout(Duration::from_secs(10))
    }
}

/// Map a push service response status to the dispatch outcome.
pub fn status_outcome(status: u16) -> Result<(), DispatchError> {
    match status {
        200..=299 => Ok(()),
        404 | 410 => Err(DispatchError::Gone),
        other => Err(DispatchError::Rejected { status: other }),
    }
}

#[async_trait]
impl PushSender for HttpPushSender {
    fn name(&self) -> &str {
        "http-push"
    }

    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), DispatchError> {
        let resp = self
            .request(subscription, payload)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(format!("push send failed: {e}")))?;

        status_outcome(resp.status().as_u16())?;
        tracing::debug!("🔔 Push delivered to subscription {}", subscription.id);
        Ok(())
    }
}

//! Dispatch contracts — how the scheduler hands a notification to a channel.
//!
//! Concrete senders (SMTP, HTTP push relay) live in `readwell-channels`;
//! the scheduler only sees these traits.

use async_trait::async_trait;
use readwell_core::{NotificationTarget, PushSubscription};
use thiserror::Error;

use crate::notify::{DailyDigest, PushPayload};

/// Why a single send failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The endpoint no longer exists (HTTP 410). The subscription should be deleted.
    #[error("subscription gone")]
    Gone,

    #[error("rejected with status {status}")]
    Rejected { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid message: {0}")]
    Invalid(String),
}

impl DispatchError {
    pub fn is_gone(&self) -> bool {
        matches!(self, DispatchError::Gone)
    }
}

/// Delivers a push payload to one registered endpoint.
#[async_trait]
pub trait PushSender: Send + Sync {
    fn name(&self) -> &str;

    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), DispatchError>;
}

/// Delivers the daily digest email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    fn name(&self) -> &str;

    /// Send to `target.notification_email()`.
    async fn send_digest(
        &self,
        target: &NotificationTarget,
        digest: &DailyDigest,
    ) -> Result<(), DispatchError>;
}

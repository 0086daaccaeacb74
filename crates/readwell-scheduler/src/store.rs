//! The persistence queries the notification scheduler depends on.

use std::collections::HashMap;

use async_trait::async_trait;
use readwell_core::{NotificationTarget, PushSubscription, Result, ScheduledItem};

/// Storage seen from the scheduler. [`crate::ReadingDb`] is the SQLite
/// implementation.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Users whose notification time equals `time_of_day` (`HH:MM`) and who
    /// have at least one channel enabled.
    async fn find_due_targets(&self, time_of_day: &str) -> Result<Vec<NotificationTarget>>;

    /// Pending items for a user. Completed items are never returned.
    async fn find_active_items(&self, user_id: i64) -> Result<Vec<ScheduledItem>>;

    async fn push_subscriptions(&self, user_id: i64) -> Result<Vec<PushSubscription>>;

    async fn delete_subscription(&self, subscription_id: i64) -> Result<()>;

    /// Plan titles for a user keyed by plan id, used to label digest entries.
    async fn plan_titles(&self, _user_id: i64) -> Result<HashMap<i64, String>> {
        Ok(HashMap::new())
    }
}

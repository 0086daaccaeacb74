//! Domain model — scheduled readings, users, and notification targets.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ReadwellError, Result};

/// `HH:MM`, 24-hour clock.
static TIME_OF_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("static regex"));

/// The recurrence unit a scheduled date represents.
///
/// - `Day`: the exact calendar date.
/// - `Week`: the stored date is the Monday that begins the ISO week.
/// - `Month`: any day of the month; only (year, month) is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = ReadwellError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            other => Err(ReadwellError::Validation(format!(
                "unknown granularity '{other}'"
            ))),
        }
    }
}

/// Completion state of a scheduled item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Completed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Completed => "completed",
        }
    }
}

impl FromStr for ItemStatus {
    type Err = ReadwellError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "completed" => Ok(ItemStatus::Completed),
            other => Err(ReadwellError::Validation(format!("unknown status '{other}'"))),
        }
    }
}

/// A reading scheduled for a day, an ISO week, or a calendar month.
///
/// `completed_at` is `Some` exactly when `status == Completed`; the
/// transition methods below are the only way to change either field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledItem {
    pub id: i64,
    /// Grouping key (the plan this reading belongs to).
    pub parent_id: i64,
    pub date: NaiveDate,
    pub granularity: Granularity,
    pub content: String,
    status: ItemStatus,
    completed_at: Option<NaiveDateTime>,
}

impl ScheduledItem {
    /// Create a pending item.
    pub fn pending(
        id: i64,
        parent_id: i64,
        date: NaiveDate,
        granularity: Granularity,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            parent_id,
            date,
            granularity,
            content: content.into(),
            status: ItemStatus::Pending,
            completed_at: None,
        }
    }

    /// Rebuild an item from stored fields, enforcing the completion invariant.
    pub fn restore(
        id: i64,
        parent_id: i64,
        date: NaiveDate,
        granularity: Granularity,
        content: String,
        status: ItemStatus,
        completed_at: Option<NaiveDateTime>,
    ) -> Result<Self> {
        match (status, completed_at) {
            (ItemStatus::Pending, Some(_)) => Err(ReadwellError::Validation(format!(
                "item {id}: pending item carries a completion time"
            ))),
            (ItemStatus::Completed, None) => Err(ReadwellError::Validation(format!(
                "item {id}: completed item has no completion time"
            ))),
            _ => Ok(Self {
                id,
                parent_id,
                date,
                granularity,
                content,
                status,
                completed_at,
            }),
        }
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn completed_at(&self) -> Option<NaiveDateTime> {
        self.completed_at
    }

    pub fn is_pending(&self) -> bool {
        self.status == ItemStatus::Pending
    }

    /// Mark the item completed at `at`.
    pub fn complete(&mut self, at: NaiveDateTime) {
        self.status = ItemStatus::Completed;
        self.completed_at = Some(at);
    }

    /// Move a completed item back to pending.
    pub fn reopen(&mut self) {
        self.status = ItemStatus::Pending;
        self.completed_at = None;
    }

    /// Replace the reading text. Date, status and completion are untouched.
    pub fn edit_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }
}

/// An account as seen by the request path and the user cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// `HH:MM` local time, or empty when notifications are off.
    #[serde(default)]
    pub notification_time: String,
    #[serde(default)]
    pub push_enabled: bool,
    #[serde(default)]
    pub email_enabled: bool,
    /// Digest address when different from the account email.
    #[serde(default)]
    pub notification_email: Option<String>,
}

impl User {
    /// Validate the notification time before persisting the user.
    pub fn validate(&self) -> Result<()> {
        validate_time_of_day(&self.notification_time)
    }

    pub fn notification_target(&self) -> NotificationTarget {
        NotificationTarget {
            user_id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            local_time_of_day: self.notification_time.clone(),
            push_enabled: self.push_enabled,
            email_enabled: self.email_enabled,
            email_override: self.notification_email.clone(),
        }
    }
}

/// Who to notify, when, and through which channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTarget {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    /// `HH:MM`; empty means disabled.
    pub local_time_of_day: String,
    pub push_enabled: bool,
    pub email_enabled: bool,
    pub email_override: Option<String>,
}

impl NotificationTarget {
    pub fn any_channel_enabled(&self) -> bool {
        self.push_enabled || self.email_enabled
    }

    /// Address the digest goes to: the override when set, else the account email.
    pub fn notification_email(&self) -> &str {
        match self.email_override.as_deref() {
            Some(addr) if !addr.trim().is_empty() => addr,
            _ => &self.email,
        }
    }
}

/// A registered push endpoint for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub id: i64,
    pub user_id: i64,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

/// Accepts `HH:MM` (00:00–23:59) or the empty string.
pub fn validate_time_of_day(value: &str) -> Result<()> {
    if value.is_empty() || TIME_OF_DAY.is_match(value) {
        Ok(())
    } else {
        Err(ReadwellError::Validation(format!(
            "notification time '{value}' must be HH:MM (24-hour) or empty"
        )))
    }
}

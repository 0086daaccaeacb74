//! # Readwell Scheduler
//!
//! Daily reading reminders plus the pieces around them.
//!
//! ## Architecture
//! ```text
//! NotificationScheduler (tokio interval, cancellable)
//!   └── every tick: "HH:MM" → NotificationStore::find_due_targets
//!         └── per user: pending items → classify → due?
//!               ├── PushSender  (per subscription, 410 → delete subscription)
//!               └── EmailSender (one digest)
//!
//! UserCache (DashMap + TTL, own sweeper task)
//! ReadingDb (SQLite) — users, plans, readings, push subscriptions
//! ```

pub mod cache;
pub mod dispatch;
pub mod engine;
pub mod notify;
pub mod persistence;
pub mod store;

pub use cache::UserCache;
pub use dispatch::{DispatchError, EmailSender, PushSender};
pub use engine::{NotificationScheduler, SchedulerHandle, SchedulerState, TickReport};
pub use notify::{DIGEST_SUBJECT, DailyDigest, DigestEntry, PushPayload};
pub use persistence::ReadingDb;
pub use store::NotificationStore;

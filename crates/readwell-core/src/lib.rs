//! # Readwell Core
//!
//! Shared vocabulary for every Readwell crate: the scheduled reading model,
//! notification targets, the error type, and TOML configuration.
//!
//! ```text
//! readwell-core
//!   ├── types   — Granularity, ScheduledItem, User, NotificationTarget
//!   ├── error   — ReadwellError + Result alias
//!   └── config  — ReadwellConfig (~/.readwell/config.toml)
//! ```

pub mod config;
pub mod error;
pub mod types;

pub use config::ReadwellConfig;
pub use error::{ReadwellError, Result};
pub use types::{
    Granularity, ItemStatus, NotificationTarget, PushSubscription, ScheduledItem, User,
};

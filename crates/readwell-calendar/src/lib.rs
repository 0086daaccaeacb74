//! # Readwell Calendar
//!
//! Pure temporal logic for scheduled readings. Nothing in this crate does I/O
//! or blocks; every decision takes the current instant as an argument.
//!
//! ```text
//! "2025-W01" ──► parser ──► (2024-12-30, Week)
//!                              │
//!                    classify (now) ──► active today / overdue
//!                              │
//!                    aggregate ──► dashboard buckets, plan groups, stats
//! ```
//!
//! All instants are process-local wall-clock time (`NaiveDateTime`).

pub mod aggregate;
pub mod classify;
pub mod clock;
pub mod csv;
pub mod label;
pub mod parser;
pub mod window;

pub use aggregate::{
    ActiveWindowPredicate, CompletionStats, DashboardView, ItemGroup, WindowedQueryPredicate,
    active_today, active_today_count, build_dashboard_view, completion_stats, dashboard_groups,
    group_by_parent, history,
};
pub use classify::{Classification, classify_item, is_active_today, is_overdue};
pub use clock::{Clock, FixedClock, SystemClock};
pub use csv::{ImportError, ImportLimits, ItemDraft, RowError, check_content, parse_csv};
pub use label::{date_label, long_date};
pub use parser::{DateParser, ParseError, parse_schedule_date};
pub use window::{
    Window, end_of_day, end_of_month, end_of_week, start_of_day, start_of_month, start_of_week,
};

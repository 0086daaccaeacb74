//! "Active today" and "overdue" decisions.
//!
//! An item is active while its granularity window contains `now`. It only
//! becomes overdue once a full period has elapsed after its anchor date, so
//! a week item anchored on a Wednesday is neither active nor overdue from the
//! following Monday until that Wednesday.

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use readwell_core::{Granularity, ScheduledItem};
use serde::Serialize;

/// Both decisions for one item at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Classification {
    pub active_today: bool,
    pub overdue: bool,
}

impl Classification {
    pub fn is_due(&self) -> bool {
        self.active_today || self.overdue
    }
}

/// Whether the item's window contains `now`. Status is not considered.
pub fn is_active_today(item: &ScheduledItem, now: NaiveDateTime) -> bool {
    window_contains(item.date, item.granularity, now.date())
}

/// Whether a pending item's whole period has elapsed. Always false once completed.
pub fn is_overdue(item: &ScheduledItem, now: NaiveDateTime) -> bool {
    item.is_pending() && now > overdue_after(item.date, item.granularity)
}

pub fn classify_item(item: &ScheduledItem, now: NaiveDateTime) -> Classification {
    Classification {
        active_today: is_active_today(item, now),
        overdue: is_overdue(item, now),
    }
}

/// The deadline for an item anchored on `date`; it is overdue strictly after this.
pub fn overdue_after(date: NaiveDate, granularity: Granularity) -> NaiveDateTime {
    let start = date.and_time(NaiveTime::MIN);
    match granularity {
        Granularity::Day => start + TimeDelta::days(1),
        Granularity::Week => start + TimeDelta::days(7),
        Granularity::Month => add_one_month(date).and_time(NaiveTime::MIN),
    }
}

/// Same day number one month later, spilling into the month after when the
/// next month is shorter (Jan 31 2024 -> Mar 2 2024).
fn add_one_month(date: NaiveDate) -> NaiveDate {
    let first_of_next = date - Days::new(u64::from(date.day0())) + Months::new(1);
    first_of_next + Days::new(u64::from(date.day0()))
}

fn window_contains(anchor: NaiveDate, granularity: Granularity, today: NaiveDate) -> bool {
    match granularity {
        Granularity::Day => anchor == today,
        Granularity::Week => {
            let (a, t) = (anchor.iso_week(), today.iso_week());
            a.year() == t.year() && a.week() == t.week()
        }
        Granularity::Month => anchor.year() == today.year() && anchor.month() == today.month(),
    }
}

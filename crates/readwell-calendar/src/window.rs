//! Day / ISO-week / month window boundaries.
//!
//! Every window is inclusive on both ends: it starts at 00:00:00 and ends at
//! 23:59:59.999999999 of its last day. Weeks run Monday through Sunday.

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use readwell_core::Granularity;
use serde::Serialize;

fn last_instant_before(next_start: NaiveDateTime) -> NaiveDateTime {
    next_start - TimeDelta::nanoseconds(1)
}

/// Monday of the ISO week containing `date`.
pub fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_monday()))
}

/// First day of the month containing `date`.
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

/// Midnight at the start of `now`'s day.
pub fn start_of_day(now: NaiveDateTime) -> NaiveDateTime {
    now.date().and_time(NaiveTime::MIN)
}

/// Last nanosecond of `now`'s day.
pub fn end_of_day(now: NaiveDateTime) -> NaiveDateTime {
    last_instant_before(start_of_day(now) + TimeDelta::days(1))
}

/// Monday 00:00 of the ISO week containing `now`.
pub fn start_of_week(now: NaiveDateTime) -> NaiveDateTime {
    monday_of(now.date()).and_time(NaiveTime::MIN)
}

/// Sunday 23:59:59.999999999 of the ISO week containing `now`.
pub fn end_of_week(now: NaiveDateTime) -> NaiveDateTime {
    last_instant_before(start_of_week(now) + TimeDelta::days(7))
}

/// The 1st at 00:00.
pub fn start_of_month(now: NaiveDateTime) -> NaiveDateTime {
    first_of_month(now.date()).and_time(NaiveTime::MIN)
}

/// Last instant of the month, leap years included.
pub fn end_of_month(now: NaiveDateTime) -> NaiveDateTime {
    let next = first_of_month(now.date()) + Months::new(1);
    last_instant_before(next.and_time(NaiveTime::MIN))
}

/// An inclusive `[start, end]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    /// The day, week, or month window that contains `now`.
    pub fn containing(granularity: Granularity, now: NaiveDateTime) -> Self {
        match granularity {
            Granularity::Day => Self {
                start: start_of_day(now),
                end: end_of_day(now),
            },
            Granularity::Week => Self {
                start: start_of_week(now),
                end: end_of_week(now),
            },
            Granularity::Month => Self {
                start: start_of_month(now),
                end: end_of_month(now),
            },
        }
    }

    /// Inclusive at both ends.
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at <= self.end
    }
}

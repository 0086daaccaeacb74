//! Human-readable date labels for scheduled items.

use chrono::{Datelike, Days, NaiveDate};
use readwell_core::{Granularity, ScheduledItem};

/// - Day: `Jan 2, 2006`
/// - Week: `Jan 2-8, 2006`, `Jun 30 - Jul 6, 2025`, or
///   `Dec 30, 2024 - Jan 5, 2025` when the week spans a year
/// - Month: `Jan 2006`
pub fn date_label(item: &ScheduledItem) -> String {
    match item.granularity {
        Granularity::Day => item.date.format("%b %-d, %Y").to_string(),
        Granularity::Week => week_range(item.date),
        Granularity::Month => item.date.format("%b %Y").to_string(),
    }
}

/// `January 2, 2006`
pub fn long_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

fn week_range(start: NaiveDate) -> String {
    let end = start + Days::new(6);
    if start.month() == end.month() {
        format!("{}-{}", start.format("%b %-d"), end.format("%-d, %Y"))
    } else if start.year() == end.year() {
        format!("{} - {}", start.format("%b %-d"), end.format("%b %-d, %Y"))
    } else {
        format!("{} - {}", start.format("%b %-d, %Y"), end.format("%b %-d, %Y"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(y: i32, m: u32, d: u32, g: Granularity) -> ScheduledItem {
        ScheduledItem::pending(1, 1, NaiveDate::from_ymd_opt(y, m, d).unwrap(), g, "x")
    }

    #[test]
    fn test_day_and_month_labels() {
        assert_eq!(date_label(&item(2006, 1, 2, Granularity::Day)), "Jan 2, 2006");
        assert_eq!(date_label(&item(2006, 1, 1, Granularity::Month)), "Jan 2006");
    }

    #[test]
    fn test_week_labels() {
        assert_eq!(date_label(&item(2025, 6, 2, Granularity::Week)), "Jun 2-8, 2025");
        assert_eq!(
            date_label(&item(2025, 6, 30, Granularity::Week)),
            "Jun 30 - Jul 6, 2025"
        );
        assert_eq!(
            date_label(&item(2024, 12, 30, Granularity::Week)),
            "Dec 30, 2024 - Jan 5, 2025"
        );
    }

    #[test]
    fn test_long_date() {
        let d = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        assert_eq!(long_date(d), "January 5, 2025");
    }
}

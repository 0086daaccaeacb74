//! Free-form schedule date parser.
//!
//! Turns spreadsheet-style input into a `(date, granularity)` pair.
//! Forms are tried in this order, first match wins:
//!
//! | Input              | Granularity | Stored date                     |
//! |--------------------|-------------|---------------------------------|
//! | `Week 7`           | Week        | Monday of ISO week 7, this year |
//! | `2025-W07`         | Week        | Monday of ISO week 7, 2025      |
//! | `2025-02-14`       | Day         | 2025-02-14                      |
//! | `02/14/2025`       | Day         | 2025-02-14                      |
//! | `February 2025`    | Month       | 2025-02-01                      |
//! | `Feb 2025`         | Month       | 2025-02-01                      |
//! | `2025-02`          | Month       | 2025-02-01                      |

use std::sync::LazyLock;

use chrono::{Datelike, Days, Local, NaiveDate};
use readwell_core::Granularity;
use regex::Regex;
use thiserror::Error;

use crate::window::monday_of;

static WEEK_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Week\s+(\d{1,3})$").expect("static regex"));
static ISO_WEEK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-W(\d{1,3})$").expect("static regex"));
static YEAR_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("static regex"));

const SUPPORTED: &str = "YYYY-MM-DD, MM/DD/YYYY, Month YYYY, YYYY-MM, YYYY-Wnn, Week n";

/// Why a schedule date could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("date is required")]
    Empty,

    #[error("invalid week format: {0} (expected 'Week n')")]
    InvalidWeek(String),

    #[error("invalid ISO week format: {0} (expected YYYY-Wnn)")]
    InvalidIsoWeek(String),

    #[error("week number must be between 1 and 53, got {0}")]
    WeekOutOfRange(u32),

    #[error("invalid date format: {0} (supported: {SUPPORTED})")]
    UnknownFormat(String),
}

/// Parses schedule dates.
///
/// `Week n` resolves against the pinned year, or against the local year at
/// the moment of each `parse` call when nothing is pinned.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateParser {
    reference_year: Option<i32>,
}

impl DateParser {
    /// A parser that follows the current local year.
    pub fn new() -> Self {
        Self { reference_year: None }
    }

    /// A parser pinned to `reference_year`.
    pub fn for_year(reference_year: i32) -> Self {
        Self {
            reference_year: Some(reference_year),
        }
    }

    /// The year `Week n` resolves against right now.
    pub fn reference_year(&self) -> i32 {
        self.reference_year.unwrap_or_else(|| Local::now().year())
    }

    pub fn parse(&self, raw: &str) -> Result<(NaiveDate, Granularity), ParseError> {
        let input = raw.trim();
        if input.is_empty() {
            return Err(ParseError::Empty);
        }

        if input.starts_with("Week ") {
            return self.parse_week_number(input);
        }

        let bytes = input.as_bytes();
        if bytes.len() >= 8 && bytes[4] == b'-' && bytes[5] == b'W' {
            return parse_iso_week(input);
        }

        for layout in ["%Y-%m-%d", "%m/%d/%Y"] {
            if let Ok(date) = NaiveDate::parse_from_str(input, layout) {
                return Ok((date, Granularity::Day));
            }
        }

        if let Some(date) = parse_month(input) {
            return Ok((date, Granularity::Month));
        }

        Err(ParseError::UnknownFormat(input.to_string()))
    }

    fn parse_week_number(&self, input: &str) -> Result<(NaiveDate, Granularity), ParseError> {
        let week = WEEK_NUMBER
            .captures(input)
            .and_then(|c| c[1].parse::<u32>().ok())
            .ok_or_else(|| ParseError::InvalidWeek(input.to_string()))?;
        let monday = iso_week_monday(self.reference_year(), week)?;
        Ok((monday, Granularity::Week))
    }
}

/// Parse with `Week n` resolved against the current local year.
pub fn parse_schedule_date(raw: &str) -> Result<(NaiveDate, Granularity), ParseError> {
    DateParser::new().parse(raw)
}

fn parse_iso_week(input: &str) -> Result<(NaiveDate, Granularity), ParseError> {
    let caps = ISO_WEEK
        .captures(input)
        .ok_or_else(|| ParseError::InvalidIsoWeek(input.to_string()))?;
    let year: i32 = caps[1]
        .parse()
        .map_err(|_| ParseError::InvalidIsoWeek(input.to_string()))?;
    let week: u32 = caps[2]
        .parse()
        .map_err(|_| ParseError::InvalidIsoWeek(input.to_string()))?;
    let monday = iso_week_monday(year, week)?;
    Ok((monday, Granularity::Week))
}

/// Monday of ISO week `week` in `year`.
///
/// January 4th is always in week 1, so week 1 starts on the Monday on or
/// before it. Week 53 is accepted for every year as a plain 52-week offset.
pub fn iso_week_monday(year: i32, week: u32) -> Result<NaiveDate, ParseError> {
    if !(1..=53).contains(&week) {
        return Err(ParseError::WeekOutOfRange(week));
    }
    let offset = Days::new(7 * u64::from(week - 1));
    NaiveDate::from_ymd_opt(year, 1, 4)
        .and_then(|jan4| monday_of(jan4).checked_add_days(offset))
        .ok_or_else(|| ParseError::InvalidIsoWeek(format!("{year}-W{week:02}")))
}

fn parse_month(input: &str) -> Option<NaiveDate> {
    if let Some(caps) = YEAR_MONTH.captures(input) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, 1);
    }

    // chrono needs a day to build a date; "%B" also accepts abbreviations.
    let with_day = format!("1 {input}");
    ["%d %B %Y", "%d %b %Y"]
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(&with_day, layout).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn parser() -> DateParser {
        DateParser::for_year(2025)
    }

    #[test]
    fn test_day_forms() {
        assert_eq!(
            parser().parse("2025-01-15").unwrap(),
            (date(2025, 1, 15), Granularity::Day)
        );
        assert_eq!(
            parser().parse("01/15/2025").unwrap(),
            (date(2025, 1, 15), Granularity::Day)
        );
        assert_eq!(
            parser().parse("  2024-02-29 ").unwrap(),
            (date(2024, 2, 29), Granularity::Day)
        );
    }

    #[test]
    fn test_month_forms() {
        for raw in ["January 2006", "Jan 2006", "2006-01"] {
            assert_eq!(
                parser().parse(raw).unwrap(),
                (date(2006, 1, 1), Granularity::Month),
                "{raw}"
            );
        }
        assert_eq!(
            parser().parse("September 2025").unwrap(),
            (date(2025, 9, 1), Granularity::Month)
        );
    }

    #[test]
    fn test_iso_week_literal() {
        assert_eq!(
            parser().parse("2025-W01").unwrap(),
            (date(2024, 12, 30), Granularity::Week)
        );
        assert_eq!(
            parser().parse("2026-W01").unwrap(),
            (date(2025, 12, 29), Granularity::Week)
        );
        assert_eq!(
            parser().parse("2020-W53").unwrap(),
            (date(2020, 12, 28), Granularity::Week)
        );
    }

    #[test]
    fn test_iso_week_out_of_range() {
        assert_eq!(
            parser().parse("2025-W54"),
            Err(ParseError::WeekOutOfRange(54))
        );
        assert_eq!(parser().parse("2025-W00"), Err(ParseError::WeekOutOfRange(0)));
        assert!(matches!(
            parser().parse("2025-Wxy"),
            Err(ParseError::InvalidIsoWeek(_))
        ));
    }

    #[test]
    fn test_week_number_uses_reference_year() {
        for year in [2020, 2024, 2025, 2026] {
            let p = DateParser::for_year(year);
            let relative = p.parse("Week 1").unwrap();
            let literal = p.parse(&format!("{year}-W01")).unwrap();
            assert_eq!(relative, literal);
        }
        assert_eq!(
            parser().parse("Week 10").unwrap(),
            (date(2025, 3, 3), Granularity::Week)
        );
    }

    #[test]
    fn test_unpinned_parser_follows_local_year() {
        let year = Local::now().year();
        assert_eq!(
            parse_schedule_date("Week 1").unwrap(),
            parse_schedule_date(&format!("{year}-W01")).unwrap()
        );
        assert_eq!(DateParser::default().reference_year(), year);
        assert_eq!(DateParser::for_year(1999).reference_year(), 1999);
    }

    #[test]
    fn test_week_number_errors() {
        assert_eq!(parser().parse("Week 0"), Err(ParseError::WeekOutOfRange(0)));
        assert_eq!(parser().parse("Week 54"), Err(ParseError::WeekOutOfRange(54)));
        assert!(matches!(
            parser().parse("Week ten"),
            Err(ParseError::InvalidWeek(_))
        ));
    }

    #[test]
    fn test_every_iso_week_resolves_to_monday() {
        for year in 1995..=2035 {
            for week in 1..=53 {
                let (d, g) = DateParser::for_year(year)
                    .parse(&format!("{year}-W{week:02}"))
                    .unwrap();
                assert_eq!(g, Granularity::Week);
                assert_eq!(d.weekday(), Weekday::Mon, "{year}-W{week:02}");
            }
        }
    }

    #[test]
    fn test_blank_and_unknown() {
        assert_eq!(parser().parse(""), Err(ParseError::Empty));
        assert_eq!(parser().parse("   \t"), Err(ParseError::Empty));
        let err = parser().parse("next tuesday").unwrap_err();
        assert_eq!(err, ParseError::UnknownFormat("next tuesday".into()));
        assert!(err.to_string().contains("next tuesday"));
        assert!(parser().parse("2025-13-01").is_err());
        assert!(parser().parse("2025-13").is_err());
    }
}

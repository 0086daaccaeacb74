//! Presentation buckets built on top of the classifier.
//!
//! Everything here is a pure function of `(items, now)`; the store is
//! expected to pre-filter with [`WindowedQueryPredicate`] and hand over the
//! candidates.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use readwell_core::{Granularity, ScheduledItem};
use serde::Serialize;

use crate::classify::{is_active_today, is_overdue};
use crate::window::{Window, end_of_day, end_of_month, end_of_week};

/// Pending items split into "due in the current window" and "window passed".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardView {
    pub today: Vec<ScheduledItem>,
    pub overdue: Vec<ScheduledItem>,
}

impl DashboardView {
    /// Nothing due and nothing overdue.
    pub fn is_empty(&self) -> bool {
        self.today.is_empty() && self.overdue.is_empty()
    }

    /// Items across both buckets.
    pub fn len(&self) -> usize {
        self.today.len() + self.overdue.len()
    }
}

/// Completed items are dropped. Active wins over overdue, and items that
/// are neither (future-dated) are left out. Input order is preserved.
pub fn build_dashboard_view(items: &[ScheduledItem], now: NaiveDateTime) -> DashboardView {
    let mut view = DashboardView::default();
    for item in items.iter().filter(|i| i.is_pending()) {
        if is_active_today(item, now) {
            view.today.push(item.clone());
        } else if is_overdue(item, now) {
            view.overdue.push(item.clone());
        }
    }
    view
}

/// Items that belong to one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemGroup {
    pub parent_id: i64,
    /// Oldest first.
    pub items: Vec<ScheduledItem>,
}

impl ItemGroup {
    /// Date of the first item, or `None` for an empty group.
    pub fn earliest(&self) -> Option<NaiveDate> {
        self.items.first().map(|i| i.date)
    }

    /// Whether any item in the group is overdue at `now`.
    pub fn has_overdue(&self, now: NaiveDateTime) -> bool {
        self.items.iter().any(|i| is_overdue(i, now))
    }
}

/// Group by `parent_id`. Items within a group are ordered by date and groups
/// by their earliest date; both sorts are stable.
pub fn group_by_parent<I>(items: I) -> Vec<ItemGroup>
where
    I: IntoIterator<Item = ScheduledItem>,
{
    let mut slots: HashMap<i64, usize> = HashMap::new();
    let mut groups: Vec<ItemGroup> = Vec::new();

    for item in items {
        let slot = *slots.entry(item.parent_id).or_insert_with(|| {
            groups.push(ItemGroup {
                parent_id: item.parent_id,
                items: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].items.push(item);
    }

    for group in &mut groups {
        group.items.sort_by_key(|i| i.date);
    }
    groups.sort_by_key(|g| g.earliest());
    groups
}

/// Plan cards for the dashboard: pending items that are active or overdue.
pub fn dashboard_groups(items: &[ScheduledItem], now: NaiveDateTime) -> Vec<ItemGroup> {
    group_by_parent(
        items
            .iter()
            .filter(|i| i.is_pending() && (is_active_today(i, now) || is_overdue(i, now)))
            .cloned(),
    )
}

/// Upper bounds a stored `(date, granularity)` must satisfy to possibly be
/// active or overdue at `now`.
///
/// This over-selects on purpose: anything old enough passes, and the
/// classifier makes the final call. It never drops a row that the
/// classifier would keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowedQueryPredicate {
    pub day_end: NaiveDateTime,
    pub week_end: NaiveDateTime,
    pub month_end: NaiveDateTime,
}

impl WindowedQueryPredicate {
    /// Bounds for `now`: the end of the day, week, and month containing it.
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            day_end: end_of_day(now),
            week_end: end_of_week(now),
            month_end: end_of_month(now),
        }
    }

    pub fn bound_for(&self, granularity: Granularity) -> NaiveDateTime {
        match granularity {
            Granularity::Day => self.day_end,
            Granularity::Week => self.week_end,
            Granularity::Month => self.month_end,
        }
    }

    /// Last stored date that still passes, for date-typed SQL columns.
    pub fn date_bound(&self, granularity: Granularity) -> NaiveDate {
        self.bound_for(granularity).date()
    }

    /// True when the anchor's start of day is at or before its bound.
    pub fn matches(&self, date: NaiveDate, granularity: Granularity) -> bool {
        date.and_time(NaiveTime::MIN) <= self.bound_for(granularity)
    }
}

/// The current day, week, and month windows, used for "due now" counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActiveWindowPredicate {
    pub day: Window,
    pub week: Window,
    pub month: Window,
}

impl ActiveWindowPredicate {
    /// Windows containing `now`.
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            day: Window::containing(Granularity::Day, now),
            week: Window::containing(Granularity::Week, now),
            month: Window::containing(Granularity::Month, now),
        }
    }

    pub fn window_for(&self, granularity: Granularity) -> Window {
        match granularity {
            Granularity::Day => self.day,
            Granularity::Week => self.week,
            Granularity::Month => self.month,
        }
    }

    /// Whether an item anchored on `date` falls in the current window for
    /// its granularity. Agrees with [`is_active_today`].
    pub fn matches(&self, date: NaiveDate, granularity: Granularity) -> bool {
        self.window_for(granularity)
            .contains(date.and_time(NaiveTime::MIN))
    }
}

/// Pending items active today, oldest first, at most `limit`.
pub fn active_today(items: &[ScheduledItem], now: NaiveDateTime, limit: usize) -> Vec<ScheduledItem> {
    let windows = ActiveWindowPredicate::at(now);
    let mut active: Vec<ScheduledItem> = items
        .iter()
        .filter(|i| i.is_pending() && windows.matches(i.date, i.granularity))
        .cloned()
        .collect();
    active.sort_by_key(|i| i.date);
    active.truncate(limit);
    active
}

/// Number of pending items active today, without a limit.
pub fn active_today_count(items: &[ScheduledItem], now: NaiveDateTime) -> usize {
    let windows = ActiveWindowPredicate::at(now);
    items
        .iter()
        .filter(|i| i.is_pending() && windows.matches(i.date, i.granularity))
        .count()
}

/// Items completed inside the current week and month windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompletionStats {
    pub this_week: usize,
    pub this_month: usize,
}

/// Counts by `completed_at`, not by the item's scheduled date.
pub fn completion_stats(items: &[ScheduledItem], now: NaiveDateTime) -> CompletionStats {
    let week = Window::containing(Granularity::Week, now);
    let month = Window::containing(Granularity::Month, now);

    items
        .iter()
        .filter_map(|i| i.completed_at())
        .fold(CompletionStats::default(), |mut stats, at| {
            if week.contains(at) {
                stats.this_week += 1;
            }
            if month.contains(at) {
                stats.this_month += 1;
            }
            stats
        })
}

/// Completed items, most recently completed first.
pub fn history(items: &[ScheduledItem]) -> Vec<ScheduledItem> {
    let mut done: Vec<ScheduledItem> = items.iter().filter(|i| !i.is_pending()).cloned().collect();
    done.sort_by(|a, b| b.completed_at().cmp(&a.completed_at()));
    done
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, 0, 0).unwrap()
    }

    fn item(id: i64, parent: i64, d: NaiveDate, g: Granularity) -> ScheduledItem {
        ScheduledItem::pending(id, parent, d, g, format!("reading {id}"))
    }

    fn ids(items: &[ScheduledItem]) -> Vec<i64> {
        items.iter().map(|i| i.id).collect()
    }

    #[test]
    fn test_dashboard_view_partitions() {
        // Wednesday
        let now = at(2025, 6, 18, 9);
        let mut done = item(5, 1, date(2025, 6, 18), Granularity::Day);
        done.complete(at(2025, 6, 18, 7));

        let items = vec![
            item(1, 1, date(2025, 6, 18), Granularity::Day),
            item(2, 1, date(2025, 6, 17), Granularity::Day),
            item(3, 1, date(2025, 6, 19), Granularity::Day),
            item(4, 2, date(2025, 6, 16), Granularity::Week),
            done,
            item(6, 2, date(2025, 5, 1), Granularity::Month),
            item(7, 2, date(2025, 6, 1), Granularity::Month),
        ];

        let view = build_dashboard_view(&items, now);
        assert_eq!(ids(&view.today), vec![1, 4, 7]);
        assert_eq!(ids(&view.overdue), vec![2, 6]);
        assert_eq!(view.len(), 5);
    }

    #[test]
    fn test_dashboard_view_empty_for_future_items() {
        let items = vec![item(1, 1, date(2030, 1, 1), Granularity::Day)];
        assert!(build_dashboard_view(&items, at(2025, 1, 1, 0)).is_empty());
    }

    #[test]
    fn test_group_by_parent_orders_groups_and_items() {
        let items = vec![
            item(1, 10, date(2025, 3, 5), Granularity::Day),
            item(2, 20, date(2025, 3, 1), Granularity::Day),
            item(3, 10, date(2025, 3, 2), Granularity::Day),
            item(4, 20, date(2025, 3, 1), Granularity::Day),
            item(5, 30, date(2025, 3, 9), Granularity::Day),
        ];

        let groups = group_by_parent(items);
        let parents: Vec<i64> = groups.iter().map(|g| g.parent_id).collect();
        assert_eq!(parents, vec![20, 10, 30]);
        assert_eq!(ids(&groups[0].items), vec![2, 4]);
        assert_eq!(ids(&groups[1].items), vec![3, 1]);
        assert_eq!(groups[1].earliest(), Some(date(2025, 3, 2)));
    }

    #[test]
    fn test_group_ties_keep_first_seen_order() {
        let items = vec![
            item(1, 7, date(2025, 3, 1), Granularity::Day),
            item(2, 3, date(2025, 3, 1), Granularity::Day),
        ];
        let parents: Vec<i64> = group_by_parent(items).iter().map(|g| g.parent_id).collect();
        assert_eq!(parents, vec![7, 3]);
    }

    #[test]
    fn test_dashboard_groups_and_overdue_flag() {
        let now = at(2025, 6, 18, 9);
        let items = vec![
            item(1, 1, date(2025, 6, 18), Granularity::Day),
            item(2, 2, date(2025, 6, 10), Granularity::Day),
            item(3, 2, date(2025, 7, 1), Granularity::Day),
        ];
        let groups = dashboard_groups(&items, now);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].parent_id, 2);
        assert!(groups[0].has_overdue(now));
        assert_eq!(ids(&groups[0].items), vec![2]);
        assert!(!groups[1].has_overdue(now));
    }

    #[test]
    fn test_windowed_predicate_bounds() {
        // Wednesday 2024-01-03
        let p = WindowedQueryPredicate::at(at(2024, 1, 3, 12));
        assert_eq!(p.date_bound(Granularity::Day), date(2024, 1, 3));
        assert_eq!(p.date_bound(Granularity::Week), date(2024, 1, 7));
        assert_eq!(p.date_bound(Granularity::Month), date(2024, 1, 31));

        assert!(p.matches(date(2024, 1, 3), Granularity::Day));
        assert!(!p.matches(date(2024, 1, 4), Granularity::Day));
        assert!(p.matches(date(2024, 1, 1), Granularity::Week));
        assert!(!p.matches(date(2024, 1, 8), Granularity::Week));
        assert!(p.matches(date(2024, 1, 31), Granularity::Month));
        assert!(!p.matches(date(2024, 2, 1), Granularity::Month));
        assert!(p.matches(date(2019, 1, 1), Granularity::Month));
    }

    #[test]
    fn test_windowed_predicate_never_drops_due_items() {
        let anchors = [
            (date(2024, 12, 30), Granularity::Week),
            (date(2025, 1, 6), Granularity::Week),
            (date(2025, 1, 1), Granularity::Month),
            (date(2025, 1, 31), Granularity::Month),
            (date(2025, 1, 15), Granularity::Day),
        ];
        for (d, g) in anchors {
            let it = item(1, 1, d, g);
            let mut now = at(2024, 12, 1, 0);
            while now < at(2025, 4, 1, 0) {
                if is_active_today(&it, now) || is_overdue(&it, now) {
                    assert!(WindowedQueryPredicate::at(now).matches(d, g), "{d} {g} at {now}");
                }
                now += chrono::TimeDelta::hours(5);
            }
        }
    }

    #[test]
    fn test_active_window_predicate() {
        let p = ActiveWindowPredicate::at(at(2024, 2, 14, 8));
        assert!(p.matches(date(2024, 2, 14), Granularity::Day));
        assert!(!p.matches(date(2024, 2, 13), Granularity::Day));
        assert!(p.matches(date(2024, 2, 12), Granularity::Week));
        assert!(!p.matches(date(2024, 2, 5), Granularity::Week));
        assert!(p.matches(date(2024, 2, 29), Granularity::Month));
        assert!(!p.matches(date(2024, 3, 1), Granularity::Month));
    }

    #[test]
    fn test_active_window_predicate_agrees_with_classifier() {
        let anchors = [
            (date(2024, 12, 30), Granularity::Week),
            (date(2025, 1, 1), Granularity::Week),
            (date(2025, 1, 1), Granularity::Month),
            (date(2025, 1, 31), Granularity::Month),
            (date(2025, 1, 15), Granularity::Day),
        ];
        for (d, g) in anchors {
            let it = item(1, 1, d, g);
            let mut now = at(2024, 12, 1, 0);
            while now < at(2025, 3, 1, 0) {
                assert_eq!(
                    ActiveWindowPredicate::at(now).matches(d, g),
                    is_active_today(&it, now),
                    "{d} {g} at {now}"
                );
                now += chrono::TimeDelta::hours(7);
            }
        }
    }

    #[test]
    fn test_active_today_limit_and_count() {
        let now = at(2025, 6, 18, 9);
        let items = vec![
            item(1, 1, date(2025, 6, 1), Granularity::Month),
            item(2, 1, date(2025, 6, 18), Granularity::Day),
            item(3, 1, date(2025, 6, 16), Granularity::Week),
            item(4, 1, date(2025, 6, 17), Granularity::Day),
        ];
        assert_eq!(active_today_count(&items, now), 3);
        assert_eq!(ids(&active_today(&items, now, 2)), vec![1, 3]);
    }

    #[test]
    fn test_completion_stats_and_history() {
        // Monday 2024-04-01; week and month start together.
        let now = at(2024, 4, 3, 12);
        let mut a = item(1, 1, date(2024, 4, 1), Granularity::Day);
        a.complete(at(2024, 4, 2, 8));
        let mut b = item(2, 1, date(2024, 3, 31), Granularity::Day);
        b.complete(at(2024, 3, 31, 22));
        let mut c = item(3, 1, date(2024, 4, 1), Granularity::Week);
        c.complete(at(2024, 4, 3, 7));
        let pending = item(4, 1, date(2024, 4, 3), Granularity::Day);

        let items = vec![a, b, c, pending];
        let stats = completion_stats(&items, now);
        assert_eq!(stats, CompletionStats { this_week: 2, this_month: 2 });

        assert_eq!(ids(&history(&items)), vec![3, 1, 2]);
    }
}

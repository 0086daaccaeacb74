//! Notification scheduler — the loop that sends the daily reminders.
//!
//! Every tick formats the local time as `HH:MM`, asks the store which users
//! want a reminder at that minute, and for each one that has something due
//! sends a push (one per registered endpoint) and a digest email. Channels
//! and users are isolated: a failed send is logged and the tick moves on.
//!
//! Lifecycle is `Idle → Running → Stopped`. Stopping is cooperative: the
//! token is checked between ticks, so a tick already in progress finishes
//! its user loop first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use readwell_calendar::{Clock, classify_item};
use readwell_core::{NotificationTarget, ReadwellError, Result, ScheduledItem};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::dispatch::{EmailSender, PushSender};
use crate::notify::{DailyDigest, PushPayload};
use crate::store::NotificationStore;

/// Where the scheduler is in its one-way lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    /// Built but not started.
    Idle,
    /// Loop spawned and ticking.
    Running,
    /// Loop exited; cannot be restarted.
    Stopped,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Targets returned for this minute.
    pub matched: usize,
    /// Users that got at least one successful delivery.
    pub notified: usize,
    /// Successful push deliveries, counted per endpoint.
    pub push_sent: usize,
    pub email_sent: usize,
    /// Store errors plus failed sends. Gone endpoints are not failures.
    pub failures: usize,
    /// Subscriptions deleted after the push service reported them gone.
    pub stale_removed: usize,
}

/// Polls the store once per tick and sends each due user at most one
/// reminder per local day.
pub struct NotificationScheduler {
    store: Arc<dyn NotificationStore>,
    clock: Arc<dyn Clock>,
    push: Option<Arc<dyn PushSender>>,
    email: Option<Arc<dyn EmailSender>>,
    hostname: String,
    tick_interval: Duration,
    state: Mutex<SchedulerState>,
    /// Local date each user was last notified. Process-local, lost on restart.
    last_sent: DashMap<i64, NaiveDate>,
}

impl NotificationScheduler {
    /// A scheduler with no channels, a 60 second tick, and `localhost` as the
    /// link host. Add senders with [`with_push`](Self::with_push) and
    /// [`with_email`](Self::with_email).
    pub fn new(store: Arc<dyn NotificationStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            push: None,
            email: None,
            hostname: "localhost".into(),
            tick_interval: Duration::from_secs(60),
            state: Mutex::new(SchedulerState::Idle),
            last_sent: DashMap::new(),
        }
    }

    pub fn with_push(mut self, sender: Arc<dyn PushSender>) -> Self {
        self.push = Some(sender);
        self
    }

    pub fn with_email(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.email = Some(sender);
        self
    }

    /// Host used for icon and dashboard links.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Spawn the polling loop. The first tick fires one interval from now.
    pub fn start(self: &Arc<Self>) -> Result<SchedulerHandle> {
        if self.tick_interval.is_zero() {
            return Err(ReadwellError::Scheduler("tick interval must be > 0".into()));
        }
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != SchedulerState::Idle {
                return Err(ReadwellError::Scheduler(format!(
                    "cannot start scheduler in state {:?}",
                    *state
                )));
            }
            *state = SchedulerState::Running;
        }

        if self.push.is_none() && self.email.is_none() {
            tracing::warn!("⚠️ No push or email sender configured; reminders cannot be delivered");
        }
        tracing::info!(
            "⏰ Notification scheduler started (check every {}s)",
            self.tick_interval.as_secs()
        );

        let cancel = CancellationToken::new();
        let scheduler = Arc::clone(self);
        let token = cancel.clone();
        let task = tokio::spawn(async move { scheduler.run_loop(token).await });

        Ok(SchedulerHandle { cancel, task })
    }

    async fn run_loop(&self, cancel: CancellationToken) {
        let period = self.tick_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.run_tick().await;
                    if report.matched > 0 {
                        tracing::info!(
                            "📣 Tick: {} matched, {} notified, {} push, {} email, {} failed, {} stale removed",
                            report.matched,
                            report.notified,
                            report.push_sent,
                            report.email_sent,
                            report.failures,
                            report.stale_removed
                        );
                    }
                }
            }
        }

        self.set_state(SchedulerState::Stopped);
        tracing::info!("⏹️ Notification scheduler stopped");
    }

    /// One pass over every user whose reminder time is the current minute.
    pub async fn run_tick(&self) -> TickReport {
        let now = self.clock.now();
        let time_of_day = now.format("%H:%M").to_string();
        let mut report = TickReport::default();

        let targets = match self.store.find_due_targets(&time_of_day).await {
            Ok(targets) => targets,
            Err(e) => {
                tracing::error!("❌ Failed to load notification targets for {time_of_day}: {e}");
                report.failures += 1;
                return report;
            }
        };
        report.matched = targets.len();

        let today = now.date();
        self.last_sent.retain(|_, sent| *sent == today);

        for target in targets.iter().filter(|t| t.any_channel_enabled()) {
            if self.already_sent(target.user_id, today) {
                tracing::debug!("⏭️ User {} already notified today", target.user_id);
                continue;
            }
            self.notify_user(target, now, &mut report).await;
        }

        report
    }

    fn already_sent(&self, user_id: i64, today: NaiveDate) -> bool {
        self.last_sent
            .get(&user_id)
            .is_some_and(|sent| *sent == today)
    }

    async fn notify_user(&self, target: &NotificationTarget, now: NaiveDateTime, report: &mut TickReport) {
        let items = match self.store.find_active_items(target.user_id).await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!("❌ Failed to load readings for user {}: {e}", target.user_id);
                report.failures += 1;
                return;
            }
        };

        let due: Vec<ScheduledItem> = items
            .into_iter()
            .filter(|item| item.is_pending() && classify_item(item, now).is_due())
            .collect();
        if due.is_empty() {
            tracing::debug!("📭 Nothing due for user {}", target.user_id);
            return;
        }

        let mut attempted = false;
        let mut delivered = false;

        if target.push_enabled {
            if let Some(push) = &self.push {
                let (tried, sent) = self.send_push(push.as_ref(), target, report).await;
                attempted |= tried;
                delivered |= sent;
            }
        }

        if target.email_enabled {
            if let Some(email) = &self.email {
                attempted = true;
                let titles = match self.store.plan_titles(target.user_id).await {
                    Ok(titles) => titles,
                    Err(e) => {
                        tracing::warn!("⚠️ Failed to load plan titles for user {}: {e}", target.user_id);
                        HashMap::new()
                    }
                };
                let digest = DailyDigest::build(target, &due, &titles, now, &self.hostname);
                match email.send_digest(target, &digest).await {
                    Ok(()) => {
                        report.email_sent += 1;
                        delivered = true;
                        tracing::debug!("📧 Digest sent to user {}", target.user_id);
                    }
                    Err(e) => {
                        report.failures += 1;
                        tracing::warn!(
                            "⚠️ {} digest failed for user {}: {e}",
                            email.name(),
                            target.user_id
                        );
                    }
                }
            }
        }

        if attempted {
            self.last_sent.insert(target.user_id, now.date());
        }
        if delivered {
            report.notified += 1;
        }
    }

    /// Returns `(attempted, delivered)`.
    async fn send_push(
        &self,
        push: &dyn PushSender,
        target: &NotificationTarget,
        report: &mut TickReport,
    ) -> (bool, bool) {
        let subscriptions = match self.store.push_subscriptions(target.user_id).await {
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!("❌ Failed to load push subscriptions for user {}: {e}", target.user_id);
                report.failures += 1;
                return (false, false);
            }
        };
        if subscriptions.is_empty() {
            return (false, false);
        }

        let payload = PushPayload::daily(&self.hostname);
        let mut delivered = false;
        for subscription in &subscriptions {
            match push.send(subscription, &payload).await {
                Ok(()) => {
                    report.push_sent += 1;
                    delivered = true;
                }
                Err(e) if e.is_gone() => {
                    tracing::info!(
                        "🧹 Push subscription {} for user {} is gone, removing",
                        subscription.id,
                        target.user_id
                    );
                    match self.store.delete_subscription(subscription.id).await {
                        Ok(()) => report.stale_removed += 1,
                        Err(e) => tracing::error!(
                            "❌ Failed to delete push subscription {}: {e}",
                            subscription.id
                        ),
                    }
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(
                        "⚠️ {} push failed for user {}: {e}",
                        push.name(),
                        target.user_id
                    );
                }
            }
        }
        (true, delivered)
    }
}

/// Owner of a running scheduler loop.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Cancel and wait for the loop to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!("❌ Scheduler task ended abnormally: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchError;
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use readwell_calendar::FixedClock;
    use readwell_core::{Granularity, PushSubscription};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryStore {
        targets: Vec<NotificationTarget>,
        items: Mutex<Vec<ScheduledItem>>,
        subscriptions: Mutex<Vec<PushSubscription>>,
        broken_users: Vec<i64>,
    }

    #[async_trait]
    impl NotificationStore for MemoryStore {
        async fn find_due_targets(&self, time_of_day: &str) -> Result<Vec<NotificationTarget>> {
            Ok(self
                .targets
                .iter()
                .filter(|t| t.local_time_of_day == time_of_day && t.any_channel_enabled())
                .cloned()
                .collect())
        }

        async fn find_active_items(&self, user_id: i64) -> Result<Vec<ScheduledItem>> {
            if self.broken_users.contains(&user_id) {
                return Err(ReadwellError::Database("connection reset".into()));
            }
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .filter(|i| i.parent_id == user_id && i.is_pending())
                .cloned()
                .collect())
        }

        async fn push_subscriptions(&self, user_id: i64) -> Result<Vec<PushSubscription>> {
            Ok(self
                .subscriptions
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn delete_subscription(&self, subscription_id: i64) -> Result<()> {
            self.subscriptions
                .lock()
                .unwrap()
                .retain(|s| s.id != subscription_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingPush {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl PushSender for CountingPush {
        fn name(&self) -> &str {
            "test-push"
        }

        async fn send(&self, sub: &PushSubscription, _: &PushPayload) -> std::result::Result<(), DispatchError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if sub.endpoint.contains("gone") {
                Err(DispatchError::Gone)
            } else if sub.endpoint.contains("down") {
                Err(DispatchError::Rejected { status: 503 })
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct CountingEmail {
        sent: AtomicUsize,
        fail_for: Vec<i64>,
    }

    #[async_trait]
    impl EmailSender for CountingEmail {
        fn name(&self) -> &str {
            "test-email"
        }

        async fn send_digest(&self, target: &NotificationTarget, _: &DailyDigest) -> std::result::Result<(), DispatchError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail_for.contains(&target.user_id) {
                Err(DispatchError::Transport("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seven_am() -> NaiveDateTime {
        date(2025, 6, 18).and_hms_opt(7, 0, 20).unwrap()
    }

    fn target(user_id: i64, push: bool, email: bool) -> NotificationTarget {
        NotificationTarget {
            user_id,
            name: format!("user{user_id}"),
            email: format!("user{user_id}@example.com"),
            local_time_of_day: "07:00".into(),
            push_enabled: push,
            email_enabled: email,
            email_override: None,
        }
    }

    fn subscription(id: i64, user_id: i64, endpoint: &str) -> PushSubscription {
        PushSubscription {
            id,
            user_id,
            endpoint: endpoint.into(),
            p256dh: "key".into(),
            auth: "auth".into(),
        }
    }

    // Items are keyed to users through parent_id to keep the fake store small.
    fn overdue_item(id: i64, user_id: i64) -> ScheduledItem {
        ScheduledItem::pending(id, user_id, date(2025, 6, 10), Granularity::Day, "Genesis 1")
    }

    struct Harness {
        store: Arc<MemoryStore>,
        push: Arc<CountingPush>,
        email: Arc<CountingEmail>,
        clock: Arc<FixedClock>,
        scheduler: Arc<NotificationScheduler>,
    }

    fn harness(store: MemoryStore, email: CountingEmail) -> Harness {
        let store = Arc::new(store);
        let push = Arc::new(CountingPush::default());
        let email = Arc::new(email);
        let clock = Arc::new(FixedClock::new(seven_am()));
        let scheduler = Arc::new(
            NotificationScheduler::new(store.clone(), clock.clone())
                .with_push(push.clone())
                .with_email(email.clone())
                .with_hostname("read.example.com"),
        );
        Harness { store, push, email, clock, scheduler }
    }

    #[tokio::test]
    async fn test_user_with_nothing_due_gets_no_dispatch() {
        let store = MemoryStore {
            targets: vec![target(1, true, true)],
            items: Mutex::new(vec![ScheduledItem::pending(
                1,
                1,
                date(2025, 7, 1),
                Granularity::Day,
                "future",
            )]),
            subscriptions: Mutex::new(vec![subscription(1, 1, "https://push/ok")]),
            ..Default::default()
        };
        let h = harness(store, CountingEmail::default());

        let report = h.scheduler.run_tick().await;
        assert_eq!(report.matched, 1);
        assert_eq!(report.notified, 0);
        assert_eq!(h.push.sent.load(Ordering::SeqCst), 0);
        assert_eq!(h.email.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_overdue_user_gets_one_push_and_one_email() {
        let store = MemoryStore {
            targets: vec![target(1, true, true)],
            items: Mutex::new(vec![overdue_item(1, 1), overdue_item(2, 1)]),
            subscriptions: Mutex::new(vec![subscription(1, 1, "https://push/ok")]),
            ..Default::default()
        };
        let h = harness(store, CountingEmail::default());

        let report = h.scheduler.run_tick().await;
        assert_eq!(h.push.sent.load(Ordering::SeqCst), 1);
        assert_eq!(h.email.sent.load(Ordering::SeqCst), 1);
        assert_eq!(report.notified, 1);
        assert_eq!(report.push_sent, 1);
        assert_eq!(report.email_sent, 1);
        assert_eq!(report.failures, 0);
    }

    #[tokio::test]
    async fn test_other_minute_matches_nobody() {
        let store = MemoryStore {
            targets: vec![target(1, true, true)],
            items: Mutex::new(vec![overdue_item(1, 1)]),
            ..Default::default()
        };
        let h = harness(store, CountingEmail::default());
        h.clock.advance(TimeDelta::minutes(1));

        let report = h.scheduler.run_tick().await;
        assert_eq!(report, TickReport::default());
    }

    #[tokio::test]
    async fn test_gone_subscription_is_deleted() {
        let store = MemoryStore {
            targets: vec![target(1, true, false)],
            items: Mutex::new(vec![overdue_item(1, 1)]),
            subscriptions: Mutex::new(vec![
                subscription(10, 1, "https://push/gone"),
                subscription(11, 1, "https://push/ok"),
            ]),
            ..Default::default()
        };
        let h = harness(store, CountingEmail::default());

        let report = h.scheduler.run_tick().await;
        assert_eq!(report.stale_removed, 1);
        assert_eq!(report.push_sent, 1);
        let remaining: Vec<i64> = h
            .store
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(remaining, vec![11]);
    }

    #[tokio::test]
    async fn test_push_failure_does_not_block_email() {
        let store = MemoryStore {
            targets: vec![target(1, true, true)],
            items: Mutex::new(vec![overdue_item(1, 1)]),
            subscriptions: Mutex::new(vec![subscription(10, 1, "https://push/down")]),
            ..Default::default()
        };
        let h = harness(store, CountingEmail::default());

        let report = h.scheduler.run_tick().await;
        assert_eq!(report.failures, 1);
        assert_eq!(report.email_sent, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(h.store.subscriptions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_one_user_failing_does_not_stop_others() {
        let store = MemoryStore {
            targets: vec![target(1, false, true), target(2, false, true), target(3, false, true)],
            items: Mutex::new(vec![overdue_item(1, 1), overdue_item(2, 2), overdue_item(3, 3)]),
            broken_users: vec![1],
            ..Default::default()
        };
        let email = CountingEmail {
            fail_for: vec![2],
            ..Default::default()
        };
        let h = harness(store, email);

        let report = h.scheduler.run_tick().await;
        assert_eq!(report.matched, 3);
        assert_eq!(report.failures, 2);
        assert_eq!(report.email_sent, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(h.email.sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_at_most_once_per_day() {
        let store = MemoryStore {
            targets: vec![target(1, false, true)],
            items: Mutex::new(vec![overdue_item(1, 1)]),
            ..Default::default()
        };
        let h = harness(store, CountingEmail::default());

        assert_eq!(h.scheduler.run_tick().await.email_sent, 1);
        h.clock.advance(TimeDelta::seconds(30));
        assert_eq!(h.scheduler.run_tick().await.email_sent, 0);

        h.clock.advance(TimeDelta::days(1) - TimeDelta::seconds(30));
        assert_eq!(h.scheduler.run_tick().await.email_sent, 1);
        assert_eq!(h.email.sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sent_marks_from_previous_days_are_dropped() {
        let store = MemoryStore {
            targets: vec![target(1, false, true), target(2, false, true)],
            items: Mutex::new(vec![overdue_item(1, 1), overdue_item(2, 2)]),
            ..Default::default()
        };
        let h = harness(store, CountingEmail::default());

        assert_eq!(h.scheduler.run_tick().await.notified, 2);
        assert_eq!(h.scheduler.last_sent.len(), 2);

        h.store.items.lock().unwrap().retain(|i| i.parent_id != 2);
        h.clock.advance(TimeDelta::days(1));
        assert_eq!(h.scheduler.run_tick().await.notified, 1);

        let today = h.clock.now().date();
        assert_eq!(h.scheduler.last_sent.len(), 1);
        assert!(h.scheduler.last_sent.get(&1).is_some_and(|d| *d == today));
        assert!(h.scheduler.last_sent.get(&2).is_none());
    }

    #[tokio::test]
    async fn test_completed_items_are_not_due() {
        let mut done = overdue_item(1, 1);
        done.complete(seven_am());
        let store = MemoryStore {
            targets: vec![target(1, false, true)],
            items: Mutex::new(vec![done]),
            ..Default::default()
        };
        let h = harness(store, CountingEmail::default());
        assert_eq!(h.scheduler.run_tick().await.email_sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_ticks_after_one_interval_and_stops() {
        let store = MemoryStore {
            targets: vec![target(1, false, true)],
            items: Mutex::new(vec![overdue_item(1, 1)]),
            ..Default::default()
        };
        let h = harness(store, CountingEmail::default());
        assert_eq!(h.scheduler.state(), SchedulerState::Idle);

        let handle = h.scheduler.start().unwrap();
        assert_eq!(h.scheduler.state(), SchedulerState::Running);
        assert!(h.scheduler.start().is_err());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.email.sent.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(h.email.sent.load(Ordering::SeqCst), 1);

        handle.stop().await;
        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
        assert!(h.scheduler.start().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_tick_sends_nothing() {
        let store = MemoryStore {
            targets: vec![target(1, false, true)],
            items: Mutex::new(vec![overdue_item(1, 1)]),
            ..Default::default()
        };
        let h = harness(store, CountingEmail::default());

        let handle = h.scheduler.start().unwrap();
        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.email.sent.load(Ordering::SeqCst), 0);
        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
    }
}

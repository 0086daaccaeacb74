//! SQLite-backed persistence for users, plans, readings, and push subscriptions.
//!
//! Dates are stored as `YYYY-MM-DD` text so range filters compare correctly
//! as strings.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use readwell_calendar::{ImportLimits, ItemDraft, WindowedQueryPredicate, check_content};
use readwell_core::{
    Granularity, ItemStatus, NotificationTarget, PushSubscription, ReadwellError, Result,
    ScheduledItem, User,
};
use rusqlite::{Connection, OptionalExtension, params};

use crate::store::NotificationStore;

pub const MAX_SUBSCRIPTIONS_PER_USER: usize = 10;

const DATE_FMT: &str = "%Y-%m-%d";
const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S%.f";

const ITEM_COLUMNS: &str =
    "r.id, r.plan_id, r.date, r.granularity, r.content, r.status, r.completed_at";

fn db_err(e: rusqlite::Error) -> ReadwellError {
    ReadwellError::Database(e.to_string())
}

/// Reading plan store.
pub struct ReadingDb {
    conn: Mutex<Connection>,
}

impl ReadingDb {
    /// Open or create the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ReadwellError::Database(e.to_string()))
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                notification_time TEXT NOT NULL DEFAULT '',   -- HH:MM or ''
                push_enabled INTEGER NOT NULL DEFAULT 0,
                email_enabled INTEGER NOT NULL DEFAULT 0,
                notification_email TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_users_notification_time
                ON users(notification_time);

            CREATE TABLE IF NOT EXISTS plans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                plan_id INTEGER NOT NULL REFERENCES plans(id) ON DELETE CASCADE,
                date TEXT NOT NULL,                 -- YYYY-MM-DD
                granularity TEXT NOT NULL,          -- 'day', 'week', 'month'
                content TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                completed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_readings_plan ON readings(plan_id);
            CREATE INDEX IF NOT EXISTS idx_readings_status_date ON readings(status, date);

            CREATE TABLE IF NOT EXISTS push_subscriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                endpoint TEXT NOT NULL UNIQUE,
                p256dh TEXT NOT NULL,
                auth TEXT NOT NULL
            );
         ",
            )
            .map_err(|e| ReadwellError::Database(format!("migration: {e}")))
    }

    // ─── Users ────────────────────────────────────────────────

    pub fn upsert_user(&self, user: &User) -> Result<()> {
        user.validate()?;
        self.conn()?
            .execute(
                "INSERT INTO users (id, name, email, notification_time, push_enabled, email_enabled, notification_email)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    email = excluded.email,
                    notification_time = excluded.notification_time,
                    push_enabled = excluded.push_enabled,
                    email_enabled = excluded.email_enabled,
                    notification_email = excluded.notification_email",
                params![
                    user.id,
                    user.name,
                    user.email,
                    user.notification_time,
                    user.push_enabled,
                    user.email_enabled,
                    user.notification_email,
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.conn()?
            .query_row(
                "SELECT id, name, email, notification_time, push_enabled, email_enabled, notification_email
                 FROM users WHERE id = ?1",
                [id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        notification_time: row.get(3)?,
                        push_enabled: row.get(4)?,
                        email_enabled: row.get(5)?,
                        notification_email: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)
    }

    // ─── Plans & readings ─────────────────────────────────────

    /// Create a plan and all of its readings in one transaction.
    /// Returns the plan id and the stored items.
    pub fn create_plan_with_items(
        &self,
        user_id: i64,
        title: &str,
        drafts: Vec<ItemDraft>,
        created_at: NaiveDateTime,
    ) -> Result<(i64, Vec<ScheduledItem>)> {
        if title.trim().is_empty() {
            return Err(ReadwellError::Validation("plan title is required".into()));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute(
            "INSERT INTO plans (user_id, title, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, title.trim(), created_at.format(TIMESTAMP_FMT).to_string()],
        )
        .map_err(db_err)?;
        let plan_id = tx.last_insert_rowid();

        let mut items = Vec::with_capacity(drafts.len());
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO readings (plan_id, date, granularity, content, status)
                     VALUES (?1, ?2, ?3, ?4, 'pending')",
                )
                .map_err(db_err)?;
            for draft in drafts {
                stmt.execute(params![
                    plan_id,
                    draft.date.format(DATE_FMT).to_string(),
                    draft.granularity.as_str(),
                    draft.content,
                ])
                .map_err(db_err)?;
                items.push(draft.into_item(tx.last_insert_rowid(), plan_id));
            }
        }

        tx.commit().map_err(db_err)?;
        tracing::info!("📚 Plan {plan_id} '{}' created with {} readings", title.trim(), items.len());
        Ok((plan_id, items))
    }

    /// Every reading the user owns, oldest first.
    pub fn user_items(&self, user_id: i64) -> Result<Vec<ScheduledItem>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM readings r JOIN plans p ON p.id = r.plan_id
                 WHERE p.user_id = ?1 ORDER BY r.date, r.id"
            ),
            params![user_id],
        )
    }

    /// Pending readings that could be active or overdue at `now`.
    pub fn dashboard_candidates(&self, user_id: i64, now: NaiveDateTime) -> Result<Vec<ScheduledItem>> {
        let bounds = WindowedQueryPredicate::at(now);
        let bound = |g: Granularity| bounds.date_bound(g).format(DATE_FMT).to_string();
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM readings r JOIN plans p ON p.id = r.plan_id
                 WHERE p.user_id = ?1 AND r.status = 'pending' AND (
                    (r.granularity = 'day' AND r.date <= ?2) OR
                    (r.granularity = 'week' AND r.date <= ?3) OR
                    (r.granularity = 'month' AND r.date <= ?4))
                 ORDER BY r.date, r.id"
            ),
            params![
                user_id,
                bound(Granularity::Day),
                bound(Granularity::Week),
                bound(Granularity::Month),
            ],
        )
    }

    /// Completed readings, most recently completed first.
    pub fn completed_items(&self, user_id: i64) -> Result<Vec<ScheduledItem>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM readings r JOIN plans p ON p.id = r.plan_id
                 WHERE p.user_id = ?1 AND r.status = 'completed'
                 ORDER BY r.completed_at DESC, r.id DESC"
            ),
            params![user_id],
        )
    }

    pub fn complete_item(&self, user_id: i64, item_id: i64, at: NaiveDateTime) -> Result<ScheduledItem> {
        let mut item = self.owned_item(user_id, item_id)?;
        item.complete(at);
        self.save_status(&item)?;
        Ok(item)
    }

    pub fn reopen_item(&self, user_id: i64, item_id: i64) -> Result<ScheduledItem> {
        let mut item = self.owned_item(user_id, item_id)?;
        item.reopen();
        self.save_status(&item)?;
        Ok(item)
    }

    /// Replace a reading's text. Status and completion time are kept.
    pub fn edit_item(
        &self,
        user_id: i64,
        item_id: i64,
        content: &str,
        limits: &ImportLimits,
    ) -> Result<ScheduledItem> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ReadwellError::Validation("reading content is required".into()));
        }
        check_content(content, limits).map_err(|e| ReadwellError::Validation(e.to_string()))?;

        let mut item = self.owned_item(user_id, item_id)?;
        item.edit_content(content);
        self.conn()?
            .execute(
                "UPDATE readings SET content = ?1 WHERE id = ?2",
                params![item.content, item.id],
            )
            .map_err(db_err)?;
        tracing::debug!("✏️ Reading {item_id} edited");
        Ok(item)
    }

    fn owned_item(&self, user_id: i64, item_id: i64) -> Result<ScheduledItem> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM readings r JOIN plans p ON p.id = r.plan_id
                 WHERE p.user_id = ?1 AND r.id = ?2"
            ),
            params![user_id, item_id],
        )?
        .pop()
        .ok_or_else(|| ReadwellError::NotFound(format!("reading {item_id}")))
    }

    fn save_status(&self, item: &ScheduledItem) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE readings SET status = ?1, completed_at = ?2 WHERE id = ?3",
                params![
                    item.status().as_str(),
                    item.completed_at().map(|t| t.format(TIMESTAMP_FMT).to_string()),
                    item.id,
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn query_items(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<ScheduledItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(args, |row| {
                Ok(ItemRow {
                    id: row.get(0)?,
                    plan_id: row.get(1)?,
                    date: row.get(2)?,
                    granularity: row.get(3)?,
                    content: row.get(4)?,
                    status: row.get(5)?,
                    completed_at: row.get(6)?,
                })
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        rows.into_iter().map(ItemRow::into_item).collect()
    }

    // ─── Push subscriptions ───────────────────────────────────

    /// Register (or re-key) a push endpoint. Endpoints must be HTTPS and a
    /// user may hold at most [`MAX_SUBSCRIPTIONS_PER_USER`].
    pub fn add_subscription(
        &self,
        user_id: i64,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> Result<PushSubscription> {
        if !endpoint.starts_with("https://") {
            return Err(ReadwellError::Validation("push endpoint must use https".into()));
        }
        if p256dh.is_empty() || auth.is_empty() {
            return Err(ReadwellError::Validation("push keys are required".into()));
        }

        let conn = self.conn()?;
        let others: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM push_subscriptions WHERE user_id = ?1 AND endpoint != ?2",
                params![user_id, endpoint],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        if others as usize >= MAX_SUBSCRIPTIONS_PER_USER {
            return Err(ReadwellError::Validation(format!(
                "at most {MAX_SUBSCRIPTIONS_PER_USER} push subscriptions per user"
            )));
        }

        let id = conn
            .query_row(
                "INSERT INTO push_subscriptions (user_id, endpoint, p256dh, auth)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(endpoint) DO UPDATE SET
                    user_id = excluded.user_id, p256dh = excluded.p256dh, auth = excluded.auth
                 RETURNING id",
                params![user_id, endpoint, p256dh, auth],
                |r| r.get(0),
            )
            .map_err(db_err)?;

        Ok(PushSubscription {
            id,
            user_id,
            endpoint: endpoint.to_string(),
            p256dh: p256dh.to_string(),
            auth: auth.to_string(),
        })
    }

    fn load_subscriptions(&self, user_id: i64) -> Result<Vec<PushSubscription>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, endpoint, p256dh, auth FROM push_subscriptions
                 WHERE user_id = ?1 ORDER BY id",
            )
            .map_err(db_err)?;
        stmt.query_map([user_id], |row| {
            Ok(PushSubscription {
                id: row.get(0)?,
                user_id: row.get(1)?,
                endpoint: row.get(2)?,
                p256dh: row.get(3)?,
                auth: row.get(4)?,
            })
        })
        .map_err(db_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db_err)
    }

    fn load_due_targets(&self, time_of_day: &str) -> Result<Vec<NotificationTarget>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, email, notification_time, push_enabled, email_enabled, notification_email
                 FROM users
                 WHERE notification_time = ?1 AND (push_enabled = 1 OR email_enabled = 1)
                 ORDER BY id",
            )
            .map_err(db_err)?;
        stmt.query_map([time_of_day], |row| {
            Ok(NotificationTarget {
                user_id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                local_time_of_day: row.get(3)?,
                push_enabled: row.get(4)?,
                email_enabled: row.get(5)?,
                email_override: row.get(6)?,
            })
        })
        .map_err(db_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db_err)
    }
}

#[async_trait]
impl NotificationStore for ReadingDb {
    async fn find_due_targets(&self, time_of_day: &str) -> Result<Vec<NotificationTarget>> {
        self.load_due_targets(time_of_day)
    }

    async fn find_active_items(&self, user_id: i64) -> Result<Vec<ScheduledItem>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM readings r JOIN plans p ON p.id = r.plan_id
                 WHERE p.user_id = ?1 AND r.status = 'pending' ORDER BY r.date, r.id"
            ),
            params![user_id],
        )
    }

    async fn push_subscriptions(&self, user_id: i64) -> Result<Vec<PushSubscription>> {
        self.load_subscriptions(user_id)
    }

    async fn delete_subscription(&self, subscription_id: i64) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM push_subscriptions WHERE id = ?1", [subscription_id])
            .map_err(db_err)?;
        Ok(())
    }

    async fn plan_titles(&self, user_id: i64) -> Result<HashMap<i64, String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, title FROM plans WHERE user_id = ?1")
            .map_err(db_err)?;
        let titles = stmt
            .query_map([user_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(db_err)?
            .collect::<rusqlite::Result<HashMap<i64, String>>>()
            .map_err(db_err)?;
        Ok(titles)
    }
}

struct ItemRow {
    id: i64,
    plan_id: i64,
    date: String,
    granularity: String,
    content: String,
    status: String,
    completed_at: Option<String>,
}

impl ItemRow {
    fn into_item(self) -> Result<ScheduledItem> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FMT).map_err(|e| {
            ReadwellError::Database(format!("reading {}: bad date '{}': {e}", self.id, self.date))
        })?;
        let completed_at = self
            .completed_at
            .as_deref()
            .map(|ts| NaiveDateTime::parse_from_str(ts, TIMESTAMP_FMT))
            .transpose()
            .map_err(|e| ReadwellError::Database(format!("reading {}: bad completed_at: {e}", self.id)))?;
        ScheduledItem::restore(
            self.id,
            self.plan_id,
            date,
            self.granularity.parse()?,
            self.content,
            self.status.parse::<ItemStatus>()?,
            completed_at,
        )
    }
}

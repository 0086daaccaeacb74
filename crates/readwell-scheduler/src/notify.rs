//! Notification payloads — the push message and the daily digest email.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::NaiveDateTime;
use readwell_calendar::{is_overdue, long_date};
use readwell_core::{NotificationTarget, ScheduledItem};
use serde::Serialize;

pub const DIGEST_SUBJECT: &str = "Your readings for today";

const APP_NAME: &str = "Readwell";

/// Body of a web push message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Path opened when the notification is clicked.
    pub url: String,
}

impl PushPayload {
    /// The once-a-day "readings due" reminder.
    pub fn daily(hostname: &str) -> Self {
        Self {
            title: APP_NAME.into(),
            body: "You have readings due today!".into(),
            icon: format!("https://{hostname}/static/icon-192.png"),
            badge: format!("https://{hostname}/static/badge-128.png"),
            url: "/".into(),
        }
    }

    /// Wire form expected by the service worker (`data.url` nested).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "title": self.title,
            "body": self.body,
            "icon": self.icon,
            "badge": self.badge,
            "data": { "url": self.url },
        })
    }
}

/// One reading in the digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestEntry {
    /// Title of the plan the reading belongs to; empty when unknown.
    pub plan_title: String,
    pub content: String,
    /// e.g. "January 5, 2025"
    pub date: String,
    pub overdue: bool,
}

/// Daily digest email for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyDigest {
    pub user_name: String,
    pub entries: Vec<DigestEntry>,
    pub overdue_count: usize,
    pub dashboard_url: String,
    pub settings_url: String,
}

impl DailyDigest {
    /// Build from the user's due items, oldest first. `plan_titles` maps
    /// `parent_id` to the plan's title.
    pub fn build(
        target: &NotificationTarget,
        items: &[ScheduledItem],
        plan_titles: &HashMap<i64, String>,
        now: NaiveDateTime,
        hostname: &str,
    ) -> Self {
        let mut sorted: Vec<&ScheduledItem> = items.iter().collect();
        sorted.sort_by_key(|i| i.date);

        let entries: Vec<DigestEntry> = sorted
            .into_iter()
            .map(|item| DigestEntry {
                plan_title: plan_titles.get(&item.parent_id).cloned().unwrap_or_default(),
                content: item.content.clone(),
                date: long_date(item.date),
                overdue: is_overdue(item, now),
            })
            .collect();
        let overdue_count = entries.iter().filter(|e| e.overdue).count();

        Self {
            user_name: target.name.clone(),
            entries,
            overdue_count,
            dashboard_url: format!("https://{hostname}/dashboard"),
            settings_url: format!("https://{hostname}/account"),
        }
    }

    pub fn subject(&self) -> &'static str {
        DIGEST_SUBJECT
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{APP_NAME} - Your Daily Readings\n");
        let _ = writeln!(out, "Hi {},\n", self.user_name);
        let _ = writeln!(out, "Here are your readings for today:");
        if self.overdue_count > 0 {
            let _ = writeln!(out, "\nYou have {} overdue reading(s)", self.overdue_count);
        }
        for entry in &self.entries {
            let flag = if entry.overdue { " [OVERDUE]" } else { "" };
            let _ = writeln!(out, "\n---\n{}{flag}\n{}\n{}", entry.plan_title, entry.content, entry.date);
        }
        let _ = writeln!(out, "---\n");
        let _ = writeln!(out, "View your dashboard: {}\n", self.dashboard_url);
        let _ = write!(out, "Manage notifications: {}", self.settings_url);
        out
    }

    pub fn render_html(&self) -> String {
        let mut out = String::from(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"></head>\n\
             <body style=\"background-color: #faf8f5; font-family: Georgia, serif;\">\n",
        );
        let _ = writeln!(out, "<h1>{APP_NAME}</h1>");
        let _ = writeln!(
            out,
            "<p>Hi {}, here are your readings for today:</p>",
            escape_html(&self.user_name)
        );
        if self.overdue_count > 0 {
            let _ = writeln!(
                out,
                "<p style=\"color: #856404;\">You have {} overdue reading(s)</p>",
                self.overdue_count
            );
        }
        for entry in &self.entries {
            let border = if entry.overdue { "border-left: 4px solid #c44536;" } else { "" };
            let _ = writeln!(out, "<div style=\"background-color: #f0ede8; {border}\">");
            let _ = write!(out, "<h3>{}", escape_html(&entry.plan_title));
            if entry.overdue {
                let _ = write!(out, " <span style=\"color: #c44536;\">Overdue</span>");
            }
            let _ = writeln!(out, "</h3>");
            let _ = writeln!(out, "<p>{}</p>", escape_html(&entry.content));
            let _ = writeln!(out, "<p style=\"color: #6b6560;\">{}</p>", escape_html(&entry.date));
            let _ = writeln!(out, "</div>");
        }
        let _ = writeln!(
            out,
            "<p><a href=\"{}\">View Dashboard</a></p>",
            escape_html(&self.dashboard_url)
        );
        let _ = writeln!(
            out,
            "<p style=\"font-size: 12px;\">You're receiving this because you enabled email notifications.<br>\
             <a href=\"{}\">Manage notification settings</a></p>",
            escape_html(&self.settings_url)
        );
        out.push_str("</body>\n</html>\n");
        out
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

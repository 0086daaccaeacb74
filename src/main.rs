//! # Readwell — reading plan tracker
//!
//! Usage:
//!   readwell init                                    # Write ~/.readwell/config.toml
//!   readwell parse "2025-W07"                        # Show how a schedule date is read
//!   readwell user --id 1 --name Ada --email a@x.io --time 07:00 --email-digest
//!   readwell import --user 1 --title "Bible" plan.csv
//!   readwell dashboard --user 1                      # Today / overdue readings
//!   readwell complete --user 1 --item 42
//!   readwell edit --user 1 --item 42 --content "Psalm 1-3"
//!   readwell history --user 1
//!   readwell run                                     # Notification scheduler until Ctrl-C

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{Datelike, NaiveDateTime};
use clap::{Parser, Subcommand};
use readwell_calendar::{
    Clock, DateParser, FixedClock, ImportLimits, SystemClock, active_today, active_today_count,
    build_dashboard_view, completion_stats, dashboard_groups, date_label, history, parse_csv,
};
use readwell_channels::{HttpPushSender, SmtpDigestSender};
use readwell_core::{ReadwellConfig, ScheduledItem, User};
use readwell_scheduler::{NotificationScheduler, ReadingDb, UserCache};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "readwell", version, about = "📚 Readwell — reading plan tracker")]
struct Cli {
    /// Config file (default: ~/.readwell/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pretend the local time is "YYYY-MM-DD HH:MM"
    #[arg(long, global = true)]
    now: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a schedule date and print its granularity
    Parse {
        raw: String,
        /// Year that "Week n" refers to
        #[arg(long)]
        year: Option<i32>,
    },
    /// Create or update a user
    User {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Daily reminder time, HH:MM (empty disables)
        #[arg(long, default_value = "")]
        time: String,
        #[arg(long)]
        push: bool,
        #[arg(long)]
        email_digest: bool,
        /// Send the digest here instead of the account email
        #[arg(long)]
        digest_to: Option<String>,
    },
    /// Register a push endpoint for a user
    Subscribe {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        endpoint: String,
        #[arg(long)]
        p256dh: String,
        #[arg(long)]
        auth: String,
    },
    /// Import a CSV reading plan (header row, then date,reading)
    Import {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        title: String,
        file: PathBuf,
    },
    /// Show today's and overdue readings
    Dashboard {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        json: bool,
    },
    /// Mark a reading done
    Complete {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        item: i64,
    },
    /// Change a reading's text
    Edit {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        item: i64,
        #[arg(long)]
        content: String,
    },
    /// Mark a reading not done
    Reopen {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        item: i64,
    },
    /// Completed readings, newest first
    History {
        #[arg(long)]
        user: i64,
    },
    /// Run the notification scheduler until Ctrl-C
    Run,
    /// Print the effective configuration
    Config,
    /// Write a default config to ~/.readwell/config.toml
    Init,
}

/// Readings shown in the dashboard's "up next" line.
const DUE_NOW_LIMIT: usize = 5;

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn load_config(path: Option<&Path>) -> Result<ReadwellConfig> {
    let config = match path {
        Some(path) => ReadwellConfig::load_from(path)?,
        None => ReadwellConfig::load()?,
    };
    Ok(config)
}

fn make_clock(now: Option<&str>) -> Result<Arc<dyn Clock>> {
    match now {
        Some(raw) => {
            let at = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
                .with_context(|| format!("--now must be 'YYYY-MM-DD HH:MM', got '{raw}'"))?;
            Ok(Arc::new(FixedClock::new(at)))
        }
        None => Ok(Arc::new(SystemClock)),
    }
}

fn open_db(config: &ReadwellConfig) -> Result<ReadingDb> {
    let path = expand_path(&config.database.path);
    ReadingDb::open(&path).with_context(|| format!("opening {}", path.display()))
}

fn require_user(db: &ReadingDb, cache: &UserCache, id: i64) -> Result<User> {
    match cache.get_or_load(id, |id| db.get_user(id))? {
        Some(user) => Ok(user),
        None => bail!("no user with id {id}"),
    }
}

fn print_item(item: &ScheduledItem, marker: &str) {
    println!("  {marker} [{}] {:<28} {}", item.id, date_label(item), item.content);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "readwell=debug,readwell_scheduler=debug,readwell_channels=debug"
    } else {
        "readwell=info,readwell_scheduler=info,readwell_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let clock = make_clock(cli.now.as_deref())?;
    let cache = Arc::new(UserCache::from_config(&config.cache));

    match cli.command {
        Command::Parse { raw, year } => {
            let parser = year.map(DateParser::for_year).unwrap_or_default();
            let (date, granularity) = parser.parse(&raw)?;
            println!("{date} ({granularity})");
        }

        Command::User { id, name, email, time, push, email_digest, digest_to } => {
            let db = open_db(&config)?;
            let user = User {
                id,
                name,
                email,
                notification_time: time,
                push_enabled: push,
                email_enabled: email_digest,
                notification_email: digest_to,
            };
            db.upsert_user(&user)?;
            cache.invalidate(id);
            println!("✅ User {id} saved");
        }

        Command::Subscribe { user, endpoint, p256dh, auth } => {
            let db = open_db(&config)?;
            require_user(&db, &cache, user)?;
            let sub = db.add_subscription(user, &endpoint, &p256dh, &auth)?;
            println!("✅ Push subscription {} registered", sub.id);
        }

        Command::Import { user, title, file } => {
            let db = open_db(&config)?;
            require_user(&db, &cache, user)?;
            let input = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let parser = DateParser::for_year(clock.now().year());
            let drafts = parse_csv(&input, &parser, &ImportLimits::from(&config.import))?;
            let (plan_id, items) = db.create_plan_with_items(user, &title, drafts, clock.now())?;
            println!("✅ Plan {plan_id} '{title}' imported with {} readings", items.len());
        }

        Command::Dashboard { user, json } => {
            let db = open_db(&config)?;
            let account = require_user(&db, &cache, user)?;
            let now = clock.now();
            let candidates = db.dashboard_candidates(user, now)?;
            let view = build_dashboard_view(&candidates, now);
            let stats = completion_stats(&db.user_items(user)?, now);
            let due_now = active_today(&candidates, now, DUE_NOW_LIMIT);

            if json {
                let out = serde_json::json!({
                    "due_now": due_now,
                    "today": view.today,
                    "overdue": view.overdue,
                    "plans": dashboard_groups(&candidates, now),
                    "stats": stats,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }

            println!("📚 {} — {}", account.name, now.format("%A, %B %-d, %Y"));
            println!(
                "   {} due now, {} done this week, {} this month\n",
                active_today_count(&candidates, now),
                stats.this_week,
                stats.this_month
            );
            if view.is_empty() {
                println!("  Nothing due. 🎉");
            } else if !due_now.is_empty() {
                let next: Vec<&str> = due_now.iter().map(|i| i.content.as_str()).collect();
                println!("Up next: {}\n", next.join(" · "));
            }
            if !view.overdue.is_empty() {
                println!("Overdue:");
                view.overdue.iter().for_each(|i| print_item(i, "⚠️ "));
            }
            if !view.today.is_empty() {
                println!("Today:");
                view.today.iter().for_each(|i| print_item(i, "📖"));
            }
        }

        Command::Complete { user, item } => {
            let db = open_db(&config)?;
            let done = db.complete_item(user, item, clock.now())?;
            println!("✅ Completed: {}", done.content);
        }

        Command::Edit { user, item, content } => {
            let db = open_db(&config)?;
            let limits = ImportLimits::from(&config.import);
            let edited = db.edit_item(user, item, &content, &limits)?;
            println!("✏️  Updated [{}] {}", edited.id, edited.content);
        }

        Command::Reopen { user, item } => {
            let db = open_db(&config)?;
            let reopened = db.reopen_item(user, item)?;
            println!("↩️  Reopened: {}", reopened.content);
        }

        Command::History { user } => {
            let db = open_db(&config)?;
            require_user(&db, &cache, user)?;
            let done = history(&db.completed_items(user)?);
            if done.is_empty() {
                println!("No completed readings yet.");
            }
            for item in &done {
                let when = item
                    .completed_at()
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("  ✅ {when}  {:<28} {}", date_label(item), item.content);
            }
        }

        Command::Run => run(config, clock, cache).await?,

        Command::Config => {
            let mut shown = config.clone();
            if !shown.email.smtp_password.is_empty() {
                shown.email.smtp_password = "********".into();
            }
            println!("{}", toml::to_string_pretty(&shown)?);
        }

        Command::Init => {
            let path = ReadwellConfig::default_path();
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            ReadwellConfig::default().save()?;
            println!("✅ Wrote {}", path.display());
        }
    }

    Ok(())
}

async fn run(config: ReadwellConfig, clock: Arc<dyn Clock>, cache: Arc<UserCache>) -> Result<()> {
    let db = Arc::new(open_db(&config)?);

    let mut scheduler = NotificationScheduler::new(db, clock)
        .with_hostname(config.hostname.clone())
        .with_tick_interval(Duration::from_secs(config.scheduler.tick_interval_secs));
    if config.push.enabled {
        scheduler = scheduler.with_push(Arc::new(HttpPushSender::from_config(&config.push)));
    }
    if config.email.enabled() {
        scheduler = scheduler.with_email(Arc::new(SmtpDigestSender::from_config(&config.email)?));
    }
    let scheduler = Arc::new(scheduler);

    let sweeper_cancel = CancellationToken::new();
    let sweeper = cache.spawn_sweeper(
        Duration::from_secs(config.cache.sweep_interval_secs),
        sweeper_cancel.clone(),
    );
    let handle = scheduler.start()?;

    tracing::info!("🚀 Readwell running — press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    tracing::info!("🛑 Shutting down");

    handle.stop().await;
    sweeper_cancel.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!("⚠️ Cache sweeper ended abnormally: {e}");
    }
    Ok(())
}

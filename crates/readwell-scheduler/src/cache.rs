//! User cache — TTL-bounded snapshots of user records.
//!
//! Sits in front of the user lookup on the request path. A miss is never an
//! error; callers fall through to the store and `set` the result. Expired
//! entries are dropped on read and by a periodic sweep, so entries written
//! once and never read again do not accumulate.

use std::sync::Arc;

use dashmap::DashMap;
use readwell_core::User;
use readwell_core::config::CacheConfig;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

struct CachedUser {
    user: User,
    expires_at: Instant,
}

/// Concurrent user cache keyed by user id.
pub struct UserCache {
    entries: DashMap<i64, CachedUser>,
    ttl: Duration,
}

impl UserCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached snapshot, or `None` if absent or expired. An expired entry is
    /// removed on the way out.
    pub fn get(&self, id: i64) -> Option<User> {
        let now = Instant::now();
        match self.entries.get(&id) {
            Some(entry) if now <= entry.expires_at => return Some(entry.user.clone()),
            Some(_) => {}
            None => return None,
        }
        // Re-check under the shard lock: a concurrent `set` may have refreshed it.
        self.entries.remove_if(&id, |_, entry| now > entry.expires_at);
        None
    }

    /// Store or overwrite, restarting the TTL.
    pub fn set(&self, user: User) {
        let expires_at = Instant::now() + self.ttl;
        self.entries.insert(user.id, CachedUser { user, expires_at });
    }

    /// Read-through lookup: serve from cache, else `load` and remember the result.
    pub fn get_or_load<F>(&self, id: i64, load: F) -> readwell_core::Result<Option<User>>
    where
        F: FnOnce(i64) -> readwell_core::Result<Option<User>>,
    {
        if let Some(user) = self.get(id) {
            return Ok(Some(user));
        }
        let loaded = load(id)?;
        if let Some(user) = &loaded {
            self.set(user.clone());
        }
        Ok(loaded)
    }

    /// Drop the entry for `id`. Call after the underlying record changes.
    pub fn invalidate(&self, id: i64) {
        self.entries.remove(&id);
    }

    /// Remove every expired entry; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = now <= entry.expires_at;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `cancel` fires or
    /// the cache itself is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            tracing::debug!("🧹 User cache sweeper started (every {}s)", interval.as_secs());
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(cache) = cache.upgrade() else { break };
                        let removed = cache.sweep();
                        if removed > 0 {
                            tracing::debug!("🧹 Evicted {removed} expired user(s), {} cached", cache.len());
                        }
                    }
                }
            }
            tracing::debug!("🧹 User cache sweeper stopped");
        })
    }
}

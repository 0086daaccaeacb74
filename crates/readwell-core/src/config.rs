//! Readwell configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ReadwellError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadwellConfig {
    /// Public hostname used in notification links.
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

fn default_hostname() -> String { "localhost:8080".into() }

impl Default for ReadwellConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            cache: CacheConfig::default(),
            import: ImportConfig::default(),
            push: PushConfig::default(),
            email: EmailConfig::default(),
        }
    }
}

impl ReadwellConfig {
    /// Load config from the default path (~/.readwell/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::debug!("📄 No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReadwellError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            tracing::warn!("⚠️ Invalid config {}: {e}", path.display());
            ReadwellError::Config(format!("Failed to parse config: {e}"))
        })?;
        if let Err(e) = config.validate() {
            tracing::warn!("⚠️ Rejected config {}: {e}", path.display());
            return Err(e);
        }
        tracing::debug!("📄 Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| ReadwellError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Reject settings the scheduler or the mailer could not run with.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_interval_secs == 0 {
            return Err(ReadwellError::Config("scheduler.tick_interval_secs must be > 0".into()));
        }
        if self.cache.ttl_secs == 0 || self.cache.sweep_interval_secs == 0 {
            return Err(ReadwellError::Config(
                "cache.ttl_secs and cache.sweep_interval_secs must be > 0".into(),
            ));
        }

        match self.email.provider.to_lowercase().as_str() {
            "" => {}
            "smtp" => {
                if self.email.smtp_host.is_empty() {
                    return Err(ReadwellError::Config(
                        "email.smtp_host is required when email.provider is 'smtp'".into(),
                    ));
                }
                if self.email.smtp_from.is_empty() {
                    return Err(ReadwellError::Config(
                        "email.smtp_from is required when email.provider is 'smtp'".into(),
                    ));
                }
            }
            other => {
                return Err(ReadwellError::Config(format!(
                    "email.provider must be 'smtp' or empty, got '{other}'"
                )));
            }
        }

        match self.email.smtp_tls.to_lowercase().as_str() {
            "none" | "starttls" | "tls" => Ok(()),
            other => Err(ReadwellError::Config(format!(
                "email.smtp_tls must be 'none', 'starttls' or 'tls', got '{other}'"
            ))),
        }
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Readwell home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".readwell")
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.readwell/readwell.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// Notification scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

fn default_tick_interval() -> u64 { 60 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_interval_secs: default_tick_interval() }
    }
}

/// User cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_cache_ttl() -> u64 { 300 }
fn default_sweep_interval() -> u64 { 600 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// CSV import limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
}

fn default_max_rows() -> usize { 10_000 }
fn default_max_content_length() -> usize { 10_000 }

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            max_content_length: default_max_content_length(),
        }
    }
}

/// Push notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_push_topic")]
    pub topic: String,
    #[serde(default = "default_push_ttl")]
    pub ttl_secs: u64,
}

fn default_push_topic() -> String { "daily-reading".into() }
fn default_push_ttl() -> u64 { 60 * 60 * 24 * 7 }

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            topic: default_push_topic(),
            ttl_secs: default_push_ttl(),
        }
    }
}

/// Email digest configuration. An empty provider disables email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    /// e.g. "Readwell <noreply@example.com>"
    #[serde(default)]
    pub smtp_from: String,
    /// "none", "starttls" or "tls".
    #[serde(default = "default_smtp_tls")]
    pub smtp_tls: String,
}

fn default_smtp_port() -> u16 { 587 }
fn default_smtp_tls() -> String { "starttls".into() }

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            smtp_from: String::new(),
            smtp_tls: default_smtp_tls(),
        }
    }
}

impl EmailConfig {
    pub fn enabled(&self) -> bool {
        self.provider.eq_ignore_ascii_case("smtp")
    }
}

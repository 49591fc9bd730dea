//! Configuration management

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::controller::InfoLinks;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Bot configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token
    pub telegram_token: String,

    /// SQLite catalog path, parsed from DATABASE_URL
    pub database_path: PathBuf,

    /// Bound on each catalog call
    pub query_timeout: Duration,

    /// Airing-list cache TTL (zero disables the cache)
    pub airing_cache_ttl: Duration,

    /// Max messages per user per minute (zero disables throttling)
    pub rate_limit_per_minute: u32,

    /// Links appended to the channel/chat replies
    pub info_links: InfoLinks,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup (environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .with_context(|| format!("{} must be set", key))
        };
        let number = |key: &str, default: u64| -> Result<u64> {
            match lookup(key) {
                Some(v) if !v.trim().is_empty() => v
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a non-negative integer, got {:?}", key, v)),
                _ => Ok(default),
            }
        };
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let telegram_token = required("TELEGRAM_BOT_TOKEN")?;
        let database_path = parse_database_url(&required("DATABASE_URL")?)?;

        let query_timeout = Duration::from_millis(number("CATALOG_QUERY_TIMEOUT_MS", 5000)?);
        if query_timeout.is_zero() {
            bail!("CATALOG_QUERY_TIMEOUT_MS must be greater than zero");
        }

        let airing_cache_ttl = Duration::from_secs(number("AIRING_CACHE_TTL_SECS", 60)?);
        let rate_limit_per_minute = u32::try_from(number("RATE_LIMIT_PER_MINUTE", 20)?)
            .context("RATE_LIMIT_PER_MINUTE is too large")?;

        let log_format = match optional("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => bail!("LOG_FORMAT must be 'pretty' or 'json', got {:?}", other),
        };

        Ok(Self {
            telegram_token,
            database_path,
            query_timeout,
            airing_cache_ttl,
            rate_limit_per_minute,
            info_links: InfoLinks {
                channel_url: optional("CHANNEL_URL"),
                chat_url: optional("CHAT_URL"),
            },
            log_format,
        })
    }
}

/// Accepts `sqlite://<path>`, `sqlite:<path>` or a bare path
pub fn parse_database_url(url: &str) -> Result<PathBuf> {
    let path = if let Some(rest) = url.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = url.strip_prefix("sqlite:") {
        rest
    } else if url.contains("://") {
        bail!("unsupported DATABASE_URL scheme (expected sqlite): {}", url);
    } else {
        url
    };

    if path.is_empty() {
        bail!("DATABASE_URL has no database path");
    }
    Ok(PathBuf::from(path))
}

//! Catalog Store
//!
//! Read-only query interface over the series catalog:
//! - Keyword search (case-insensitive substring on the name)
//! - Status-filtered listing ("currently airing")
//!
//! Backends implement [`CatalogStore`]. The SQLite backend lives in
//! [`sqlite`], and [`cache`] wraps any backend with a TTL cache for listings.

pub mod cache;
pub mod sqlite;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use cache::CachedCatalog;
pub use sqlite::{NewTitle, SqliteCatalog};

/// Maximum number of titles a keyword search returns
pub const SEARCH_LIMIT: usize = 9;

/// Error types for catalog operations
///
/// Every variant means "data unavailable" to the conversation layer; an
/// empty result is never an error.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Catalog query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Catalog query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// Airing status of a title
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Status {
    Airing,
    #[default]
    Finished,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Airing => "airing",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "airing" => Ok(Self::Airing),
            "finished" => Ok(Self::Finished),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title {
    pub id: i64,
    pub name: String,
    /// URL or Telegram file id of the cover image/animation
    pub cover_media: String,
    pub synopsis: String,
    /// Episode URLs; episode numbers are positions in this list (1-based)
    pub episode_links: Vec<String>,
    pub status: Status,
}

/// Split a stored comma-joined link list.
///
/// Segments are trimmed and empty ones are dropped, so a trailing comma or a
/// doubled comma never produces a button without a target.
pub fn parse_episode_links(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read-only catalog interface shared by all user tasks
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Titles whose name contains `keyword` (case-insensitive), ordered by
    /// name ascending, at most `limit` entries.
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<Title>, CatalogError>;

    /// All titles with the given status, ordered by name ascending.
    async fn list_by_status(&self, status: Status) -> Result<Vec<Title>, CatalogError>;
}

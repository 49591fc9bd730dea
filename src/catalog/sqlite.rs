//! SQLite Catalog Backend
//!
//! Single `series` table. Queries run on the blocking pool behind one shared
//! connection; the conversation layer bounds each call with its own timeout.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{parse_episode_links, CatalogError, CatalogStore, Status, Title};

/// How long SQLite waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const TITLE_COLUMNS: &str = "id, title, image_url, description, episode_links, status";

/// A title to be inserted (id is assigned by the database)
#[derive(Debug, Clone)]
pub struct NewTitle {
    pub name: String,
    pub cover_media: String,
    pub synopsis: String,
    pub episode_links: Vec<String>,
    pub status: Status,
}

/// Catalog backed by a SQLite database file
#[derive(Clone)]
pub struct SqliteCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalog {
    /// Open or create the catalog database
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CatalogError::Unavailable(format!("{}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(path)?;
        let catalog = Self::from_connection(conn)?;

        info!("Catalog opened: {}", path.display());
        Ok(catalog)
    }

    /// Open an in-memory catalog (for testing)
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CatalogError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        register_fold(&conn)?;
        init_schema(&conn)?;
        migrate_legacy_status(&conn)?;
        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_series_status ON series(status, title);",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a title (administrative write, never used by the conversation core)
    pub fn insert_title(&self, title: &NewTitle) -> Result<i64, CatalogError> {
        if title.name.trim().is_empty() {
            return Err(CatalogError::Unavailable(
                "refusing to insert a title with an empty name".to_string(),
            ));
        }

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO series (title, image_url, description, episode_links, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                title.name,
                title.cover_media,
                title.synopsis,
                title.episode_links.join(","),
                title.status.as_str(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!("Inserted title {} ({})", id, title.name);
        Ok(id)
    }

    /// Number of titles in the catalog
    pub fn count(&self) -> Result<usize, CatalogError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM series", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Run a query on the blocking pool
    async fn run<T, F>(&self, op: F) -> Result<T, CatalogError>
    where
        F: FnOnce(&Connection) -> Result<T, CatalogError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            op(&conn)
        })
        .await
        .map_err(|e| CatalogError::Unavailable(format!("catalog worker failed: {}", e)))?
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<Title>, CatalogError> {
        let pattern = like_pattern(keyword);
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                r"SELECT {} FROM series
                  WHERE fold(title) LIKE fold(?1) ESCAPE '\'
                  ORDER BY fold(title) ASC, id ASC
                  LIMIT ?2",
                TITLE_COLUMNS
            ))?;

            let titles = stmt
                .query_map(params![pattern, limit as i64], row_to_title)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(titles)
        })
        .await
    }

    async fn list_by_status(&self, status: Status) -> Result<Vec<Title>, CatalogError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM series
                 WHERE status = ?1
                 ORDER BY fold(title) ASC, id ASC",
                TITLE_COLUMNS
            ))?;

            let titles = stmt
                .query_map(params![status.as_str()], row_to_title)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(titles)
        })
        .await
    }
}

/// `fold(text)`: Unicode lowercase. Built-in `LIKE` and `NOCASE` only fold ASCII.
fn register_fold(conn: &Connection) -> Result<(), CatalogError> {
    conn.create_scalar_function(
        "fold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<String>(0)?.to_lowercase()),
    )?;
    Ok(())
}

fn init_schema(conn: &Connection) -> Result<(), CatalogError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS series (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            image_url TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            episode_links TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'finished'
        );
        "#,
    )?;
    Ok(())
}

/// Normalize older databases onto the `status` column.
///
/// Older bot versions tracked airing state either as a boolean `en_emision`
/// or as a free-text `estado`. When `status` is missing it is added and filled
/// from whichever legacy column exists. Running it again is a no-op.
pub(crate) fn migrate_legacy_status(conn: &Connection) -> Result<(), CatalogError> {
    let columns = table_columns(conn, "series")?;
    if columns.iter().any(|c| c == "status") {
        return Ok(());
    }

    conn.execute(
        "ALTER TABLE series ADD COLUMN status TEXT NOT NULL DEFAULT 'finished'",
        [],
    )?;

    if columns.iter().any(|c| c == "en_emision") {
        let rows = conn.execute(
            "UPDATE series SET status = CASE WHEN en_emision THEN 'airing' ELSE 'finished' END",
            [],
        )?;
        info!("Migrated {} titles from legacy en_emision flag", rows);
    } else if columns.iter().any(|c| c == "estado") {
        let rows = conn.execute(
            "UPDATE series SET status = CASE
                 WHEN lower(trim(estado)) IN ('airing', 'emision', 'emisión', 'en emision', 'en emisión')
                 THEN 'airing' ELSE 'finished' END",
            [],
        )?;
        info!("Migrated {} titles from legacy estado column", rows);
    } else {
        warn!("Catalog had no status column; all titles default to finished");
    }

    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, CatalogError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn row_to_title(row: &Row<'_>) -> rusqlite::Result<Title> {
    let raw_links: String = row.get(4)?;
    let status: String = row.get(5)?;
    Ok(Title {
        id: row.get(0)?,
        name: row.get(1)?,
        cover_media: row.get(2)?,
        synopsis: row.get(3)?,
        episode_links: parse_episode_links(&raw_links),
        status: status.parse().unwrap_or_default(),
    })
}

/// `%keyword%` with LIKE wildcards in the keyword escaped
fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

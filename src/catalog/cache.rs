//! Listing Cache
//!
//! TTL cache in front of `list_by_status`. The airing list is requested far
//! more often than it changes. Keyword searches are not cached.

use async_trait::async_trait;
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{CatalogError, CatalogStore, Status, Title};

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Catalog wrapper caching successful status listings
pub struct CachedCatalog<C> {
    inner: C,
    listings: Cache<Status, Arc<Vec<Title>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    enabled: bool,
}

impl<C: CatalogStore> CachedCatalog<C> {
    /// Wrap `inner`; a zero TTL disables caching
    pub fn new(inner: C, ttl: Duration) -> Self {
        let listings = Cache::builder()
            .max_capacity(8)
            .time_to_live(ttl.max(Duration::from_millis(1)))
            .build();

        Self {
            inner,
            listings,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            enabled: !ttl.is_zero(),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Drop all cached listings
    pub fn invalidate(&self) {
        self.listings.invalidate_all();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.listings.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl<C: CatalogStore> CatalogStore for CachedCatalog<C> {
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<Title>, CatalogError> {
        self.inner.search(keyword, limit).await
    }

    async fn list_by_status(&self, status: Status) -> Result<Vec<Title>, CatalogError> {
        if !self.enabled {
            return self.inner.list_by_status(status).await;
        }

        if let Some(titles) = self.listings.get(&status).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Listing cache HIT: {}", status);
            return Ok(titles.as_ref().clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Listing cache MISS: {}", status);

        // Failures are not cached so the next request retries the store.
        let titles = self.inner.list_by_status(status).await?;
        self.listings.insert(status, Arc::new(titles.clone())).await;
        Ok(titles)
    }
}

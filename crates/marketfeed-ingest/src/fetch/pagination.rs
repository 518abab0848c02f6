//! Pagination discovery with a time-bounded cache
//!
//! Finding out how many pages an endpoint has for a date range costs a
//! network call, so successful answers are cached per parameter tuple for a
//! bounded TTL. Failures are never cached: an unknown page count means the
//! caller must skip that entity type rather than guess.

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::api::FetchRequest;
use crate::entities::EntityType;

use super::retry::RetryingSingleFetcher;

type CacheKey = (EntityType, NaiveDate, NaiveDate, u32);

struct CachedCount {
    pages: u32,
    stored_at: Instant,
}

/// Resolves and caches total page counts.
pub struct PaginationResolver {
    fetcher: RetryingSingleFetcher,
    ttl: Duration,
    cache: Mutex<HashMap<CacheKey, CachedCount>>,
}

impl PaginationResolver {
    pub fn new(fetcher: RetryingSingleFetcher, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Total page count for the tuple, or `None` when discovery failed.
    /// A `None` is a signal to abort ingestion for this entity type.
    pub async fn resolve(
        &self,
        entity: EntityType,
        date_from: NaiveDate,
        date_to: NaiveDate,
        page_size: u32,
    ) -> Option<u32> {
        let key = (entity, date_from, date_to, page_size);

        {
            let cache = self.cache.lock().await;
            if let Some(hit) = cache.get(&key) {
                if hit.stored_at.elapsed() < self.ttl {
                    debug!(endpoint = %entity, pages = hit.pages, "page count served from cache");
                    return Some(hit.pages);
                }
            }
        }

        let request = FetchRequest::new(entity, date_from, date_to, 1, page_size);
        match self.fetcher.fetch_envelope(&request).await {
            Ok(envelope) => {
                // A missing meta block on a successful response means a
                // single page, same as the remote documents it.
                let pages = envelope.meta.last_page.unwrap_or(1).max(1);
                let mut cache = self.cache.lock().await;
                cache.insert(
                    key,
                    CachedCount {
                        pages,
                        stored_at: Instant::now(),
                    },
                );
                Some(pages)
            }
            Err(err) => {
                error!(endpoint = %entity, error = %err, "pagination discovery failed");
                None
            }
        }
    }

    /// Drop every cached count (mainly for tests and manual re-runs).
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }
}

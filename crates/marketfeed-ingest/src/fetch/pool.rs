//! Bounded-concurrency page fetching with a sequential fallback
//!
//! A group of pages is fetched with at most `min(len, 50)` requests in
//! flight. Pages that fail — or come back empty, which may be a transient
//! gap — are re-fetched one at a time through [`RetryingSingleFetcher`].
//! The pool is a throughput optimization for the common case; the fallback
//! trades throughput for reliability on the residual set. A page that still
//! has no data after the fallback is dropped only when it is genuinely
//! empty; failed pages are logged, never silently treated as empty.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use tracing::{debug, warn};

use crate::api::{ApiClient, FetchRequest};
use crate::config::MAX_POOL_SIZE;
use crate::error::Result;

use super::retry::RetryingSingleFetcher;

/// Receiver for pages that produced data. Invoked exactly once per such
/// page, in no particular order; returns how many items it accepted.
#[async_trait]
pub trait PageSink: Send + Sync {
    async fn accept(&self, records: Vec<serde_json::Value>, page: u32) -> Result<usize>;
}

/// Pool-phase classification of a page.
enum PoolOutcome {
    Data(Vec<serde_json::Value>),
    /// Failed, or empty (retried before emptiness is believed).
    NeedsFallback,
}

/// Fans a set of page numbers over a bounded pool, then mops up failures
/// sequentially.
#[derive(Debug, Clone)]
pub struct ConcurrentPageFetcher {
    client: ApiClient,
    single: RetryingSingleFetcher,
}

impl ConcurrentPageFetcher {
    pub fn new(client: ApiClient, single: RetryingSingleFetcher) -> Self {
        Self { client, single }
    }

    /// Fetch every page in `pages` (interpreted against `base`'s entity,
    /// date range and page size) and hand non-empty results to `sink`.
    /// Returns the total number of items the sink accepted.
    pub async fn fetch_pages(
        &self,
        base: &FetchRequest,
        pages: &[u32],
        sink: &dyn PageSink,
    ) -> Result<usize> {
        if pages.is_empty() {
            return Ok(0);
        }

        let mut outcomes = self.fetch_pool(base, pages).await;

        let mut total_accepted = 0;
        let mut fallback = Vec::new();

        for &page in pages {
            match outcomes.remove(&page) {
                Some(PoolOutcome::Data(records)) => {
                    total_accepted += sink.accept(records, page).await?;
                }
                Some(PoolOutcome::NeedsFallback) | None => fallback.push(page),
            }
        }

        if !fallback.is_empty() {
            debug!(
                endpoint = %base.entity,
                pages = fallback.len(),
                "re-fetching failed pages sequentially"
            );
            total_accepted += self.fetch_sequential(base, &fallback, sink).await?;
        }

        Ok(total_accepted)
    }

    /// Issue all requests concurrently, bounded by the pool ceiling.
    /// Completion order is unconstrained; results are keyed by page number.
    async fn fetch_pool(
        &self,
        base: &FetchRequest,
        pages: &[u32],
    ) -> HashMap<u32, PoolOutcome> {
        let in_flight = pages.len().min(MAX_POOL_SIZE);

        stream::iter(pages.iter().copied())
            .map(|page| {
                let client = self.client.clone();
                let request = base.for_page(page);
                async move {
                    let outcome = match client.get_page(&request).await {
                        Ok(envelope) if !envelope.data.is_empty() => {
                            PoolOutcome::Data(envelope.data)
                        }
                        Ok(_) => PoolOutcome::NeedsFallback,
                        Err(err) => {
                            debug!(page, error = %err, "pooled page fetch failed");
                            PoolOutcome::NeedsFallback
                        }
                    };
                    (page, outcome)
                }
            })
            .buffer_unordered(in_flight)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect()
    }

    /// Reliability path: one page at a time through the retrying fetcher.
    async fn fetch_sequential(
        &self,
        base: &FetchRequest,
        pages: &[u32],
        sink: &dyn PageSink,
    ) -> Result<usize> {
        let mut total_accepted = 0;

        for &page in pages {
            let result = self.single.fetch(&base.for_page(page)).await;
            if result.has_data() {
                total_accepted += sink.accept(result.records, page).await?;
            } else if result.is_error {
                warn!(
                    endpoint = %base.entity,
                    page,
                    "page failed after sequential retries, giving up on it"
                );
            }
        }

        Ok(total_accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_ceiling() {
        assert_eq!(10usize.min(MAX_POOL_SIZE), 10);
        assert_eq!(80usize.min(MAX_POOL_SIZE), 50);
    }
}

//! Offset pagination over OFSC collections.

use crate::auth::AccessToken;
use crate::config::ThrottleConfig;
use crate::errors::OfscResult;
use crate::observability::{CollectionProgress, Metrics, ProgressReporter};
use crate::resilience::{ApiCall, Authorized, ResilientRequester};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// How a collection pass advances and when it stops.
///
/// Both strategies stop on a page with no items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationStrategy {
    /// Advance by the `limit` the server echoed back; stop on an empty page.
    ServerLimit,
    /// Advance by the number of items received; stop once
    /// `offset + received >= totalResults` or the server reports `hasMore: false`.
    TotalResults,
}

/// A single page of results.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// The items in this page.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Offset echoed by the server.
    #[serde(default)]
    pub offset: Option<u64>,
    /// Limit echoed by the server.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Total number of results, if reported.
    #[serde(default)]
    pub total_results: Option<u64>,
    /// Zone-style continuation flag.
    #[serde(default)]
    pub has_more: Option<bool>,
}

impl<T> Page<T> {
    /// Returns the number of items in this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the page is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Decides where the next page starts, or `None` when this page is the last.
    ///
    /// `offset` and `requested_limit` are the values this page was requested with.
    pub fn next_offset(
        &self,
        strategy: PaginationStrategy,
        offset: u64,
        requested_limit: u32,
    ) -> Option<u64> {
        if self.is_empty() {
            return None;
        }

        match strategy {
            PaginationStrategy::ServerLimit => {
                let step = self.echoed_limit(requested_limit);
                Some(offset + step)
            }
            PaginationStrategy::TotalResults => {
                let received = self.len() as u64;
                if self.has_more == Some(false) {
                    return None;
                }
                match self.total_results {
                    Some(total) if offset + received >= total => None,
                    _ => Some(offset + received),
                }
            }
        }
    }

    /// Limit echoed by the server, falling back to the requested one when absent or zero.
    pub fn echoed_limit(&self, requested_limit: u32) -> u64 {
        match self.limit {
            Some(limit) if limit > 0 => limit,
            _ => u64::from(requested_limit),
        }
    }
}

/// Offset and limit of one page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Zero-based offset.
    pub offset: u64,
    /// Requested page size.
    pub limit: u32,
}

/// Describes a collection pass.
#[derive(Debug, Clone)]
pub struct PageQuery {
    /// Collection name, used for progress and logs.
    pub collection: String,
    /// Continuation strategy.
    pub strategy: PaginationStrategy,
    /// Page size of the first request.
    pub page_size: u32,
}

impl PageQuery {
    /// Creates a query.
    pub fn new(collection: impl Into<String>, strategy: PaginationStrategy, page_size: u32) -> Self {
        Self {
            collection: collection.into(),
            strategy,
            page_size,
        }
    }
}

/// Preemptive pause before every n-th page fetch of a pass.
#[derive(Debug, Clone)]
pub struct PageThrottle {
    every: u32,
    pause: Duration,
    calls: u32,
}

impl PageThrottle {
    /// Creates a throttle with a zeroed call counter.
    pub fn new(config: &ThrottleConfig) -> Self {
        Self {
            every: config.pause_every_pages,
            pause: config.pause,
            calls: 0,
        }
    }

    /// Counts a fetch and returns the pause due before issuing it.
    pub fn register_call(&mut self) -> Option<Duration> {
        self.calls += 1;
        if self.every > 0 && self.calls % self.every == 0 {
            Some(self.pause)
        } else {
            None
        }
    }

    /// Fetches counted so far.
    pub fn calls(&self) -> u32 {
        self.calls
    }
}

/// Drives the resilient requester across pages until exhaustion.
pub struct PaginatedCollector<'a> {
    requester: &'a ResilientRequester,
    throttle: ThrottleConfig,
    metrics: Arc<Metrics>,
    progress: Arc<dyn ProgressReporter>,
}

impl<'a> PaginatedCollector<'a> {
    /// Creates a collector.
    pub fn new(
        requester: &'a ResilientRequester,
        throttle: ThrottleConfig,
        metrics: Arc<Metrics>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            requester,
            throttle,
            metrics,
            progress,
        }
    }

    /// Collects every item of a collection, starting at offset 0.
    ///
    /// `endpoint` builds the page URL for each request. The token returned by
    /// each page call is the one used for the next, and the last one is
    /// returned alongside the items. Any page failure aborts the whole pass.
    pub async fn collect_all<T, F>(
        &self,
        query: &PageQuery,
        endpoint: F,
        token: Option<AccessToken>,
    ) -> OfscResult<Authorized<Vec<T>>>
    where
        T: DeserializeOwned,
        F: Fn(PageRequest) -> String,
    {
        let mut throttle = PageThrottle::new(&self.throttle);
        let mut request = PageRequest {
            offset: 0,
            limit: query.page_size,
        };
        let mut token = token;
        let mut items: Vec<T> = Vec::new();
        let mut page_number = 0u32;

        loop {
            if let Some(pause) = throttle.register_call() {
                tracing::warn!(
                    collection = %query.collection,
                    calls = throttle.calls(),
                    pause_secs = pause.as_secs(),
                    "Pausing page fetches to stay under server rate limits"
                );
                sleep(pause).await;
            }

            let call = ApiCall::get(endpoint(request));
            let result: Authorized<Page<T>> = self.requester.execute(&call, token.take()).await?;
            let page = result.data;
            page_number += 1;

            let next = page.next_offset(query.strategy, request.offset, request.limit);
            let page_items = page.len();
            let total_results = page.total_results;
            let echoed_limit = page.echoed_limit(request.limit);

            if page_items == 0 {
                tracing::debug!(collection = %query.collection, page = page_number, "Empty page, stopping");
                return Ok(Authorized {
                    data: items,
                    token: result.token,
                });
            }

            items.extend(page.items);
            self.metrics.record_page(page_items);
            self.progress.on_page(&CollectionProgress {
                collection: query.collection.clone(),
                page: page_number,
                page_items,
                total_collected: items.len(),
                total_results,
            });

            match next {
                Some(offset) => {
                    if query.strategy == PaginationStrategy::ServerLimit {
                        request.limit = u32::try_from(echoed_limit).unwrap_or(request.limit);
                    }
                    request.offset = offset;
                    token = Some(result.token);
                }
                None => {
                    return Ok(Authorized {
                        data: items,
                        token: result.token,
                    });
                }
            }
        }
    }
}

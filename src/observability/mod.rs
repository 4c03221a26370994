//! Observability module providing logging setup, metrics and progress hooks.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Metrics collector for OFSC API operations.
#[derive(Debug, Default)]
pub struct Metrics {
    /// HTTP requests sent to the core API.
    requests_total: AtomicU64,
    /// Tokens acquired after a 401 or at chain start.
    token_renewals: AtomicU64,
    /// 429 responses received.
    rate_limited: AtomicU64,
    /// Backoff retries performed.
    retries: AtomicU64,
    /// Pages fetched by collectors.
    pages_fetched: AtomicU64,
    /// Items accumulated by collectors.
    items_collected: AtomicU64,
    /// Mutations issued.
    mutations_applied: AtomicU64,
    /// Mutations skipped by entity rules.
    mutations_skipped: AtomicU64,
}

impl Metrics {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request.
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a token renewal.
    pub fn record_token_renewal(&self) {
        self.token_renewals.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a rate-limited response.
    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a retry.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a fetched page and its item count.
    pub fn record_page(&self, items: usize) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
        self.items_collected.fetch_add(items as u64, Ordering::Relaxed);
    }

    /// Records an applied mutation.
    pub fn record_mutation_applied(&self) {
        self.mutations_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a skipped mutation.
    pub fn record_mutation_skipped(&self) {
        self.mutations_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            token_renewals: self.token_renewals.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            items_collected: self.items_collected.load(Ordering::Relaxed),
            mutations_applied: self.mutations_applied.load(Ordering::Relaxed),
            mutations_skipped: self.mutations_skipped.load(Ordering::Relaxed),
        }
    }

    /// Resets all metrics.
    pub fn reset(&self) {
        self.requests_total.store(0, Ordering::Relaxed);
        self.token_renewals.store(0, Ordering::Relaxed);
        self.rate_limited.store(0, Ordering::Relaxed);
        self.retries.store(0, Ordering::Relaxed);
        self.pages_fetched.store(0, Ordering::Relaxed);
        self.items_collected.store(0, Ordering::Relaxed);
        self.mutations_applied.store(0, Ordering::Relaxed);
        self.mutations_skipped.store(0, Ordering::Relaxed);
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Requests sent.
    pub requests_total: u64,
    /// Tokens acquired.
    pub token_renewals: u64,
    /// 429 responses.
    pub rate_limited: u64,
    /// Backoff retries.
    pub retries: u64,
    /// Pages fetched.
    pub pages_fetched: u64,
    /// Items collected.
    pub items_collected: u64,
    /// Mutations applied.
    pub mutations_applied: u64,
    /// Mutations skipped.
    pub mutations_skipped: u64,
}

/// Progress of a collection pass, reported after each page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionProgress {
    /// Collection being walked, e.g. `resources`.
    pub collection: String,
    /// One-based page number within the pass.
    pub page: u32,
    /// Items received in this page.
    pub page_items: usize,
    /// Items accumulated so far.
    pub total_collected: usize,
    /// Total reported by the server, if any.
    pub total_results: Option<u64>,
}

/// Receives progress signals from collectors.
pub trait ProgressReporter: Send + Sync {
    /// Called once per fetched page.
    fn on_page(&self, progress: &CollectionProgress);
}

/// Progress reporter that logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn on_page(&self, progress: &CollectionProgress) {
        info!(
            collection = %progress.collection,
            page = progress.page,
            page_items = progress.page_items,
            total_collected = progress.total_collected,
            total_results = ?progress.total_results,
            "Received page"
        );
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set. Calling this twice is a
/// no-op; returns false when a subscriber was already installed.
pub fn init_logging(format: LogFormat, default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    match format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

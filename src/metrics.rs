use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

#[derive(Debug, Default)]
pub struct Metrics {
    search_requests: AtomicU64,
    agile_requests: AtomicU64,
    issues_seen: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub search_requests: u64,
    pub agile_requests: u64,
    pub issues_seen: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_search_request(&self) {
        self.search_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_agile_request(&self) {
        self.agile_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_issues_seen(&self, count: usize) {
        self.issues_seen.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn inc_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            search_requests: self.search_requests.load(Ordering::Relaxed),
            agile_requests: self.agile_requests.load(Ordering::Relaxed),
            issues_seen: self.issues_seen.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        info!(
            search_requests = snapshot.search_requests,
            agile_requests = snapshot.agile_requests,
            issues_seen = snapshot.issues_seen,
            cache_hits = snapshot.cache_hits,
            cache_misses = snapshot.cache_misses,
            "metrics"
        );
    }
}

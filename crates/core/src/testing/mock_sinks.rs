//! Mock rate limiter, statistics, progress and result filter.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::searcher::{
    FilterArgs, IndexerStatistic, MediaHint, ProgressKey, ProgressSink, RateLimiter,
    ResultFilter, SinkError, StatisticsSink, TorrentRecord,
};
use crate::site::SiteDescriptor;

/// Mock implementation of [`RateLimiter`] with a fixed deny list.
#[derive(Debug, Default)]
pub struct MockRateLimiter {
    denied: Mutex<HashSet<String>>,
    checks: AtomicUsize,
}

impl MockRateLimiter {
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Deny the listed site ids.
    pub fn deny(site_ids: &[&str]) -> Self {
        let limiter = Self::default();
        limiter
            .denied
            .lock()
            .extend(site_ids.iter().map(|s| s.to_string()));
        limiter
    }

    pub fn deny_site(&self, site_id: &str) {
        self.denied.lock().insert(site_id.to_string());
    }

    /// How many times `allowed` was asked.
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateLimiter for MockRateLimiter {
    async fn allowed(&self, site_id: &str) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        !self.denied.lock().contains(site_id)
    }
}

/// Mock implementation of [`StatisticsSink`] that keeps every sample.
#[derive(Debug, Default)]
pub struct MockStatisticsSink {
    recorded: Mutex<Vec<IndexerStatistic>>,
    fail: bool,
}

impl MockStatisticsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose storage is broken.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn recorded(&self) -> Vec<IndexerStatistic> {
        self.recorded.lock().clone()
    }
}

impl StatisticsSink for MockStatisticsSink {
    fn record(&self, stat: &IndexerStatistic) -> Result<(), SinkError> {
        if self.fail {
            return Err(SinkError::Storage("disk full".to_string()));
        }
        self.recorded.lock().push(stat.clone());
        Ok(())
    }
}

/// Mock implementation of [`ProgressSink`].
#[derive(Debug, Default)]
pub struct MockProgressSink {
    updates: Mutex<Vec<(ProgressKey, String)>>,
}

impl MockProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<(ProgressKey, String)> {
        self.updates.lock().clone()
    }

    /// Texts of every update, in order.
    pub fn messages(&self) -> Vec<String> {
        self.updates.lock().iter().map(|(_, text)| text.clone()).collect()
    }
}

impl ProgressSink for MockProgressSink {
    fn update(&self, key: ProgressKey, text: &str) {
        self.updates.lock().push((key, text.to_string()));
    }
}

/// Pass-through [`ResultFilter`] that records the filters each site received.
#[derive(Debug, Default)]
pub struct MockResultFilter {
    seen: Mutex<Vec<(String, FilterArgs)>>,
}

impl MockResultFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(site name, filters)` per call.
    pub fn seen(&self) -> Vec<(String, FilterArgs)> {
        self.seen.lock().clone()
    }
}

impl ResultFilter for MockResultFilter {
    fn filter(
        &self,
        _order_seq: u32,
        site: &SiteDescriptor,
        records: Vec<TorrentRecord>,
        filters: &FilterArgs,
        _media: Option<&MediaHint>,
    ) -> Vec<TorrentRecord> {
        self.seen.lock().push((site.name.clone(), filters.clone()));
        records
    }
}

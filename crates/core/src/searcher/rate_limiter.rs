//! Token bucket rate limiting per site.
//!
//! Sites without a configured limit are always allowed.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::debug;

use super::traits::RateLimiter;
use crate::config::SiteRow;

#[derive(Debug, Error, PartialEq)]
pub enum RateLimitError {
    #[error("Rate limited for site {site}, retry in {retry_after_ms}ms")]
    Limited { site: String, retry_after_ms: u64 },

    #[error("No rate limit configured for site: {0}")]
    SiteNotFound(String),
}

/// Rate limit status for a site.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub requests_per_minute: u32,
    pub tokens_available: f32,
    pub next_available_in_ms: Option<u64>,
}

/// Token bucket for a single site.
///
/// Tokens refill at a constant rate and each request consumes one.
pub struct TokenBucket {
    /// Max tokens (= requests per minute).
    capacity: f32,
    tokens: f32,
    /// Tokens added per second.
    refill_rate: f32,
    last_refill: Instant,
}

impl TokenBucket {
    /// The bucket starts full.
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute as f32;
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    /// Take a token, or return how long until one is available.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else if self.refill_rate <= 0.0 {
            Err(Duration::MAX)
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Err(Duration::from_secs_f32(tokens_needed / self.refill_rate))
        }
    }

    pub fn status(&mut self) -> RateLimitStatus {
        self.refill();
        RateLimitStatus {
            requests_per_minute: self.capacity as u32,
            tokens_available: self.tokens,
            next_available_in_ms: if self.tokens >= 1.0 || self.refill_rate <= 0.0 {
                None
            } else {
                let tokens_needed = 1.0 - self.tokens;
                Some((tokens_needed / self.refill_rate * 1000.0) as u64)
            },
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f32();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// One site's limit.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRateLimit {
    /// Same key the dispatcher passes to [`RateLimiter::allowed`].
    pub site_id: String,
    pub rate_limit_rpm: u32,
}

impl SiteRateLimit {
    /// Limits for configured rows with `rate_limit_rpm` set.
    ///
    /// Rows without an id are keyed by their 1-based position, matching the
    /// registry's site ids.
    pub fn from_rows(rows: &[SiteRow]) -> Vec<Self> {
        rows.iter()
            .enumerate()
            .filter_map(|(position, row)| {
                row.rate_limit_rpm.map(|rpm| SiteRateLimit {
                    site_id: row
                        .id
                        .clone()
                        .unwrap_or_else(|| (position + 1).to_string()),
                    rate_limit_rpm: rpm,
                })
            })
            .collect()
    }
}

/// Token buckets keyed by site id.
pub struct RateLimiterPool {
    limiters: RwLock<HashMap<String, TokenBucket>>,
}

impl RateLimiterPool {
    pub fn new(limits: &[SiteRateLimit]) -> Self {
        let limiters = limits
            .iter()
            .map(|l| (l.site_id.clone(), TokenBucket::new(l.rate_limit_rpm)))
            .collect();
        Self {
            limiters: RwLock::new(limiters),
        }
    }

    pub fn empty() -> Self {
        Self::new(&[])
    }

    /// Take a token for a limited site.
    pub async fn try_acquire(&self, site_id: &str) -> Result<(), RateLimitError> {
        let mut limiters = self.limiters.write().await;
        let bucket = limiters
            .get_mut(site_id)
            .ok_or_else(|| RateLimitError::SiteNotFound(site_id.to_string()))?;
        bucket.try_acquire().map_err(|wait| RateLimitError::Limited {
            site: site_id.to_string(),
            retry_after_ms: wait.as_millis().min(u64::MAX as u128) as u64,
        })
    }

    pub async fn all_status(&self) -> Vec<(String, RateLimitStatus)> {
        let mut limiters = self.limiters.write().await;
        limiters
            .iter_mut()
            .map(|(site, bucket)| (site.clone(), bucket.status()))
            .collect()
    }
}

#[async_trait]
impl RateLimiter for RateLimiterPool {
    async fn allowed(&self, site_id: &str) -> bool {
        match self.try_acquire(site_id).await {
            Ok(()) | Err(RateLimitError::SiteNotFound(_)) => true,
            Err(RateLimitError::Limited { retry_after_ms, .. }) => {
                debug!(site = %site_id, retry_after_ms, "Site rate limited");
                false
            }
        }
    }
}

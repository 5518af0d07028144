//! Shared state for the HTTP API layer.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::cache::Cache;
use crate::crypto::Cipher;
use crate::db::DbPool;
use crate::jobs::CancelRegistry;
use crate::queue::{FeedbackQueue, TaskQueue};

/// Shared context injected into every handler via `State<ApiContext>`, and into
/// middleware (which runs before state extraction) via `Extension<ApiContext>`.
#[derive(Clone)]
pub struct ApiContext {
    pub pool: DbPool,
    pub cipher: Cipher,
    pub queue: Arc<dyn TaskQueue>,
    pub feedback_queue: Arc<dyn FeedbackQueue>,
    pub cancel: CancelRegistry,
    pub feedback_rate_limiter: Arc<Mutex<RateLimiter>>,
    pub max_upload_bytes: usize,
    /// Set when the processor was built with a cache, so admin writes can
    /// invalidate the namespaces they touch. `None` means caching is off.
    pub cache: Option<Arc<Cache>>,
}

impl ApiContext {
    pub fn new(
        pool: DbPool,
        cipher: Cipher,
        queue: Arc<dyn TaskQueue>,
        feedback_queue: Arc<dyn FeedbackQueue>,
        cancel: CancelRegistry,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            pool,
            cipher,
            queue,
            feedback_queue,
            cancel,
            feedback_rate_limiter: Arc::new(Mutex::new(RateLimiter::new(10, Duration::from_secs(60)))),
            max_upload_bytes,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

/// Per-key sliding-window rate limiter. Used to cap feedback submissions per
/// client IP; a generic key type keeps it reusable if another route needs one.
pub struct RateLimiter {
    windows: HashMap<IpAddr, Vec<Instant>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self { windows: HashMap::new(), max_requests, window }
    }

    /// Records a hit for `key`, returning `Err(retry_after_seconds)` if it pushed
    /// the caller over the limit within the window.
    pub fn check(&mut self, key: IpAddr) -> Result<(), u64> {
        let now = Instant::now();
        let entries = self.windows.entry(key).or_default();
        entries.retain(|ts| now.duration_since(*ts) < self.window);

        if entries.len() >= self.max_requests {
            let oldest = entries[0];
            let retry_after = self.window.saturating_sub(now.duration_since(oldest)).as_secs().max(1);
            return Err(retry_after);
        }
        entries.push(now);
        Ok(())
    }
}

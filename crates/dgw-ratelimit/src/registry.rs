//! Bucket registry: one bucket per route plus the account-wide bucket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::trace;

use crate::{Bucket, RateLimitState, RouteKey};

/// Owns every route bucket and the global bucket.
///
/// Route buckets are created on first use with an unknown quota and are never
/// removed, so a bucket handle stays valid for the life of the registry.
#[derive(Debug)]
pub struct BucketRegistry {
    buckets: RwLock<HashMap<RouteKey, Arc<Bucket>>>,
    global: Arc<Bucket>,
}

impl BucketRegistry {
    /// Create a registry whose global bucket admits `global_per_second` requests per second.
    #[must_use]
    pub fn new(global_per_second: u32) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            global: Arc::new(Bucket::with_window(
                "global",
                global_per_second.max(1),
                Duration::from_secs(1),
            )),
        }
    }

    /// Bucket for `key`, created if absent.
    #[must_use]
    pub fn bucket(&self, key: &RouteKey) -> Arc<Bucket> {
        if let Some(bucket) = self.buckets.read().get(key) {
            return Arc::clone(bucket);
        }

        let mut buckets = self.buckets.write();
        Arc::clone(buckets.entry(key.clone()).or_insert_with(|| {
            trace!(route = %key, "Creating rate limit bucket");
            Arc::new(Bucket::new(key.to_string()))
        }))
    }

    /// The account-wide bucket.
    #[must_use]
    pub fn global(&self) -> Arc<Bucket> {
        Arc::clone(&self.global)
    }

    /// Number of route buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.read().len()
    }

    /// Whether no route bucket exists yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.read().is_empty()
    }

    /// State of every route bucket, sorted by route.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(RouteKey, RateLimitState)> {
        let mut states: Vec<_> = self
            .buckets
            .read()
            .iter()
            .map(|(key, bucket)| (key.clone(), bucket.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}

impl Default for BucketRegistry {
    fn default() -> Self {
        Self::new(50)
    }
}

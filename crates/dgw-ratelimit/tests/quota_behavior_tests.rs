//! Behavior tests for route and global quota buckets.
//!
//! Validates:
//! - Routes that differ only by id share one bucket
//! - Server headers drive admission
//! - Global blocks hold back every caller
//! - Deadlines fail fast instead of sleeping

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dgw_ratelimit::{BucketRegistry, QuotaHeaders, RateLimitError, RouteKey};
use tokio::time::Instant;

fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

// ============================================================================
// Route sharing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn exhausting_one_channel_holds_back_another() {
    // Given a registry whose message route is down to its last slot
    let registry = BucketRegistry::default();
    let first = RouteKey::new("POST", "/channels/100/messages");
    registry.bucket(&first).update(&QuotaHeaders::parse(&headers(&[
        ("x-ratelimit-limit", "5"),
        ("x-ratelimit-remaining", "1"),
        ("x-ratelimit-reset-after", "2.0"),
    ])));

    // When one caller takes it
    assert_eq!(registry.bucket(&first).acquire(None).await.unwrap(), Duration::ZERO);

    // Then a caller for another channel on the same route waits for the reset
    let second = RouteKey::new("POST", "/channels/200/messages");
    let waited = registry.bucket(&second).acquire(None).await.unwrap();
    assert!(waited >= Duration::from_millis(1999), "waited {waited:?}");
}

#[tokio::test(start_paused = true)]
async fn unrelated_route_is_not_affected() {
    let registry = BucketRegistry::default();
    let limited = RouteKey::new("POST", "/channels/1/messages");
    registry.bucket(&limited).block_for(Duration::from_secs(30));

    let other = RouteKey::new("GET", "/channels/1");
    assert_eq!(registry.bucket(&other).acquire(None).await.unwrap(), Duration::ZERO);
}

// ============================================================================
// Global bucket
// ============================================================================

#[tokio::test(start_paused = true)]
async fn global_block_applies_to_every_caller() {
    // Given a global 429 that asked for 750ms
    let registry = BucketRegistry::new(50);
    registry.global().block_for(Duration::from_millis(750));

    // Then the next caller waits at least that long on the global bucket
    let waited = registry.global().acquire(None).await.unwrap();
    assert!(waited >= Duration::from_millis(749), "waited {waited:?}");
}

#[tokio::test(start_paused = true)]
async fn global_window_paces_bursts() {
    let registry = BucketRegistry::new(3);
    let global = registry.global();

    let start = Instant::now();
    for _ in 0..3 {
        global.acquire(None).await.unwrap();
    }
    assert_eq!(start.elapsed(), Duration::ZERO);

    // Fourth request in the same second rolls into the next window
    global.acquire(None).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(999));
}

// ============================================================================
// Deadlines
// ============================================================================

#[tokio::test(start_paused = true)]
async fn deadline_shorter_than_reset_fails_without_waiting() {
    let registry = BucketRegistry::default();
    let key = RouteKey::new("PATCH", "/guilds/9");
    let bucket = registry.bucket(&key);
    bucket.block_for(Duration::from_secs(10));

    let start = Instant::now();
    let result = bucket
        .acquire(Some(Instant::now() + Duration::from_secs(1)))
        .await;

    assert!(matches!(result, Err(RateLimitError::WaitExceeded { .. })));
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn many_waiters_are_released_by_one_reset() {
    let registry = Arc::new(BucketRegistry::default());
    let key = RouteKey::new("DELETE", "/channels/5/messages/6");
    registry.bucket(&key).update(&QuotaHeaders::from_pairs([
        ("x-ratelimit-limit", "10"),
        ("x-ratelimit-remaining", "0"),
        ("x-ratelimit-reset-after", "0.5"),
    ]));

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let registry = Arc::clone(&registry);
        let key = key.clone();
        tasks.push(tokio::spawn(async move {
            registry.bucket(&key).acquire(None).await.unwrap()
        }));
    }

    for task in tasks {
        let waited = task.await.unwrap();
        assert!(waited >= Duration::from_millis(499));
        assert!(waited < Duration::from_secs(1));
    }
    assert_eq!(registry.bucket(&key).snapshot().remaining, 0);
}

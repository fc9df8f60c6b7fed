//! Quota bucket mirroring server-reported capacity.
//!
//! A bucket starts with an unknown quota and admits callers freely until the first
//! response teaches it `limit`, `remaining` and the reset time. From then on a caller
//! that finds `remaining == 0` before the reset sleeps until the reset instant.
//! Once a reset passes locally, the next window is predicted from the last span the
//! server reported, so a refilled bucket still admits at most `limit` callers.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use crate::{QuotaHeaders, RateLimitError, RateLimitState};

/// Outcome of a single admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The caller may proceed.
    Granted,
    /// The caller must wait until the given instant and try again.
    Wait(Instant),
}

/// Mutable bucket state. Exposed so callers can inspect and test transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketState {
    /// Window size, once known.
    pub limit: Option<u32>,

    /// Capacity left in the current window.
    pub remaining: u32,

    /// When the current window ends.
    pub reset_at: Option<Instant>,

    /// Fixed local window. Only set for buckets the client paces itself.
    pub window: Option<Duration>,

    /// Length of the last window the server reported.
    pub span: Option<Duration>,
}

impl BucketState {
    /// Try to take one unit of capacity at `now`.
    pub fn try_admit(&mut self, now: Instant) -> Admission {
        if self.reset_at.is_some_and(|reset| now >= reset) {
            self.reset_at = None;
            if let Some(limit) = self.limit {
                self.remaining = limit;
            }
        }

        if let Some(reset) = self.reset_at {
            if self.remaining == 0 {
                return Admission::Wait(reset);
            }
        }

        if self.limit.is_none() {
            return Admission::Granted;
        }

        if self.remaining > 0 {
            self.remaining -= 1;
            if self.reset_at.is_none() {
                self.reset_at = self.window.or(self.span).map(|window| now + window);
            }
        }

        // remaining == 0 with no reset ever reported: nothing to wait for
        Admission::Granted
    }

    /// Give back a unit taken by an admission that never reached the server.
    pub fn release(&mut self) {
        if let (Some(limit), Some(_)) = (self.limit, self.reset_at) {
            self.remaining = (self.remaining + 1).min(limit);
        }
    }

    /// Overwrite local state with what the server reported.
    pub fn apply(&mut self, headers: &QuotaHeaders, now: Instant) {
        if let Some(limit) = headers.limit {
            self.limit = Some(limit);
        }
        if let Some(remaining) = headers.remaining {
            self.remaining = remaining;
            if self.limit.is_none() {
                self.limit = Some(remaining);
            }
        }
        if let Some(reset_in) = headers.reset_in() {
            self.reset_at = Some(now + reset_in);
            if !reset_in.is_zero() {
                self.span = Some(self.span.map_or(reset_in, |span| span.max(reset_in)));
            }
        }
    }

    /// Refuse admission until at least `until`.
    pub fn block_until(&mut self, until: Instant) {
        self.remaining = 0;
        self.reset_at = Some(self.reset_at.map_or(until, |current| current.max(until)));
    }

    /// Read-only view at `now`, accounting for a reset that has already passed.
    #[must_use]
    pub fn view(&self, now: Instant) -> RateLimitState {
        let pending_reset = self.reset_at.filter(|reset| *reset > now);
        let remaining = match (pending_reset, self.limit) {
            (None, Some(limit)) if self.reset_at.is_some() => limit,
            _ => self.remaining,
        };

        RateLimitState {
            limit: self.limit,
            remaining,
            reset_after: pending_reset.map_or(Duration::ZERO, |reset| reset - now),
            is_limited: pending_reset.is_some() && remaining == 0,
        }
    }
}

/// A named quota bucket shared by every caller of one route (or by all callers, for
/// the global bucket).
#[derive(Debug)]
pub struct Bucket {
    name: String,
    state: Mutex<BucketState>,
}

impl Bucket {
    /// Bucket with unknown quota.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(BucketState::default()),
        }
    }

    /// Bucket paced locally at `limit` requests per `window`.
    #[must_use]
    pub fn with_window(name: impl Into<String>, limit: u32, window: Duration) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(BucketState {
                limit: Some(limit),
                remaining: limit,
                reset_at: None,
                window: Some(window),
                span: None,
            }),
        }
    }

    /// Bucket name, used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take capacity if available without waiting.
    pub fn try_acquire(&self) -> bool {
        matches!(self.state.lock().try_admit(Instant::now()), Admission::Granted)
    }

    /// Wait for capacity.
    ///
    /// Returns how long the caller waited. Fails without waiting when the next reset
    /// falls after `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::WaitExceeded`] if the deadline would be missed.
    pub async fn acquire(&self, deadline: Option<Instant>) -> Result<Duration, RateLimitError> {
        let start = Instant::now();

        loop {
            let admission = self.state.lock().try_admit(Instant::now());

            match admission {
                Admission::Granted => {
                    let waited = start.elapsed();
                    if !waited.is_zero() {
                        debug!(bucket = %self.name, waited_ms = waited.as_millis(), "Bucket admitted after wait");
                    }
                    return Ok(waited);
                }
                Admission::Wait(until) => {
                    if let Some(deadline) = deadline {
                        if until > deadline {
                            return Err(RateLimitError::WaitExceeded {
                                wait_time: until.saturating_duration_since(start),
                                max_wait: deadline.saturating_duration_since(start),
                            });
                        }
                    }

                    trace!(
                        bucket = %self.name,
                        wait_ms = until.saturating_duration_since(Instant::now()).as_millis(),
                        "Bucket exhausted, waiting for reset"
                    );
                    sleep_until(until).await;
                }
            }
        }
    }

    /// Return a unit taken by [`Self::acquire`] when the request was never sent.
    pub fn release(&self) {
        self.state.lock().release();
    }

    /// Feed response headers back into the bucket.
    pub fn update(&self, headers: &QuotaHeaders) {
        if !headers.has_quota() && headers.reset_after.is_none() && headers.reset_at_epoch.is_none() {
            return;
        }
        let mut state = self.state.lock();
        state.apply(headers, Instant::now());
        trace!(
            bucket = %self.name,
            limit = ?state.limit,
            remaining = state.remaining,
            "Bucket updated from response"
        );
    }

    /// Block every caller for `duration` from now.
    pub fn block_for(&self, duration: Duration) {
        let until = Instant::now() + duration;
        self.state.lock().block_until(until);
        debug!(bucket = %self.name, blocked_ms = duration.as_millis(), "Bucket blocked");
    }

    /// Current state summary.
    #[must_use]
    pub fn state(&self) -> RateLimitState {
        self.state.lock().view(Instant::now())
    }

    /// Raw state copy.
    #[must_use]
    pub fn snapshot(&self) -> BucketState {
        self.state.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;

    fn quota(limit: u32, remaining: u32, reset_after: Duration) -> QuotaHeaders {
        QuotaHeaders {
            limit: Some(limit),
            remaining: Some(remaining),
            reset_after: Some(reset_after),
            ..QuotaHeaders::default()
        }
    }

    #[test]
    fn test_unknown_quota_admits() {
        let mut state = BucketState::default();
        let now = Instant::now();
        for _ in 0..100 {
            assert_eq!(state.try_admit(now), Admission::Granted);
        }
        assert_eq!(state.remaining, 0);
    }

    #[test]
    fn test_exhausted_waits_until_reset() {
        let now = Instant::now();
        let mut state = BucketState::default();
        state.apply(&quota(2, 1, Duration::from_secs(1)), now);

        assert_eq!(state.try_admit(now), Admission::Granted);
        let reset = now + Duration::from_secs(1);
        assert_eq!(state.try_admit(now), Admission::Wait(reset));

        assert_eq!(state.try_admit(reset), Admission::Granted);
        assert_eq!(state.remaining, 1);
    }

    #[test]
    fn test_predicted_window_caps_admissions() {
        let now = Instant::now();
        let mut state = BucketState::default();
        state.apply(&quota(2, 0, Duration::from_secs(1)), now);

        let later = now + Duration::from_millis(1_100);
        assert_eq!(state.try_admit(later), Admission::Granted);
        assert_eq!(state.try_admit(later), Admission::Granted);
        let next = later + Duration::from_secs(1);
        assert_eq!(state.try_admit(later), Admission::Wait(next));
        assert_eq!(state.try_admit(next), Admission::Granted);
    }

    #[test]
    fn test_release_restores_unit() {
        let now = Instant::now();
        let mut state = BucketState::default();
        state.apply(&quota(2, 1, Duration::from_secs(1)), now);

        assert_eq!(state.try_admit(now), Admission::Granted);
        state.release();
        assert_eq!(state.remaining, 1);
        state.release();
        state.release();
        assert_eq!(state.remaining, 2);
    }

    #[test]
    fn test_block_extends_reset() {
        let now = Instant::now();
        let mut state = BucketState::default();
        state.block_until(now + Duration::from_secs(5));
        state.block_until(now + Duration::from_secs(2));
        assert_eq!(state.reset_at, Some(now + Duration::from_secs(5)));
        assert_eq!(state.try_admit(now), Admission::Wait(now + Duration::from_secs(5)));
        assert_eq!(state.try_admit(now + Duration::from_secs(5)), Admission::Granted);
    }

    #[test]
    fn test_local_window() {
        let now = Instant::now();
        let bucket = Bucket::with_window("global", 2, Duration::from_secs(1));
        {
            let mut state = bucket.state.lock();
            assert_eq!(state.try_admit(now), Admission::Granted);
            assert_eq!(state.try_admit(now), Admission::Granted);
            assert_eq!(
                state.try_admit(now),
                Admission::Wait(now + Duration::from_secs(1))
            );
        }
        assert_eq!(bucket.state().limit, Some(2));
    }

    #[test]
    fn test_view_after_reset_reports_full() {
        let now = Instant::now();
        let mut state = BucketState::default();
        state.apply(&quota(5, 0, Duration::from_millis(10)), now);

        let limited = state.view(now);
        assert!(limited.is_limited);
        assert_eq!(limited.remaining, 0);

        let later = state.view(now + Duration::from_millis(20));
        assert!(!later.is_limited);
        assert_eq!(later.remaining, 5);
        assert_eq!(later.reset_after, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixth_call_waits_for_reset() {
        let bucket = Bucket::new("POST /channels/{id}/messages");
        bucket.update(&quota(5, 5, Duration::from_secs(1)));

        for _ in 0..5 {
            assert_eq!(bucket.acquire(None).await.unwrap(), Duration::ZERO);
        }
        assert!(bucket.state().is_limited);

        let waited = bucket.acquire(None).await.unwrap();
        assert!(waited >= Duration::from_millis(999), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refilled_bucket_admits_only_limit() {
        let bucket = Bucket::new("POST /channels/{id}/messages");
        bucket.update(&quota(2, 0, Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        let start = Instant::now();
        let mut admitted_at = Vec::new();
        for _ in 0..5 {
            bucket.acquire(None).await.unwrap();
            admitted_at.push(start.elapsed());
        }
        let first_window = admitted_at
            .iter()
            .filter(|at| **at < Duration::from_secs(1))
            .count();
        assert_eq!(first_window, 2, "admitted at {admitted_at:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let bucket = Bucket::new("GET /guilds/{id}");
        bucket.update(&quota(1, 0, Duration::from_secs(2)));

        let deadline = Instant::now() + Duration::from_millis(100);
        let err = bucket.acquire(Some(deadline)).await.unwrap_err();
        match err {
            RateLimitError::WaitExceeded { wait_time, max_wait } => {
                assert!(wait_time > max_wait);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_last_slot() {
        let bucket = Arc::new(Bucket::new("PATCH /channels/{id}"));
        bucket.update(&quota(1, 1, Duration::from_millis(500)));

        let a = tokio::spawn({
            let bucket = Arc::clone(&bucket);
            async move { bucket.acquire(None).await.unwrap() }
        });
        let b = tokio::spawn({
            let bucket = Arc::clone(&bucket);
            async move { bucket.acquire(None).await.unwrap() }
        });

        let mut waits = vec![a.await.unwrap(), b.await.unwrap()];
        waits.sort();
        assert_eq!(waits[0], Duration::ZERO);
        assert!(waits[1] >= Duration::from_millis(499), "waited {:?}", waits[1]);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Admit(u64),
        Apply { limit: u32, remaining: u32, reset_ms: u64 },
        Block(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..300).prop_map(Op::Admit),
            (1u32..10, 0u32..10, 0u64..500).prop_map(|(limit, remaining, reset_ms)| Op::Apply {
                limit,
                remaining: remaining.min(limit),
                reset_ms,
            }),
            (0u64..500).prop_map(Op::Block),
        ]
    }

    proptest! {
        #[test]
        fn prop_never_admits_while_exhausted(ops in proptest::collection::vec(op(), 1..64)) {
            let base = Instant::now();
            let mut now = base;
            let mut state = BucketState::default();

            for op in ops {
                match op {
                    Op::Admit(advance) => {
                        now += Duration::from_millis(advance);
                        let before = state.clone();
                        let outcome = state.try_admit(now);
                        let blocked = before.remaining == 0
                            && before.reset_at.is_some_and(|reset| now < reset);
                        if blocked {
                            prop_assert!(matches!(outcome, Admission::Wait(_)));
                            prop_assert_eq!(&state, &before);
                        }
                        if let Admission::Wait(until) = outcome {
                            prop_assert!(until > now);
                        }
                    }
                    Op::Apply { limit, remaining, reset_ms } => {
                        state.apply(&quota(limit, remaining, Duration::from_millis(reset_ms)), now);
                        prop_assert_eq!(state.remaining, remaining);
                    }
                    Op::Block(ms) => {
                        state.block_until(now + Duration::from_millis(ms));
                        prop_assert_eq!(state.remaining, 0);
                    }
                }
            }
        }
    }
}

//! Sliding window limiter.
//!
//! A continuous trailing window is approximated with two adjacent fixed
//! buckets. The previous bucket's count is weighted by how much of it still
//! overlaps the trailing window ending now:
//!
//! ```text
//! effective = current + previous * (1 - (now - t0) / window)
//! ```
//!
//! All arithmetic is done on integer milliseconds scaled by the window
//! length, so the comparison against the limit is exact.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, trace};

use super::clock::Clock;
use super::policy::WindowPolicy;
use crate::error::Result;
use crate::store::{BucketCounts, CounterStore};

/// Outcome of one (policy, identifier) check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeDecision {
    /// Whether this event fits within the policy
    pub allowed: bool,
    /// The policy limit
    pub limit: u64,
    /// Events still admitted before the limit is reached
    pub remaining: u64,
    /// End of the current fixed bucket
    pub reset_at: DateTime<Utc>,
    /// Raw counts read back from the store
    pub counts: BucketCounts,
}

/// Fixed bucket a point in time falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// `floor(now / window)`
    pub index: u64,
    /// Milliseconds since the bucket started
    pub elapsed_ms: u64,
    /// Bucket length in milliseconds
    pub window_ms: u64,
}

impl Bucket {
    pub fn at(now: DateTime<Utc>, window_ms: u64) -> Self {
        let now_ms = now.timestamp_millis().max(0) as u64;
        Self {
            index: now_ms / window_ms,
            elapsed_ms: now_ms % window_ms,
            window_ms,
        }
    }

    /// Start of this bucket, in unix milliseconds.
    pub fn start_ms(&self) -> u64 {
        self.index * self.window_ms
    }

    /// Start of the next bucket, in unix milliseconds.
    pub fn end_ms(&self) -> u64 {
        self.start_ms() + self.window_ms
    }

    pub fn previous_index(&self) -> u64 {
        self.index.wrapping_sub(1)
    }
}

/// Weigh bucket counts against a limit.
///
/// Returns whether the event is admitted and how many more events would
/// be. `remaining` is rounded down and never negative.
pub fn weigh(limit: u64, bucket: &Bucket, counts: &BucketCounts) -> (bool, u64) {
    let window = bucket.window_ms as u128;
    let overlap = window - bucket.elapsed_ms as u128;

    let scaled_effective = counts.current as u128 * window + counts.previous as u128 * overlap;
    let scaled_limit = limit as u128 * window;

    if scaled_effective <= scaled_limit {
        let remaining = (scaled_limit - scaled_effective) / window;
        (true, remaining.min(u64::MAX as u128) as u64)
    } else {
        (false, 0)
    }
}

/// Evaluates single-scope checks against the counter store.
pub struct SlidingWindowLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Record one event for `identifier` and decide whether it is admitted.
    ///
    /// The event is recorded even when it is denied. Callers must not
    /// retry a denied check. A policy that fails validation is rejected
    /// before the store is touched.
    pub async fn check(&self, policy: &WindowPolicy, identifier: &str) -> Result<ScopeDecision> {
        policy.validate()?;
        let now = self.clock.now();
        let bucket = Bucket::at(now, policy.window_ms());

        let current_key = policy.bucket_key(identifier, bucket.index);
        let previous_key = policy.bucket_key(identifier, bucket.previous_index());

        trace!(
            key = %current_key,
            limit = policy.limit,
            elapsed_ms = bucket.elapsed_ms,
            "Checking sliding window"
        );

        // The current bucket must outlive the next one, where it is read
        // back as the previous bucket.
        let counts = self
            .store
            .increment(&current_key, &previous_key, policy.window * 2)
            .await?;

        let (allowed, remaining) = weigh(policy.limit, &bucket, &counts);
        let reset_at = DateTime::<Utc>::from_timestamp_millis(bucket.end_ms() as i64).unwrap_or(now);

        if !allowed {
            debug!(
                key = %current_key,
                current = counts.current,
                previous = counts.previous,
                limit = policy.limit,
                "Sliding window limit exceeded"
            );
        }

        Ok(ScopeDecision {
            allowed,
            limit: policy.limit,
            remaining,
            reset_at,
            counts,
        })
    }

    /// Forget every event recorded for `identifier` under `policy`.
    pub async fn reset(&self, policy: &WindowPolicy, identifier: &str) -> Result<()> {
        policy.validate()?;
        let bucket = Bucket::at(self.clock.now(), policy.window_ms());
        let current_key = policy.bucket_key(identifier, bucket.index);
        let previous_key = policy.bucket_key(identifier, bucket.previous_index());

        futures::try_join!(
            self.store.delete(&current_key),
            self.store.delete(&previous_key)
        )?;

        debug!(key = %current_key, "Sliding window reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuardError;
    use crate::ratelimit::clock::ManualClock;
    use crate::store::testing::FailingStore;
    use crate::store::MemoryStore;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::time::Duration;

    fn aligned_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, SlidingWindowLimiter) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(aligned_start()));
        let limiter = SlidingWindowLimiter::new(store.clone(), clock.clone());
        (store, clock, limiter)
    }

    fn ip_policy() -> WindowPolicy {
        WindowPolicy::new(3, Duration::from_secs(15 * 60), "ratelimit:signup:ip")
    }

    #[test]
    fn test_weigh_without_previous() {
        let bucket = Bucket { index: 1, elapsed_ms: 500, window_ms: 1000 };
        let counts = BucketCounts { current: 1, previous: 0 };
        assert_eq!(weigh(3, &bucket, &counts), (true, 2));

        let counts = BucketCounts { current: 4, previous: 0 };
        assert_eq!(weigh(3, &bucket, &counts), (false, 0));
    }

    #[test]
    fn test_weigh_scales_previous_by_overlap() {
        // Half the previous bucket still overlaps: 10 * 0.5 + 5 = 10
        let bucket = Bucket { index: 1, elapsed_ms: 30_000, window_ms: 60_000 };
        let counts = BucketCounts { current: 5, previous: 10 };
        assert_eq!(weigh(10, &bucket, &counts), (true, 0));

        let counts = BucketCounts { current: 6, previous: 10 };
        assert_eq!(weigh(10, &bucket, &counts), (false, 0));

        // A quarter overlaps: 8 * 0.25 + 1 = 3, floor(10 - 3) = 7
        let bucket = Bucket { index: 1, elapsed_ms: 45_000, window_ms: 60_000 };
        let counts = BucketCounts { current: 1, previous: 8 };
        assert_eq!(weigh(10, &bucket, &counts), (true, 7));
    }

    #[test]
    fn test_weigh_rounds_remaining_down() {
        // 1 * 0.75 + 1 = 1.75, so 3.25 more would fit; report 3.
        let bucket = Bucket { index: 1, elapsed_ms: 1, window_ms: 4 };
        let counts = BucketCounts { current: 1, previous: 1 };
        assert_eq!(weigh(5, &bucket, &counts), (true, 3));
    }

    #[test]
    fn test_bucket_boundaries() {
        let now = aligned_start() + ChronoDuration::seconds(75);
        let bucket = Bucket::at(now, 60_000);
        assert_eq!(bucket.elapsed_ms, 15_000);
        assert_eq!(bucket.start_ms() as i64, (aligned_start() + ChronoDuration::seconds(60)).timestamp_millis());
        assert_eq!(bucket.end_ms() - bucket.start_ms(), 60_000);
        assert_eq!(bucket.previous_index(), bucket.index - 1);
    }

    #[tokio::test]
    async fn test_fourth_attempt_is_denied() {
        let (_store, _clock, limiter) = setup();
        let policy = ip_policy();

        for expected in [2, 1, 0] {
            let decision = limiter.check(&policy, "9.9.9.9").await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected);
            assert_eq!(decision.limit, 3);
        }

        let decision = limiter.check(&policy, "9.9.9.9").await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_at, aligned_start() + ChronoDuration::minutes(15));
    }

    #[tokio::test]
    async fn test_limit_plus_one_within_window_is_denied() {
        let (_store, clock, limiter) = setup();
        let policy = WindowPolicy::new(5, Duration::from_secs(3600), "ratelimit:signup:email");

        clock.advance(ChronoDuration::minutes(1));
        for _ in 0..5 {
            let decision = limiter.check(&policy, "a@example.com").await.unwrap();
            assert!(decision.allowed);
            assert!(decision.remaining <= 4);
            clock.advance(ChronoDuration::minutes(10));
        }

        let decision = limiter.check(&policy, "a@example.com").await.unwrap();
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn test_denied_attempts_are_still_recorded() {
        let (store, _clock, limiter) = setup();
        let policy = ip_policy();

        for _ in 0..5 {
            limiter.check(&policy, "9.9.9.9").await.unwrap();
        }

        let bucket = Bucket::at(aligned_start(), policy.window_ms());
        let key = policy.bucket_key("9.9.9.9", bucket.index);
        assert_eq!(store.get(&key), Some(5));
    }

    #[tokio::test]
    async fn test_previous_bucket_carries_over() {
        let (_store, clock, limiter) = setup();
        let policy = WindowPolicy::new(10, Duration::from_secs(60), "ratelimit:login:ip");

        for _ in 0..10 {
            assert!(limiter.check(&policy, "1.2.3.4").await.unwrap().allowed);
        }

        // Halfway through the next bucket, half of the previous ten count.
        clock.advance(ChronoDuration::seconds(90));
        for expected in [4, 3, 2, 1, 0] {
            let decision = limiter.check(&policy, "1.2.3.4").await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected);
            assert_eq!(decision.counts.previous, 10);
        }
        assert!(!limiter.check(&policy, "1.2.3.4").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_old_buckets_stop_counting() {
        let (_store, clock, limiter) = setup();
        let policy = ip_policy();

        for _ in 0..4 {
            limiter.check(&policy, "9.9.9.9").await.unwrap();
        }

        clock.advance(ChronoDuration::minutes(30));
        let decision = limiter.check(&policy, "9.9.9.9").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.counts.previous, 0);
    }

    #[tokio::test]
    async fn test_remaining_never_exceeds_limit_minus_one() {
        let (_store, clock, limiter) = setup();
        let policy = WindowPolicy::new(5, Duration::from_secs(60), "ratelimit:login:email");

        for _ in 0..40 {
            let decision = limiter.check(&policy, "b@example.com").await.unwrap();
            if decision.allowed {
                assert!(decision.remaining <= 4);
            } else {
                assert_eq!(decision.remaining, 0);
            }
            clock.advance(ChronoDuration::seconds(7));
        }
    }

    #[tokio::test]
    async fn test_identifiers_are_independent() {
        let (_store, _clock, limiter) = setup();
        let policy = ip_policy();

        for _ in 0..4 {
            limiter.check(&policy, "9.9.9.9").await.unwrap();
        }

        let decision = limiter.check(&policy, "8.8.8.8").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[tokio::test]
    async fn test_reset_matches_fresh_identifier() {
        let (_store, clock, limiter) = setup();
        let policy = ip_policy();

        for _ in 0..3 {
            limiter.check(&policy, "9.9.9.9").await.unwrap();
        }
        // Move into the next bucket so both buckets hold counts.
        clock.advance(ChronoDuration::minutes(16));
        limiter.check(&policy, "9.9.9.9").await.unwrap();

        tokio_test::assert_ok!(limiter.reset(&policy, "9.9.9.9").await);

        let reset = limiter.check(&policy, "9.9.9.9").await.unwrap();
        let fresh = limiter.check(&policy, "7.7.7.7").await.unwrap();
        assert_eq!(reset.allowed, fresh.allowed);
        assert_eq!(reset.remaining, fresh.remaining);
        assert_eq!(reset.counts, fresh.counts);
    }

    #[tokio::test]
    async fn test_sub_millisecond_window_is_rejected() {
        let (store, _clock, limiter) = setup();
        let policy = WindowPolicy::new(3, Duration::from_micros(500), "ratelimit:signup:ip");

        let err = limiter.check(&policy, "9.9.9.9").await.unwrap_err();
        assert!(matches!(err, GuardError::PolicyMisconfigured(_)));

        let err = limiter.reset(&policy, "9.9.9.9").await.unwrap_err();
        assert!(matches!(err, GuardError::PolicyMisconfigured(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_is_rejected() {
        let (_store, _clock, limiter) = setup();
        let policy = WindowPolicy::new(0, Duration::from_secs(60), "ratelimit:login:ip");

        let err = limiter.check(&policy, "9.9.9.9").await.unwrap_err();
        assert!(matches!(err, GuardError::PolicyMisconfigured(_)));
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced() {
        let clock = Arc::new(ManualClock::new(aligned_start()));
        let limiter = SlidingWindowLimiter::new(Arc::new(FailingStore::default()), clock);

        let err = limiter.check(&ip_policy(), "9.9.9.9").await.unwrap_err();
        assert!(matches!(err, GuardError::StoreUnavailable(_)));

        let err = limiter.reset(&ip_policy(), "9.9.9.9").await.unwrap_err();
        assert!(err.is_store_unavailable());
    }
}

//! # Fibonacci Backoff
//!
//! Provides a Fibonacci-based backoff for retrying failed reconcile passes.
//! It grows more slowly than exponential backoff, so an object that keeps
//! failing is retried often at first without hammering the API server later.
//!
//! Sequence for a 1s minimum and 300s cap: 1s, 1s, 2s, 3s, 5s, 8s, 13s, ...,
//! 233s, 300s (max).
//!
//! Consecutive error counts are tracked per object and reset on the first
//! successful pass. Conflicts never reach this module; they are requeued
//! immediately.

use crate::key::ObjectKey;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Fibonacci backoff calculator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FibonacciBackoff {
    /// First two delays
    min: Duration,
    /// Cap for every delay
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a backoff starting at `min` and capped at `max`.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// Delay before retrying after `error_count` consecutive errors (1-based).
    ///
    /// Counts 0 and 1 both return `min`; each later value is the sum of the
    /// previous two, capped at `max`.
    #[must_use]
    pub fn delay_for(&self, error_count: u32) -> Duration {
        if error_count <= 2 {
            return self.min.min(self.max);
        }

        let mut prev = self.min;
        let mut current = self.min;
        for _ in 2..error_count {
            let next = prev.saturating_add(current);
            prev = current;
            current = next.min(self.max);

            // Once capped the sequence stays at max
            if current >= self.max {
                break;
            }
        }

        current
    }
}

/// Failures recorded for one object.
#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    count: u32,
    last_failure: Instant,
}

/// Per-object consecutive error counts.
///
/// Shared by concurrent passes; distinct keys never contend on one lock.
/// A failing object is retried at least every `max` delay, so a record
/// untouched for twice that long belongs to an object that was deleted
/// while failing and is dropped.
#[derive(Debug)]
pub struct RetryTracker {
    backoff: FibonacciBackoff,
    errors: DashMap<ObjectKey, FailureRecord>,
}

impl RetryTracker {
    /// Creates a tracker using `backoff` for delays.
    pub fn new(backoff: FibonacciBackoff) -> Self {
        Self {
            backoff,
            errors: DashMap::new(),
        }
    }

    /// Records a failed pass and returns the retry count and delay before the
    /// next attempt.
    pub fn record_failure(&self, key: &ObjectKey) -> (u32, Duration) {
        let now = Instant::now();
        self.evict_stale(now);

        let retries = {
            let mut entry = self.errors.entry(key.clone()).or_insert(FailureRecord {
                count: 0,
                last_failure: now,
            });
            entry.count = entry.count.saturating_add(1);
            entry.last_failure = now;
            entry.count
        };
        (retries, self.backoff.delay_for(retries))
    }

    /// Forgets the error history of `key` after a successful pass.
    pub fn reset(&self, key: &ObjectKey) {
        self.errors.remove(key);
    }

    /// Consecutive errors recorded for `key`.
    pub fn error_count(&self, key: &ObjectKey) -> u32 {
        self.errors.get(key).map_or(0, |record| record.count)
    }

    /// Number of objects with recorded failures.
    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.errors.len()
    }

    fn evict_stale(&self, now: Instant) {
        let stale_after = self.backoff.max.saturating_mul(2);
        self.errors
            .retain(|_, record| now.saturating_duration_since(record.last_failure) <= stale_after);
    }
}

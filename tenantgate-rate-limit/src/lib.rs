use dashmap::DashMap;
use std::borrow::Borrow;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tenantgate_core::BackoffSettings;
use tokio::time::Instant;

/// Roughly thirty years; stands in for deadlines that overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + delay`, saturating to [`FAR_FUTURE`] when the sum overflows.
fn deadline(start: Instant, delay: Duration) -> Instant {
    start
        .checked_add(delay)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// Exponential backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Failures after which the key is blocked until its `reset_at`.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Upper bound applied to an upstream `retry_after` hint.
    pub max_retry_after: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(8),
            max_retry_after: Duration::from_secs(60 * 60),
        }
    }
}

impl From<&BackoffSettings> for BackoffPolicy {
    fn from(settings: &BackoffSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: settings.base_delay(),
            multiplier: settings.multiplier,
            max_delay: settings.max_delay(),
            max_retry_after: settings.max_retry_after(),
        }
    }
}

impl BackoffPolicy {
    /// Delay after the `attempt`-th consecutive failure (1-based):
    /// `min(max_delay, base_delay * multiplier^(attempt - 1))`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let nanos = self.base_delay.as_nanos() as f64 * self.multiplier.powi(exponent);
        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            self.max_delay
        } else {
            Duration::from_nanos(nanos.round() as u64)
        }
    }
}

/// Backoff bookkeeping for a single key.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffState {
    pub attempt_count: u32,
    pub reset_at: Instant,
    pub last_retry_after_hint: Option<Duration>,
}

/// Per-key exponential backoff tracker.
///
/// Each key gets its own independent state. A key is blocked once it has
/// failed `max_attempts` times and its current delay has not elapsed; a
/// successful lookup should [`clear`](Self::clear) it.
#[derive(Clone)]
pub struct BackoffTracker<K = String> {
    states: Arc<DashMap<K, BackoffState>>,
    policy: BackoffPolicy,
}

impl<K: Eq + Hash + Clone + Debug> Default for BackoffTracker<K> {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

impl<K: Eq + Hash + Clone + Debug> BackoffTracker<K> {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            states: Arc::new(DashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Whether lookups for `key` must not be retried right now.
    pub fn is_blocked<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.states
            .get(key)
            .map(|state| {
                state.attempt_count >= self.policy.max_attempts && Instant::now() < state.reset_at
            })
            .unwrap_or(false)
    }

    /// Record a failed lookup for `key` and return the delay before the
    /// next attempt. An upstream `retry_after` hint, capped at
    /// `max_retry_after`, takes precedence over the computed schedule.
    pub fn record_failure<Q>(&self, key: &Q, retry_after: Option<Duration>) -> Duration
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let now = Instant::now();
        let retry_after = retry_after.map(|hint| hint.min(self.policy.max_retry_after));
        let mut entry = self
            .states
            .entry(key.to_owned())
            .or_insert_with(|| BackoffState {
                attempt_count: 0,
                reset_at: now,
                last_retry_after_hint: None,
            });

        let state = entry.value_mut();
        state.attempt_count = state.attempt_count.saturating_add(1);
        let attempts = state.attempt_count;
        let delay = retry_after.unwrap_or_else(|| self.policy.delay_for(attempts));
        state.reset_at = deadline(now, delay);
        state.last_retry_after_hint = retry_after;

        if attempts >= self.policy.max_attempts {
            tracing::warn!(
                key = ?entry.key(),
                attempts,
                delay_ms = delay.as_millis() as u64,
                "upstream lookups blocked by backoff"
            );
        } else {
            tracing::debug!(
                key = ?entry.key(),
                attempts,
                delay_ms = delay.as_millis() as u64,
                "upstream lookup failure recorded"
            );
        }
        delay
    }

    /// Forget all backoff state for `key`.
    pub fn clear<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.states.remove(key);
    }

    /// Snapshot of the state for `key`, if any.
    pub fn state<Q>(&self, key: &Q) -> Option<BackoffState>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.states.get(key).map(|state| state.value().clone())
    }

    /// Time left until `key` may be retried, or `None` when it is not blocked.
    pub fn remaining<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if !self.is_blocked(key) {
            return None;
        }
        self.states
            .get(key)
            .map(|state| state.reset_at.saturating_duration_since(Instant::now()))
    }

    /// Drop states whose `reset_at` passed more than `idle` ago.
    pub fn purge_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.states.len();
        self.states.retain(|_, state| now < deadline(state.reset_at, idle));
        before - self.states.len()
    }

    /// Number of keys with recorded failures.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_schedule_doubles_then_caps() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (1..=6).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 8, 8]);
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), policy.max_delay);
    }

    #[test]
    fn multiplier_of_one_is_constant() {
        let policy = BackoffPolicy {
            multiplier: 1.0,
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.delay_for(1), policy.delay_for(5));
    }
}

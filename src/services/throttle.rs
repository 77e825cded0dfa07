//! Per-identifier login failure counter with timed lockout.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::config::{AuthThrottleConfig, MAX_PENALTY_MINUTES};
use crate::services::sharded::ShardedMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginAttemptRecord {
    pub attempts: u32,
    pub last_attempt: DateTime<Utc>,
}

impl LoginAttemptRecord {
    /// Shared by the lazy check and the background sweep.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, lockout: Duration) -> bool {
        now - self.last_attempt >= lockout
    }
}

pub struct LoginThrottle {
    records: ShardedMap<LoginAttemptRecord>,
    max_attempts: u32,
    lockout: Duration,
}

impl LoginThrottle {
    #[must_use]
    pub fn new(config: &AuthThrottleConfig) -> Self {
        Self {
            records: ShardedMap::default(),
            max_attempts: config.max_attempts,
            lockout: minutes(config.lockout_minutes.min(MAX_PENALTY_MINUTES)),
        }
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the remaining lockout if `identifier` is locked.
    #[must_use]
    pub fn check_locked(&self, identifier: &str) -> Option<Duration> {
        self.check_locked_at(identifier, Utc::now())
    }

    pub fn check_locked_at(&self, identifier: &str, now: DateTime<Utc>) -> Option<Duration> {
        let key = normalize(identifier);
        self.records.update(&key, |slot| {
            let record = (*slot)?;
            if record.is_stale(now, self.lockout) {
                debug!(identifier = %key, "Login lockout window elapsed, resetting");
                *slot = None;
                return None;
            }
            (record.attempts >= self.max_attempts)
                .then(|| self.lockout - (now - record.last_attempt))
        })
    }

    /// Checks the lock and counts the attempt under one shard lock, so
    /// concurrent logins for the same identifier cannot overshoot the limit.
    ///
    /// Returns the attempts left if this one fails, or the remaining lockout.
    /// A successful login clears the count through [`Self::record_success`].
    pub fn begin_attempt(&self, identifier: &str) -> Result<u32, Duration> {
        self.begin_attempt_at(identifier, Utc::now())
    }

    pub fn begin_attempt_at(&self, identifier: &str, now: DateTime<Utc>) -> Result<u32, Duration> {
        let key = normalize(identifier);
        let attempts = self.records.update(&key, |slot| {
            if slot.as_ref().is_some_and(|r| r.is_stale(now, self.lockout)) {
                debug!(identifier = %key, "Login lockout window elapsed, resetting");
                *slot = None;
            }
            let record = slot.get_or_insert(LoginAttemptRecord {
                attempts: 0,
                last_attempt: now,
            });
            if record.attempts >= self.max_attempts {
                return Err(self.lockout - (now - record.last_attempt));
            }
            record.attempts += 1;
            record.last_attempt = now;
            Ok(record.attempts)
        })?;

        if attempts == self.max_attempts {
            warn!(identifier = %key, attempts, "Login attempt limit reached");
        }
        Ok(self.max_attempts - attempts)
    }

    /// Counts a failure and returns the attempts remaining before lockout.
    pub fn record_failure(&self, identifier: &str) -> u32 {
        self.record_failure_at(identifier, Utc::now())
    }

    pub fn record_failure_at(&self, identifier: &str, now: DateTime<Utc>) -> u32 {
        let key = normalize(identifier);
        let attempts = self.records.update(&key, |slot| {
            if slot.as_ref().is_some_and(|r| r.is_stale(now, self.lockout)) {
                *slot = None;
            }
            let record = slot.get_or_insert(LoginAttemptRecord {
                attempts: 0,
                last_attempt: now,
            });
            record.attempts = record.attempts.saturating_add(1);
            record.last_attempt = now;
            record.attempts
        });

        if attempts == self.max_attempts {
            warn!(identifier = %key, attempts, "Login locked after repeated failures");
        }
        self.max_attempts.saturating_sub(attempts)
    }

    pub fn record_success(&self, identifier: &str) {
        self.records.remove(&normalize(identifier));
    }

    /// Current failure count, treating stale records as absent.
    #[must_use]
    pub fn attempts_at(&self, identifier: &str, now: DateTime<Utc>) -> u32 {
        self.records
            .get(&normalize(identifier))
            .filter(|r| !r.is_stale(now, self.lockout))
            .map_or(0, |r| r.attempts)
    }

    /// Evicts records whose last failure is older than the lockout window.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        self.records.retain(|r| !r.is_stale(now, self.lockout))
    }

    #[must_use]
    pub fn tracked(&self) -> usize {
        self.records.len()
    }
}

fn minutes(value: u64) -> Duration {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_minutes)
        .unwrap_or(Duration::MAX)
}

fn normalize(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// Whole minutes left on a lock, rounded up.
#[must_use]
pub fn remaining_minutes(remaining: Duration) -> u64 {
    remaining
        .num_milliseconds()
        .max(0)
        .unsigned_abs()
        .div_ceil(60_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle() -> LoginThrottle {
        LoginThrottle::new(&AuthThrottleConfig {
            max_attempts: 5,
            lockout_minutes: 30,
            sweep_interval_minutes: 60,
        })
    }

    #[test]
    fn five_failures_lock_the_identifier() {
        let t = throttle();
        let now = Utc::now();
        for i in 0..5 {
            assert!(t.check_locked_at("alice", now).is_none());
            assert_eq!(t.record_failure_at("alice", now), 4 - i);
        }
        let remaining = t.check_locked_at("alice", now).unwrap();
        assert_eq!(remaining, Duration::minutes(30));
        assert_eq!(remaining_minutes(remaining), 30);
    }

    #[test]
    fn remaining_minutes_round_up() {
        assert_eq!(remaining_minutes(Duration::minutes(30)), 30);
        assert_eq!(remaining_minutes(Duration::seconds(29 * 60 + 1)), 30);
        assert_eq!(remaining_minutes(Duration::milliseconds(1)), 1);
        assert_eq!(remaining_minutes(Duration::zero()), 0);
    }

    #[test]
    fn begin_attempt_counts_before_verification() {
        let t = throttle();
        let now = Utc::now();
        for i in 0..5 {
            assert_eq!(t.begin_attempt_at("alice", now), Ok(4 - i));
        }
        assert_eq!(t.begin_attempt_at("alice", now), Err(Duration::minutes(30)));
        assert_eq!(t.attempts_at("alice", now), 5);

        let later = now + Duration::minutes(30);
        assert_eq!(t.begin_attempt_at("alice", later), Ok(4));
    }

    #[test]
    fn success_clears_a_reserved_attempt() {
        let t = throttle();
        let now = Utc::now();
        for _ in 0..4 {
            t.begin_attempt_at("alice", now).unwrap();
        }
        t.record_success("alice");
        assert_eq!(t.attempts_at("alice", now), 0);
    }

    #[test]
    fn concurrent_attempts_never_exceed_the_limit() {
        let t = std::sync::Arc::new(throttle());
        let now = Utc::now();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let t = std::sync::Arc::clone(&t);
                std::thread::spawn(move || t.begin_attempt_at("alice", now).is_ok())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 5);
    }

    #[test]
    fn identifiers_are_case_insensitive() {
        let t = throttle();
        let now = Utc::now();
        t.record_failure_at("Alice", now);
        t.record_failure_at(" ALICE ", now);
        assert_eq!(t.attempts_at("alice", now), 2);
    }

    #[test]
    fn success_resets_counter() {
        let t = throttle();
        let now = Utc::now();
        t.record_failure_at("alice", now);
        t.record_failure_at("alice", now);
        t.record_success("alice");
        assert_eq!(t.record_failure_at("alice", now), 4);
        assert_eq!(t.attempts_at("alice", now), 1);
    }

    #[test]
    fn lock_expires_lazily() {
        let t = throttle();
        let start = Utc::now();
        for _ in 0..5 {
            t.record_failure_at("alice", start);
        }
        let almost = start + Duration::minutes(29);
        assert!(t.check_locked_at("alice", almost).is_some());

        let later = start + Duration::minutes(30);
        assert!(t.check_locked_at("alice", later).is_none());
        assert_eq!(t.tracked(), 0);

        // a fresh window starts at one
        assert_eq!(t.record_failure_at("alice", later), 4);
    }

    #[test]
    fn stale_record_restarts_on_failure_without_check() {
        let t = throttle();
        let start = Utc::now();
        for _ in 0..3 {
            t.record_failure_at("alice", start);
        }
        let later = start + Duration::minutes(31);
        assert_eq!(t.record_failure_at("alice", later), 4);
    }

    #[test]
    fn sweep_uses_same_window_as_check() {
        let t = throttle();
        let start = Utc::now();
        t.record_failure_at("old", start);
        t.record_failure_at("new", start + Duration::minutes(20));

        assert_eq!(t.sweep_at(start + Duration::minutes(30)), 1);
        assert_eq!(t.attempts_at("new", start + Duration::minutes(30)), 1);
        assert_eq!(t.tracked(), 1);
    }
}

//! Fixed-window request budget per client address, with temporary bans.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::warn;

use crate::config::{MAX_PENALTY_MINUTES, RateLimitConfig};
use crate::services::sharded::ShardedMap;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Rate limit exceeded. Try again in {} seconds", retry_secs(.retry_after))]
    Exceeded { retry_after: Duration },
}

impl RateLimitError {
    /// Whole seconds to wait, never zero.
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            Self::Exceeded { retry_after } => retry_secs(retry_after),
        }
    }
}

fn retry_secs(retry_after: &Duration) -> u64 {
    retry_after.as_secs().max(1)
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
    pub banned_until: Option<Instant>,
}

impl RateLimitEntry {
    const fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
            banned_until: None,
        }
    }

    /// A banned entry is stale once the ban has run out; an unbanned one
    /// once its window has elapsed.
    #[must_use]
    pub fn is_stale(&self, now: Instant, window: Duration) -> bool {
        match self.banned_until {
            Some(until) => now >= until,
            None => now.saturating_duration_since(self.window_start) >= window,
        }
    }
}

pub struct RateLimiter {
    entries: ShardedMap<RateLimitEntry>,
    limit: u32,
    ban: Duration,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            entries: ShardedMap::default(),
            limit: config.requests_per_minute,
            ban: Duration::from_secs(config.ban_minutes.min(MAX_PENALTY_MINUTES) * 60),
        }
    }

    /// Counts one request from `client` and returns the budget left in the
    /// current window.
    pub fn check(&self, client: &str) -> Result<u32, RateLimitError> {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: &str, now: Instant) -> Result<u32, RateLimitError> {
        self.entries.update(client, |slot| {
            if slot.as_ref().is_some_and(|e| e.is_stale(now, WINDOW)) {
                *slot = None;
            }
            let entry = slot.get_or_insert(RateLimitEntry::new(now));

            if let Some(until) = entry.banned_until {
                return Err(RateLimitError::Exceeded {
                    retry_after: until.saturating_duration_since(now),
                });
            }

            entry.count = entry.count.saturating_add(1);
            if entry.count > self.limit {
                entry.banned_until = Some(now + self.ban);
                warn!(client = %client, limit = self.limit, "Client exceeded request budget, banning");
                return Err(RateLimitError::Exceeded {
                    retry_after: self.ban,
                });
            }

            Ok(self.limit - entry.count)
        })
    }

    /// Clears expired bans and elapsed windows.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        self.entries.retain(|e| !e.is_stale(now, WINDOW))
    }

    #[must_use]
    pub fn tracked(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32, ban_minutes: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            enabled: true,
            requests_per_minute: limit,
            ban_minutes,
            sweep_interval_seconds: 60,
        })
    }

    #[test]
    fn request_over_budget_is_rejected() {
        let rl = limiter(100, 1);
        let now = Instant::now();
        for i in 0..100 {
            assert_eq!(rl.check_at("1.2.3.4", now).unwrap(), 99 - i);
        }
        assert!(rl.check_at("1.2.3.4", now).is_err());
        // other clients are unaffected
        assert!(rl.check_at("5.6.7.8", now).is_ok());
    }

    #[test]
    fn ban_expires() {
        let rl = limiter(2, 1);
        let now = Instant::now();
        rl.check_at("c", now).unwrap();
        rl.check_at("c", now).unwrap();
        let err = rl.check_at("c", now).unwrap_err();
        assert_eq!(
            err,
            RateLimitError::Exceeded {
                retry_after: Duration::from_secs(60)
            }
        );

        let during = now + Duration::from_secs(30);
        assert!(rl.check_at("c", during).is_err());

        let after = now + Duration::from_secs(60);
        assert_eq!(rl.check_at("c", after).unwrap(), 1);
    }

    #[test]
    fn window_resets_counter() {
        let rl = limiter(2, 5);
        let now = Instant::now();
        rl.check_at("c", now).unwrap();
        rl.check_at("c", now).unwrap();
        assert_eq!(rl.check_at("c", now + WINDOW).unwrap(), 1);
    }

    #[test]
    fn sweep_drops_stale_entries_only() {
        let rl = limiter(1, 5);
        let now = Instant::now();
        rl.check_at("idle", now).unwrap();
        rl.check_at("banned", now).unwrap();
        assert!(rl.check_at("banned", now).is_err());

        assert_eq!(rl.sweep_at(now + WINDOW), 1);
        assert_eq!(rl.tracked(), 1);
        assert_eq!(rl.sweep_at(now + Duration::from_secs(300)), 1);
        assert_eq!(rl.tracked(), 0);
    }

    #[test]
    fn oversized_ban_is_capped() {
        let rl = limiter(1, u64::MAX);
        let now = Instant::now();
        rl.check_at("c", now).unwrap();
        let err = rl.check_at("c", now).unwrap_err();
        assert_eq!(err.retry_after_secs(), MAX_PENALTY_MINUTES * 60);
    }
}

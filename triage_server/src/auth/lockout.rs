//! Failed-login lockout, tracked per identity in memory.
//!
//! An identity moves `Ok -> Warning -> Locked`. Failures accumulate inside a
//! rolling window that starts at the first failure; a failure after the
//! window has passed starts a new window. Reaching `max_attempts` locks the
//! identity for `duration`. A successful login clears the entry.
//!
//! Attempts are counted when they start, under the same lock that checks for
//! a lockout, so concurrent guesses cannot all slip past the check.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub window: Duration,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutState {
    Ok,
    Warning { failures: u32, remaining: u32 },
    Locked { retry_after: Duration },
}

#[derive(Debug, Clone)]
struct AttemptWindow {
    failure_count: u32,
    window_start: Instant,
    locked_until: Option<Instant>,
}

impl AttemptWindow {
    fn fresh(now: Instant) -> Self {
        Self {
            failure_count: 0,
            window_start: now,
            locked_until: None,
        }
    }

    fn lock_remaining(&self, now: Instant) -> Option<Duration> {
        self.locked_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    fn is_stale(&self, now: Instant, policy: &LockoutPolicy) -> bool {
        match self.locked_until {
            Some(until) => until <= now,
            None => now.duration_since(self.window_start) >= policy.window,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LockoutStore {
    policy: LockoutPolicy,
    entries: Arc<Mutex<HashMap<String, AttemptWindow>>>,
}

fn key(identity: &str) -> String {
    identity.trim().to_lowercase()
}

impl LockoutStore {
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            policy,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count a login attempt against the identity before its credentials
    /// are checked.
    ///
    /// Returns `Err(retry_after)` while the identity is locked; nothing is
    /// counted then. Otherwise the attempt is counted as a failure and the
    /// resulting state is returned, which is `Locked` when this attempt used
    /// up the last one. The reservation is settled with [`Self::record_success`]
    /// or handed back with [`Self::release`].
    pub fn begin_attempt(&self, identity: &str) -> Result<LockoutState, Duration> {
        self.begin_attempt_at(identity, Instant::now())
    }

    pub fn record_success(&self, identity: &str) {
        self.entries.lock().remove(&key(identity));
    }

    /// Hand back an attempt that ended without a credential verdict.
    pub fn release(&self, identity: &str) {
        let mut entries = self.entries.lock();
        let k = key(identity);
        let Some(entry) = entries.get_mut(&k) else {
            return;
        };

        entry.failure_count = entry.failure_count.saturating_sub(1);
        if entry.failure_count < self.policy.max_attempts {
            entry.locked_until = None;
        }
        if entry.failure_count == 0 {
            entries.remove(&k);
        }
    }

    #[cfg(test)]
    pub fn check(&self, identity: &str) -> LockoutState {
        self.check_at(identity, Instant::now())
    }

    #[cfg(test)]
    fn check_at(&self, identity: &str, now: Instant) -> LockoutState {
        let mut entries = self.entries.lock();
        let k = key(identity);
        let Some(entry) = entries.get(&k) else {
            return LockoutState::Ok;
        };

        if let Some(retry_after) = entry.lock_remaining(now) {
            return LockoutState::Locked { retry_after };
        }
        if entry.is_stale(now, &self.policy) {
            entries.remove(&k);
            return LockoutState::Ok;
        }
        LockoutState::Warning {
            failures: entry.failure_count,
            remaining: self.policy.max_attempts.saturating_sub(entry.failure_count),
        }
    }

    fn begin_attempt_at(&self, identity: &str, now: Instant) -> Result<LockoutState, Duration> {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key(identity))
            .or_insert_with(|| AttemptWindow::fresh(now));

        if let Some(retry_after) = entry.lock_remaining(now) {
            return Err(retry_after);
        }
        if entry.is_stale(now, &self.policy) {
            *entry = AttemptWindow::fresh(now);
        }

        entry.failure_count += 1;
        if entry.failure_count >= self.policy.max_attempts {
            entry.locked_until = Some(now + self.policy.duration);
            crate::metrics::lockout_engaged();
            tracing::warn!(
                identity = %key(identity),
                failures = entry.failure_count,
                "Identity locked after repeated login failures"
            );
            return Ok(LockoutState::Locked {
                retry_after: self.policy.duration,
            });
        }

        Ok(LockoutState::Warning {
            failures: entry.failure_count,
            remaining: self.policy.max_attempts - entry.failure_count,
        })
    }
}

//! Per-sequence advisory lock with an expiring heartbeat (C6).
//!
//! The teacher has no multi-holder concept — a single in-process `Mutex`
//! stands in for "only one editor at a time." This generalizes that to the
//! holder/heartbeat protocol in spec.md §4.6, built in the teacher's
//! plain-struct-plus-methods idiom (`preferences::PreferenceManager`)
//! rather than pulling in a new dependency for it.
//!
//! `now` is always an explicit parameter rather than read from the clock
//! internally, so acquire/heartbeat/expiry can be tested deterministically
//! (S3 in spec.md §8 requires simulating a 125-second gap).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CoreError, ErrorCode};

/// I7: a lock is valid iff `locked_at + lock_timeout > now`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceLock {
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
}

impl SequenceLock {
    fn is_expired(&self, now: DateTime<Utc>, lock_timeout: Duration) -> bool {
        match self.locked_at {
            Some(locked_at) => {
                let elapsed = now.signed_duration_since(locked_at);
                elapsed > chrono::Duration::from_std(lock_timeout).unwrap_or(chrono::Duration::zero())
            }
            None => true,
        }
    }

    /// Is the lock currently held by anyone (i.e. not absent and not
    /// expired)?
    pub fn is_held(&self, now: DateTime<Utc>, lock_timeout: Duration) -> bool {
        self.locked_by.is_some() && !self.is_expired(now, lock_timeout)
    }

    /// Acquire on behalf of `requester`. Granted if unlocked, expired, or
    /// already held by the requester (a refresh). Otherwise returns the
    /// current holder without error — acquiring a lock you don't hold is
    /// not itself an error condition (spec.md §4.6).
    pub fn acquire(&mut self, requester: &str, now: DateTime<Utc>, lock_timeout: Duration) -> LockAcquireResult {
        if self.is_held(now, lock_timeout) {
            if self.locked_by.as_deref() == Some(requester) {
                self.locked_at = Some(now);
                return LockAcquireResult {
                    granted: true,
                    holder: requester.to_string(),
                };
            }
            return LockAcquireResult {
                granted: false,
                holder: self.locked_by.clone().unwrap_or_default(),
            };
        }
        self.locked_by = Some(requester.to_string());
        self.locked_at = Some(now);
        LockAcquireResult {
            granted: true,
            holder: requester.to_string(),
        }
    }

    /// Only the holder may heartbeat. A non-holder (including a caller
    /// whose prior hold expired and was reassigned) gets `FORBIDDEN`.
    pub fn heartbeat(&mut self, requester: &str, now: DateTime<Utc>, lock_timeout: Duration) -> Result<(), CoreError> {
        if !self.is_held(now, lock_timeout) || self.locked_by.as_deref() != Some(requester) {
            return Err(CoreError::new(
                ErrorCode::Forbidden,
                "only the current lock holder may send a heartbeat",
            ));
        }
        self.locked_at = Some(now);
        Ok(())
    }

    /// Only the holder may release. Releasing a lock you don't hold is a
    /// `FORBIDDEN`, matching heartbeat's symmetry.
    pub fn release(&mut self, requester: &str, now: DateTime<Utc>, lock_timeout: Duration) -> Result<(), CoreError> {
        if !self.is_held(now, lock_timeout) || self.locked_by.as_deref() != Some(requester) {
            return Err(CoreError::new(ErrorCode::Forbidden, "only the current lock holder may release it"));
        }
        self.locked_by = None;
        self.locked_at = None;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockAcquireResult {
    pub granted: bool,
    pub holder: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn acquire_by_same_user_refreshes_locked_at() {
        let mut lock = SequenceLock::default();
        let timeout = Duration::from_secs(120);
        lock.acquire("alice", at(0), timeout);
        let result = lock.acquire("alice", at(60), timeout);
        assert!(result.granted);
        assert_eq!(lock.locked_at, Some(at(60)));
    }

    #[test]
    fn acquire_by_other_user_fails_while_valid() {
        let mut lock = SequenceLock::default();
        let timeout = Duration::from_secs(120);
        lock.acquire("alice", at(0), timeout);
        let result = lock.acquire("bob", at(30), timeout);
        assert!(!result.granted);
        assert_eq!(result.holder, "alice");
    }

    #[test]
    fn acquire_after_expiry_succeeds_for_other_user() {
        let mut lock = SequenceLock::default();
        let timeout = Duration::from_secs(120);
        lock.acquire("alice", at(0), timeout);
        let result = lock.acquire("bob", at(125), timeout);
        assert!(result.granted);
        assert_eq!(result.holder, "bob");
    }

    #[test]
    fn heartbeat_from_expired_holder_is_forbidden_after_reassignment() {
        let mut lock = SequenceLock::default();
        let timeout = Duration::from_secs(120);
        lock.acquire("alice", at(0), timeout);
        lock.acquire("bob", at(125), timeout);
        let err = lock.heartbeat("alice", at(126), timeout).unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[test]
    fn release_by_non_holder_is_forbidden() {
        let mut lock = SequenceLock::default();
        let timeout = Duration::from_secs(120);
        lock.acquire("alice", at(0), timeout);
        let err = lock.release("bob", at(1), timeout).unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }
}

//! Multi-account credential rotation with durable cooldowns.
//!
//! Scheduling is pure logic in [`RotationState`] (no IO, no locks);
//! [`CredentialPool`] wraps it with the durable `cooldown:<i>` keys so a
//! fresh process respects cooldowns set by its predecessor.

use crate::cache::CacheHandle;
use crate::config::ForumAccount;
use crate::error::GroundswellError;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Outcome of one rotation scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextOutcome {
    /// A usable credential was found.
    Available(usize),
    /// Every credential is cooling; wait `wait_ms` then take `fallback`.
    AllCooling { wait_ms: i64, fallback: usize },
}

/// Round-robin scan state over `cooldown_until` (unix millis per credential).
#[derive(Debug)]
pub struct RotationState {
    cooldown_until_ms: Vec<i64>,
    last_index: usize,
}

impl RotationState {
    pub fn new(len: usize) -> Self {
        Self {
            cooldown_until_ms: vec![0; len],
            last_index: len.saturating_sub(1),
        }
    }

    pub fn len(&self) -> usize {
        self.cooldown_until_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cooldown_until_ms.is_empty()
    }

    /// Overwrites the local view of one credential's cooldown.
    pub fn set_cooldown(&mut self, index: usize, until_ms: i64) {
        if let Some(slot) = self.cooldown_until_ms.get_mut(index) {
            *slot = until_ms;
        }
    }

    pub fn cooldown_until(&self, index: usize) -> i64 {
        self.cooldown_until_ms.get(index).copied().unwrap_or(0)
    }

    /// Scans from `last_index + 1` for the first credential whose cooldown
    /// has expired. Repeated calls without cooldowns hand out credentials in
    /// strict round-robin.
    pub fn next_usable(&mut self, now_ms: i64) -> NextOutcome {
        let n = self.cooldown_until_ms.len();
        debug_assert!(n > 0);

        for step in 1..=n {
            let idx = (self.last_index + step) % n;
            if self.cooldown_until_ms[idx] <= now_ms {
                self.last_index = idx;
                return NextOutcome::Available(idx);
            }
        }

        // All cooling: wait for the earliest expiry, then advance round-robin
        // regardless so a stale durable cooldown can't wedge the pool.
        let earliest = self
            .cooldown_until_ms
            .iter()
            .copied()
            .min()
            .unwrap_or(now_ms);
        let fallback = (self.last_index + 1) % n;
        self.last_index = fallback;
        NextOutcome::AllCooling {
            wait_ms: (earliest - now_ms).max(0),
            fallback,
        }
    }
}

/// A credential handed out by the pool, valid until reported cooling.
#[derive(Debug, Clone)]
pub struct CredentialLease {
    pub index: usize,
    pub account: ForumAccount,
}

pub struct CredentialPool {
    accounts: Vec<ForumAccount>,
    state: Mutex<RotationState>,
    cache: CacheHandle,
}

impl CredentialPool {
    pub fn new(accounts: Vec<ForumAccount>, cache: CacheHandle) -> Self {
        let state = Mutex::new(RotationState::new(accounts.len()));
        Self {
            accounts,
            state,
            cache,
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Returns the next usable credential, sleeping until the earliest
    /// cooldown expiry when every account is cooling.
    pub async fn next(&self) -> Result<CredentialLease, GroundswellError> {
        if self.accounts.is_empty() {
            return Err(GroundswellError::NoAvailableCredential);
        }

        // Durable cooldowns first, so restarts and sibling processes are seen.
        let mut durable = Vec::with_capacity(self.accounts.len());
        for i in 0..self.accounts.len() {
            let until = self
                .cache
                .kv_get_i64(&cooldown_key(i))
                .await?
                .unwrap_or(0);
            durable.push(until);
        }

        let outcome = {
            let mut state = self.state.lock().await;
            for (i, until) in durable.into_iter().enumerate() {
                if until > state.cooldown_until(i) {
                    state.set_cooldown(i, until);
                }
            }
            state.next_usable(Utc::now().timestamp_millis())
        };

        let index = match outcome {
            NextOutcome::Available(idx) => idx,
            NextOutcome::AllCooling { wait_ms, fallback } => {
                warn!(
                    wait_ms,
                    fallback, "all credentials cooling; parking until earliest expiry"
                );
                tokio::time::sleep(Duration::from_millis(u64::try_from(wait_ms).unwrap_or(0)))
                    .await;
                fallback
            }
        };

        Ok(CredentialLease {
            index,
            account: self.accounts[index].clone(),
        })
    }

    /// Puts a credential on cooldown, locally and durably (TTL ≈ duration).
    pub async fn cooldown(
        &self,
        index: usize,
        duration: Duration,
    ) -> Result<(), GroundswellError> {
        let until_ms = Utc::now().timestamp_millis() + duration.as_millis() as i64;
        {
            let mut state = self.state.lock().await;
            state.set_cooldown(index, until_ms);
        }
        let ttl_secs = i64::try_from(duration.as_secs()).unwrap_or(60).max(1);
        self.cache
            .kv_put_i64(&cooldown_key(index), until_ms, Some(ttl_secs))
            .await?;
        info!(index, cooldown_secs = duration.as_secs(), "credential cooling");
        Ok(())
    }
}

fn cooldown_key(index: usize) -> String {
    format!("cooldown:{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_without_cooldowns() {
        let mut state = RotationState::new(3);
        let picks: Vec<_> = (0..6).map(|_| state.next_usable(1_000)).collect();
        let expected: Vec<_> = [0, 1, 2, 0, 1, 2]
            .into_iter()
            .map(NextOutcome::Available)
            .collect();
        assert_eq!(picks, expected);
    }

    #[test]
    fn skips_cooling_credentials() {
        let mut state = RotationState::new(3);
        state.set_cooldown(0, 5_000);
        state.set_cooldown(1, 5_000);
        assert_eq!(state.next_usable(1_000), NextOutcome::Available(2));
        // Index 0 still cooling, 2 was just used: wraps past 0 and 1 back to 2.
        assert_eq!(state.next_usable(1_000), NextOutcome::Available(2));
    }

    #[test]
    fn all_cooling_reports_earliest_expiry() {
        let mut state = RotationState::new(2);
        state.set_cooldown(0, 9_000);
        state.set_cooldown(1, 4_000);
        match state.next_usable(1_000) {
            NextOutcome::AllCooling { wait_ms, fallback } => {
                assert_eq!(wait_ms, 3_000);
                assert_eq!(fallback, 0);
            }
            other => panic!("expected AllCooling, got {other:?}"),
        }
    }

    #[test]
    fn expired_cooldown_is_usable_again() {
        let mut state = RotationState::new(2);
        state.set_cooldown(0, 2_000);
        assert_eq!(state.next_usable(1_000), NextOutcome::Available(1));
        assert_eq!(state.next_usable(3_000), NextOutcome::Available(0));
    }
}

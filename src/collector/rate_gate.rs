//! Token-bucket gates over `governor`.
//!
//! One gate per external resource class: forum API requests, RSS polls, LLM
//! requests and LLM tokens. Waiters park until refill and proceed in FIFO
//! order as capacity allows; tokens accumulate up to the configured burst.

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::warn;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct RateGate {
    name: &'static str,
    limiter: DirectLimiter,
    burst: u32,
}

impl RateGate {
    /// Gate refilling `per_minute` tokens a minute, accumulating up to `burst`.
    pub fn per_minute(name: &'static str, per_minute: u32, burst: u32) -> Self {
        let per_minute = NonZeroU32::new(per_minute.max(1)).expect("max(1) is non-zero");
        let burst = NonZeroU32::new(burst.max(1)).expect("max(1) is non-zero");
        Self {
            name,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute).allow_burst(burst)),
            burst: burst.get(),
        }
    }

    /// Gate releasing one token every `period`, no accumulation beyond one.
    pub fn per_period(name: &'static str, period: Duration) -> Self {
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::new(1).expect("non-zero")));
        Self {
            name,
            limiter: RateLimiter::direct(quota),
            burst: 1,
        }
    }

    /// Takes one token, parking until it is available.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Takes `n` tokens at once. Requests beyond the burst capacity are
    /// clamped so a single oversized acquisition can never deadlock.
    pub async fn acquire_n(&self, n: u32) {
        let n = if n > self.burst {
            warn!(
                gate = self.name,
                requested = n,
                burst = self.burst,
                "token acquisition clamped to burst capacity"
            );
            self.burst
        } else {
            n.max(1)
        };
        let n = NonZeroU32::new(n).expect("max(1) is non-zero");
        // InsufficientCapacity is unreachable after clamping.
        if let Err(e) = self.limiter.until_n_ready(n).await {
            warn!(gate = self.name, "rate gate acquisition failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn burst_then_park() {
        // 1 token burst, refill one per 20ms: second acquire must wait.
        let gate = RateGate::per_minute("test", 3000, 1);
        let start = Instant::now();
        gate.acquire().await;
        gate.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn oversized_acquire_is_clamped() {
        let gate = RateGate::per_minute("test", 600, 10);
        // Must not hang even though 50 > burst.
        gate.acquire_n(50).await;
    }

    #[tokio::test]
    async fn parked_waiter_proceeds_on_refill() {
        let gate = std::sync::Arc::new(RateGate::per_minute("test", 6000, 1));
        gate.acquire().await;

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                gate.acquire().await;
                true
            })
        };
        assert!(waiter.await.unwrap());
    }
}

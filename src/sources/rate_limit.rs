//! Token-bucket rate limiting for the GitHub API

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// A token bucket: `rate` tokens per `per`, holding at most `burst` tokens.
/// `acquire` waits until a token is available.
pub struct RateLimiter {
    rate: f64,
    per: Duration,
    burst: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    refreshed: Instant,
}

impl RateLimiter {
    pub fn new(rate: u64, per: Duration, burst: u64) -> Self {
        Self {
            rate: rate as f64,
            per,
            burst: burst as f64,
            state: Mutex::new(BucketState {
                tokens: burst as f64,
                refreshed: Instant::now(),
            }),
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.refreshed).as_secs_f64();
                let refill = elapsed * self.rate / self.per.as_secs_f64();
                state.tokens = (state.tokens + refill).min(self.burst);
                state.refreshed = now;
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                // Time until one full token accumulates.
                let deficit = 1.0 - state.tokens;
                Duration::from_secs_f64(deficit * self.per.as_secs_f64() / self.rate)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_is_granted_without_waiting() {
        let limiter = RateLimiter::new(60, Duration::from_secs(3600), 3);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_refill_once_burst_is_exhausted() {
        let limiter = RateLimiter::new(60, Duration::from_secs(3600), 1);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        // 60 per hour means one token per minute.
        assert!(Instant::now() - start >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_do_not_accumulate_past_burst() {
        let limiter = RateLimiter::new(60, Duration::from_secs(3600), 2);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(Instant::now(), start);
        limiter.acquire().await;
        assert!(Instant::now() > start);
    }
}

//! Token-bucket rate limiter guarding the radio's duty cycle.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Longest single sleep inside [`TokenBucket::acquire`]. The bucket is
/// re-checked after every sleep, so this only bounds one step.
const MAX_REFILL_WAIT: Duration = Duration::from_secs(3600);

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill_at: Instant,
}

/// Token bucket. Starts full; one token per dispatched command.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_rate: f64,
    enabled: bool,
}

impl TokenBucket {
    /// Create a bucket holding `burst` tokens and refilling at
    /// `per_second` tokens per second.
    pub fn new(enabled: bool, per_second: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill_at: Instant::now(),
            }),
            capacity,
            refill_rate: per_second,
            enabled,
        }
    }

    /// A bucket that never waits.
    pub fn unlimited() -> Self {
        Self::new(false, 0.0, 1)
    }

    /// Whether `acquire` can ever wait.
    pub fn is_limiting(&self) -> bool {
        self.enabled && self.refill_rate > 0.0
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Take a token, sleeping until one is available. Returns the time
    /// spent waiting.
    pub async fn acquire(&self) -> Duration {
        if !self.is_limiting() {
            return Duration::ZERO;
        }

        let started = Instant::now();
        loop {
            let wait = {
                let mut state = self.state.lock();
                self.refill(&mut state, Instant::now());
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    self.check(&state);
                    return started.elapsed();
                }
                refill_wait(1.0 - state.tokens, self.refill_rate)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        if !self.is_limiting() {
            return true;
        }
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            self.check(&state);
            true
        } else {
            false
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    pub async fn try_acquire_within(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.acquire()).await.is_ok()
    }

    /// Tokens available now, without consuming any. `-1.0` when the
    /// limiter is disabled.
    pub fn available_tokens(&self) -> f64 {
        if !self.is_limiting() {
            return -1.0;
        }
        let state = self.state.lock();
        let elapsed = Instant::now()
            .saturating_duration_since(state.last_refill_at)
            .as_secs_f64();
        (state.tokens + elapsed * self.refill_rate).min(self.capacity)
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill_at).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill_at = now;
        self.check(state);
    }

    fn check(&self, state: &BucketState) {
        debug_assert!(
            state.tokens >= 0.0 && state.tokens <= self.capacity,
            "token count {} outside [0, {}]",
            state.tokens,
            self.capacity
        );
    }
}

/// Time to accumulate `missing` tokens, capped at [`MAX_REFILL_WAIT`].
fn refill_wait(missing: f64, refill_rate: f64) -> Duration {
    Duration::try_from_secs_f64(missing / refill_rate)
        .unwrap_or(MAX_REFILL_WAIT)
        .min(MAX_REFILL_WAIT)
}

//! Token bucket limiter with continuously refilling fractional tokens.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::admission::Admission;
use crate::error::{Result, TurnstileError};

/// Default bucket capacity.
pub const DEFAULT_CAPACITY: f64 = 10.0;
/// Default refill rate in tokens per second.
pub const DEFAULT_RATE: f64 = 1.0;
/// Absolute tolerance used when comparing available tokens against a cost.
pub const TOKEN_EPSILON: f64 = 1e-12;

/// A token bucket rate limiter.
///
/// The bucket holds up to `capacity` fractional tokens and regains `rate`
/// tokens per second of elapsed wall-clock time. Each admission consumes
/// `cost` tokens. The bucket starts full, so a fresh bucket admits a burst
/// of up to `capacity` before falling back to the steady refill rate.
///
/// All state lives behind a single mutex, so the refill and the
/// check-then-deduct step happen atomically for concurrent callers.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    /// Maximum number of tokens the bucket can hold
    capacity: f64,
    /// Currently available tokens, always within `[0, capacity]`
    tokens: f64,
    /// Tokens added per second
    rate: f64,
    /// When the last refill was computed
    last_refill: Instant,
}

impl BucketState {
    /// Add tokens for the time elapsed since the last refill.
    fn refill(&mut self, now: Instant) {
        // An instant at or before the last refill contributes nothing.
        if now <= self.last_refill {
            return;
        }

        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }
}

impl TokenBucket {
    /// Create a full bucket holding `capacity` tokens and refilling at `rate` tokens per second.
    pub fn new(capacity: f64, rate: f64) -> Result<Self> {
        Self::starting_at(capacity, rate, Instant::now())
    }

    /// Create a full bucket whose refill clock starts at `start`.
    pub fn starting_at(capacity: f64, rate: f64, start: Instant) -> Result<Self> {
        validate_capacity(capacity)?;
        validate_rate(rate)?;

        Ok(Self {
            state: Mutex::new(BucketState {
                capacity,
                tokens: capacity,
                rate,
                last_refill: start,
            }),
        })
    }

    /// Try to admit a request consuming `cost` tokens.
    ///
    /// Returns `true` and deducts the tokens if enough are available,
    /// otherwise returns `false` and leaves the bucket untouched.
    pub fn allow(&self, cost: f64) -> bool {
        self.allow_at(cost, Instant::now())
    }

    /// Try to admit a request consuming `cost` tokens, as observed at `now`.
    ///
    /// A negative or NaN cost is never admitted, and an empty-capacity
    /// bucket admits only zero-cost requests.
    pub fn allow_at(&self, cost: f64, now: Instant) -> bool {
        if cost.is_nan() || cost < 0.0 {
            trace!(cost, "Rejecting request with invalid cost");
            return false;
        }

        let mut state = self.state.lock();
        state.refill(now);

        if state.capacity == 0.0 && cost > 0.0 {
            trace!(cost, "Zero-capacity bucket rejected request");
            return false;
        }

        if state.tokens + TOKEN_EPSILON >= cost {
            state.tokens = (state.tokens - cost).max(0.0);
            trace!(cost, remaining = state.tokens, "Token bucket admitted request");
            true
        } else {
            trace!(cost, available = state.tokens, "Token bucket rejected request");
            false
        }
    }

    /// Replace the refill rate.
    ///
    /// Tokens accrued up to this instant are credited at the old rate first.
    pub fn set_rate(&self, rate: f64) -> Result<()> {
        self.set_rate_at(rate, Instant::now())
    }

    /// Replace the refill rate as observed at `now`.
    pub fn set_rate_at(&self, rate: f64, now: Instant) -> Result<()> {
        validate_rate(rate)?;

        let mut state = self.state.lock();
        state.refill(now);
        debug!(old_rate = state.rate, new_rate = rate, "Token bucket rate changed");
        state.rate = rate;
        Ok(())
    }

    /// Replace the capacity, dropping any tokens above the new capacity.
    pub fn set_capacity(&self, capacity: f64) -> Result<()> {
        self.set_capacity_at(capacity, Instant::now())
    }

    /// Replace the capacity as observed at `now`.
    pub fn set_capacity_at(&self, capacity: f64, now: Instant) -> Result<()> {
        validate_capacity(capacity)?;

        let mut state = self.state.lock();
        state.refill(now);
        debug!(
            old_capacity = state.capacity,
            new_capacity = capacity,
            "Token bucket capacity changed"
        );
        state.capacity = capacity;
        if state.tokens > capacity {
            state.tokens = capacity;
        }
        Ok(())
    }

    /// Get the tokens available right now.
    pub fn available(&self) -> f64 {
        self.available_at(Instant::now())
    }

    /// Get the tokens available at `now`, after refilling.
    pub fn available_at(&self, now: Instant) -> f64 {
        let mut state = self.state.lock();
        state.refill(now);
        state.tokens
    }

    /// Get the capacity of this bucket.
    pub fn capacity(&self) -> f64 {
        self.state.lock().capacity
    }

    /// Get the refill rate in tokens per second.
    pub fn rate(&self) -> f64 {
        self.state.lock().rate
    }

    /// Get how long until a request of `cost` could be admitted.
    ///
    /// Returns `None` when the cost can never be satisfied with the current
    /// configuration: it exceeds the capacity, or the bucket does not refill.
    pub fn time_until_available(&self, cost: f64) -> Option<Duration> {
        self.time_until_available_at(cost, Instant::now())
    }

    /// Get how long after `now` a request of `cost` could be admitted.
    pub fn time_until_available_at(&self, cost: f64, now: Instant) -> Option<Duration> {
        if cost.is_nan() || cost < 0.0 {
            return None;
        }

        let mut state = self.state.lock();
        state.refill(now);

        if cost > state.capacity + TOKEN_EPSILON {
            return None;
        }

        let deficit = cost - state.tokens;
        if deficit <= TOKEN_EPSILON {
            return Some(Duration::ZERO);
        }
        if state.rate <= 0.0 {
            return None;
        }

        Duration::try_from_secs_f64(deficit / state.rate).ok()
    }
}

impl Admission for TokenBucket {
    fn admit(&self) -> bool {
        self.allow(1.0)
    }

    fn algorithm(&self) -> &'static str {
        "token_bucket"
    }
}

fn validate_capacity(capacity: f64) -> Result<()> {
    if !capacity.is_finite() || capacity < 0.0 {
        return Err(TurnstileError::InvalidLimiter(format!(
            "capacity must be finite and non-negative, got {}",
            capacity
        )));
    }
    Ok(())
}

fn validate_rate(rate: f64) -> Result<()> {
    if !rate.is_finite() || rate < 0.0 {
        return Err(TurnstileError::InvalidLimiter(format!(
            "rate must be finite and non-negative, got {}",
            rate
        )));
    }
    Ok(())
}

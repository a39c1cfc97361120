use std::time::Instant;

/// A continuous-refill token bucket. Unlike the daily-rollover counters
/// it's generalized from, a `TokenBucket` never needs an explicit reset
/// — `refill` is called lazily on every `try_take` and tops the bucket
/// up for however long has elapsed since the last call.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Attempt to take `cost` tokens. Returns `true` (and debits the
    /// bucket) if enough were available.
    pub fn try_take(&mut self, cost: f64) -> bool {
        self.refill(Instant::now());
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// How long until `cost` tokens will be available. Zero when they
    /// already are; `Duration::MAX` when the bucket never refills.
    pub fn retry_after(&mut self, cost: f64) -> std::time::Duration {
        self.refill(Instant::now());
        let deficit = cost - self.tokens;
        if deficit <= 0.0 {
            return std::time::Duration::ZERO;
        }
        if self.refill_per_sec <= 0.0 {
            return std::time::Duration::MAX;
        }
        std::time::Duration::try_from_secs_f64(deficit / self.refill_per_sec)
            .unwrap_or(std::time::Duration::MAX)
    }

    pub fn remaining(&mut self) -> f64 {
        self.refill(Instant::now());
        self.tokens
    }

    pub fn idle_for(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.last_refill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn starts_full() {
        let mut bucket = TokenBucket::new(5.0, 1.0);
        assert_eq!(bucket.remaining().floor(), 5.0);
    }

    #[test]
    fn depletes_and_blocks() {
        let mut bucket = TokenBucket::new(2.0, 0.0);
        assert!(bucket.try_take(1.0));
        assert!(bucket.try_take(1.0));
        assert!(!bucket.try_take(1.0));
    }

    #[test]
    fn refills_over_time() {
        let mut bucket = TokenBucket::new(1.0, 1000.0);
        assert!(bucket.try_take(1.0));
        assert!(!bucket.try_take(1.0));
        sleep(Duration::from_millis(5));
        assert!(bucket.try_take(1.0));
    }

    #[test]
    fn larger_cost_drains_faster() {
        let mut bucket = TokenBucket::new(5.0, 0.0);
        assert!(bucket.try_take(4.0));
        assert!(!bucket.try_take(2.0));
        assert!(bucket.try_take(1.0));
    }

    #[test]
    fn retry_after_scales_with_deficit() {
        let mut bucket = TokenBucket::new(1.0, 2.0);
        assert!(bucket.try_take(1.0));
        let wait = bucket.retry_after(1.0);
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_millis(500));
    }

    #[test]
    fn retry_after_without_refill_is_forever() {
        let mut bucket = TokenBucket::new(1.0, 0.0);
        assert!(bucket.try_take(1.0));
        assert_eq!(bucket.retry_after(1.0), Duration::MAX);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut bucket = TokenBucket::new(3.0, 1000.0);
        sleep(Duration::from_millis(10));
        assert_eq!(bucket.remaining(), 3.0);
    }
}

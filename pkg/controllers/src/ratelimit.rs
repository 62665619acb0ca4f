//! Token bucket bounding how often the reconciliation worker runs.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket with a fixed refill rate (tokens per second) and capacity.
///
/// A non-positive rate disables limiting.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(refill_rate: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take a token, or report how long until one is available.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        if self.refill_rate <= 0.0 {
            return Ok(());
        }

        let mut state = self.state.lock().unwrap_or_else(|poisoned| {
            warn!("token bucket lock poisoned, recovering");
            poisoned.into_inner()
        });

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&self) {
        while let Err(wait) = self.try_acquire() {
            debug!("rate limited, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }
}

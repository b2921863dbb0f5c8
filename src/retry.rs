//! Bounded retry with fixed or exponential backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Delay strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * 2^attempt` with ±30% jitter.
    Exponential { base: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(attempts: u32, gap: Duration) -> Self {
        Self {
            attempts,
            backoff: Backoff::Fixed(gap),
        }
    }

    pub fn exponential(attempts: u32, base: Duration) -> Self {
        Self {
            attempts,
            backoff: Backoff::Exponential { base },
        }
    }

    /// A policy that never retries.
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(gap) => gap,
            Backoff::Exponential { base } => calculate_backoff_delay(attempt, base),
        }
    }
}

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff_delay(attempt: u32, base: Duration) -> Duration {
    // Cap the exponent to prevent overflow
    let capped_attempt = attempt.min(10);
    let base_delay = base.saturating_mul(2_u32.saturating_pow(capped_attempt));

    let jitter_factor = rand::thread_rng().gen_range(0.7..1.3);
    base_delay.mul_f64(jitter_factor)
}

/// Run `op` until it succeeds, the error is not retryable, or the attempts
/// are exhausted. The last error is returned.
pub async fn retry<T, E, F, Fut, R>(policy: RetryPolicy, is_retryable: R, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt >= attempts || !is_retryable(&e) {
                    return Err(e);
                }
                let delay = policy.delay_for(attempt - 1);
                warn!(
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after error: {}",
                    e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

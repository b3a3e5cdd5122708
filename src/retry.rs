//! Retry policy for per-page uploads.
//!
//! Only page uploads are retried; opening the session is not. The policy is
//! a small value type so the loop in [`crate::pipeline::pages`] does not
//! change when a different delay schedule is wanted.
//!
//! The default matches the long-standing client behaviour: 3 retries
//! (4 attempts in total) with no delay between attempts. Immediate retries
//! can hammer a struggling server, so [`Backoff::Exponential`] is available
//! for callers that want it.

use crate::error::UploadError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Retries after a failed page upload before the whole run fails.
pub const NR_OF_RETRIES_ON_FAIL: u32 = 3;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Backoff {
    /// Retry immediately.
    #[default]
    None,
    /// Wait the same amount before every retry.
    Fixed { delay_ms: u64 },
    /// `base_ms * 2^(retry - 1)`, capped at `max_ms`.
    Exponential { base_ms: u64, max_ms: u64 },
}

impl Backoff {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Exponential { base_ms, max_ms } => {
                let factor = 2u64.saturating_pow(retry.saturating_sub(1));
                Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
            }
        }
    }
}

/// How often and how patiently a failed operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: NR_OF_RETRIES_ON_FAIL,
            backoff: Backoff::None,
        }
    }
}

/// All attempts failed.
#[derive(Debug)]
pub struct RetryExhausted {
    pub attempts: u32,
    /// Error of the final attempt.
    pub last_error: UploadError,
}

impl RetryPolicy {
    /// Retry `max_retries` times with no delay.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::None,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number. On success the value is
    /// returned together with the number of attempts it took.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<(T, u32), RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, UploadError>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(e) => {
                    warn!("{}: attempt {}/{} failed: {}", label, attempt, max_attempts, e);
                    if attempt >= max_attempts {
                        return Err(RetryExhausted {
                            attempts: attempt,
                            last_error: e,
                        });
                    }
                }
            }

            let delay = self.backoff.delay(attempt);
            if !delay.is_zero() {
                sleep(delay).await;
            }
            attempt += 1;
        }
    }
}

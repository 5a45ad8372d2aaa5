//! Retry helper for idempotent RPC reads.
//!
//! Submissions must never go through here: a retried send can double-spend
//! when the first attempt landed but its response was lost.

use anyhow::{Context, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms: base_delay_ms * 20,
            ..Default::default()
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Exponential backoff for the given zero-based attempt, capped and
    /// optionally jittered by up to 50% either way.
    fn backoff(&self, attempt: u32) -> Duration {
        let capped = (self.base_delay_ms as f64 * self.exponential_base.powi(attempt as i32))
            .min(self.max_delay_ms as f64);
        let factor = if self.jitter {
            rand::thread_rng().gen_range(0.5..=1.5)
        } else {
            1.0
        };
        Duration::from_millis((capped * factor) as u64)
    }
}

/// Lowercased fragments of errors worth another attempt.
const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "network error",
    "temporary failure",
    "service unavailable",
    "bad gateway",
    "rate limited",
    "too many requests",
    "429",
    "database is locked",
];

/// Run `read`, retrying while it fails with a transient error. Permanent
/// errors are returned on the first occurrence.
pub async fn with_retry<T, F, Fut>(config: RetryConfig, label: &str, read: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        let err = match read().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{} recovered after {} retries", label, attempt);
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if attempt >= config.max_retries || !is_transient_error(&err) {
            let attempts = attempt + 1;
            return Err(err).with_context(|| format!("{} failed after {} attempt(s)", label, attempts));
        }

        let wait = config.backoff(attempt);
        attempt += 1;
        debug!(
            "{} hit a transient error ({}), retry {}/{} in {:?}",
            label, err, attempt, config.max_retries, wait
        );
        tokio::time::sleep(wait).await;
    }
}

pub fn is_transient_error(error: &anyhow::Error) -> bool {
    let text = format!("{:?}", error).to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| text.contains(p))
}

use std::time::Duration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use crate::{PipelineError, Task};

const MAX_INTERVAL_CAP: Duration = Duration::from_secs(150);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_interval: Duration,
    pub max_attempts: u32,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            max_attempts: 3,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Fixed one second wait between attempts.
    pub fn fixed(max_attempts: u32) -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(1),
            max_attempts,
            multiplier: 1.0,
        }
    }

    pub fn exponential(max_attempts: u32, interval: Duration, max_interval: Duration) -> Self {
        Self {
            interval,
            max_interval,
            max_attempts,
            multiplier: 2.0,
        }
    }

    fn normalized(mut self) -> Self {
        // 设置默认值
        if self.max_attempts == 0 {
            self.max_attempts = 1;
        }
        if self.multiplier <= 0.0 {
            self.multiplier = 1.0;
        }
        if self.max_interval < self.interval {
            self.max_interval = self.interval;
        }
        if self.max_interval > MAX_INTERVAL_CAP {
            self.max_interval = MAX_INTERVAL_CAP;
        }
        self
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let backoff = self.interval.as_secs_f64() * self.multiplier.powi(exponent);

        if !backoff.is_finite() || backoff >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            Duration::from_secs_f64(backoff)
        }
    }
}

/// Re-runs the wrapped task while its `retry_handler` approves and the
/// attempt budget lasts. The final error is returned unchanged.
pub struct Retry<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Task> Retry<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy: policy.normalized(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<T: Task> Task for Retry<T> {
    async fn perform(&self, ctx: CancellationToken) -> Result<(), PipelineError> {
        let mut attempt = 1;
        loop {
            if ctx.is_cancelled() {
                return Err(PipelineError::ContextCancelled(format!(
                    "Context cancelled before retry attempt {}",
                    attempt
                )));
            }

            let err = match self.inner.perform(ctx.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if err.is_cancelled()
                || !self.inner.retry_handler(&err)
                || attempt >= self.policy.max_attempts
            {
                return Err(err);
            }

            let wait_time = self.policy.backoff(attempt);
            warn!(
                attempt,
                max_attempts = self.policy.max_attempts,
                error = %err,
                "attempt failed, retrying in {:?}",
                wait_time
            );

            tokio::select! {
                _ = ctx.cancelled() => {
                    return Err(PipelineError::ContextCancelled(
                        "Context cancelled during retry wait".to_string()
                    ));
                }
                _ = sleep(wait_time) => {}
            }
            attempt += 1;
        }
    }

    fn retry_handler(&self, error: &PipelineError) -> bool {
        self.inner.retry_handler(error)
    }
}

use crate::config::FailoverConfig;
use crate::error::{KubercError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Time source for the orchestrator
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded convergence polling: how many polls, how far apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    pub fn from_config(config: &FailoverConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.poll_interval_ms),
        )
    }

    /// Upper bound on time spent sleeping between polls, saturating at `Duration::MAX`
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }

    /// Sleep one interval, returning early with `Cancelled` if the token fires
    pub async fn wait(&self, clock: &dyn Clock, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(KubercError::Cancelled);
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(KubercError::Cancelled),
            _ = clock.sleep(self.interval) => Ok(()),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FailoverConfig::default())
    }
}

//! Retry with exponential backoff around authenticated vendor calls

use crate::auth::AuthSession;
use crate::config::RetryConfig;
use crate::credential::Credential;
use crate::error::{LadningError, Result};
use crate::logging::StructuredLogger;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Backoff parameters for transient failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per call, the first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Relative spread applied to each delay, in `[0, 1]`
    pub jitter_ratio: f64,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_ratio: config.jitter_ratio.clamp(0.0, 1.0),
        }
    }
}

impl RetryPolicy {
    /// Jittered `base * 2^retry`, capped at `max_delay`
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let multiplier = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        let capped = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if self.jitter_ratio <= 0.0 {
            return capped;
        }
        let factor = rand::rng().random_range(-self.jitter_ratio..=self.jitter_ratio);
        capped.mul_f64(1.0 + factor).min(self.max_delay)
    }
}

/// Runs vendor calls for one cycle and records every backoff delay.
///
/// Delays never shrink within a cycle, even across different calls.
pub struct Retrier<'a> {
    policy: &'a RetryPolicy,
    cancel: &'a CancellationToken,
    logger: &'a StructuredLogger,
    delays: Vec<Duration>,
}

impl<'a> Retrier<'a> {
    pub fn new(
        policy: &'a RetryPolicy,
        cancel: &'a CancellationToken,
        logger: &'a StructuredLogger,
    ) -> Self {
        Self {
            policy,
            cancel,
            logger,
            delays: Vec::new(),
        }
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    pub fn into_delays(self) -> Vec<Duration> {
        self.delays
    }

    fn next_delay(&mut self, retry: u32) -> Duration {
        let candidate = self.policy.delay_for_retry(retry);
        let floor = self.delays.last().copied().unwrap_or_default();
        let delay = candidate.max(floor);
        self.delays.push(delay);
        delay
    }

    /// Sleep for `delay` unless shutdown is requested first
    pub async fn pause(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                Err(LadningError::cancelled("shutdown requested during backoff"))
            }
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Call `operation` with a credential from `session`.
    ///
    /// A rejected credential is replaced once and the call repeated. A
    /// transient failure, including one while replacing the credential, is
    /// retried with backoff until the attempt bound.
    pub async fn call<T, F, Fut>(
        &mut self,
        session: &AuthSession,
        label: &str,
        operation: F,
    ) -> Result<T>
    where
        F: Fn(Credential) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        let mut replaced_credential = false;

        loop {
            if self.cancel.is_cancelled() {
                return Err(LadningError::cancelled("shutdown requested"));
            }
            attempt += 1;

            let result = match session.get_valid_credential().await {
                Ok(credential) => match operation(credential.clone()).await {
                    Err(e) if e.is_auth_expired() && !replaced_credential => {
                        self.logger
                            .warn(&format!("{}: credential rejected, refreshing once", label));
                        match session.force_refresh(&credential).await {
                            Ok(_) => {
                                replaced_credential = true;
                                // Not counted against the transient retry budget
                                attempt -= 1;
                                continue;
                            }
                            // A transient refresh failure backs off like any other
                            Err(refresh_error) => Err(refresh_error),
                        }
                    }
                    other => other,
                },
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.next_delay(attempt - 1);
                    self.logger.warn(&format!(
                        "{} failed (attempt {}/{}), retrying in {}ms: {}",
                        label,
                        attempt,
                        self.policy.max_attempts,
                        delay.as_millis(),
                        e
                    ));
                    self.pause(delay).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: f64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            jitter_ratio: jitter,
        }
    }

    #[test]
    fn delay_doubles_until_capped() {
        let p = policy(0.0);
        assert_eq!(p.delay_for_retry(0), Duration::from_millis(100));
        assert_eq!(p.delay_for_retry(1), Duration::from_millis(200));
        assert_eq!(p.delay_for_retry(3), Duration::from_millis(800));
        assert_eq!(p.delay_for_retry(4), Duration::from_millis(1_000));
        assert_eq!(p.delay_for_retry(40), Duration::from_millis(1_000));
    }

    #[test]
    fn jitter_stays_within_ratio_and_cap() {
        let p = policy(0.2);
        for _ in 0..100 {
            let d = p.delay_for_retry(1);
            assert!(d >= Duration::from_millis(160) && d <= Duration::from_millis(240));
            assert!(p.delay_for_retry(10) <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn recorded_delays_never_shrink() {
        let p = policy(1.0);
        let cancel = CancellationToken::new();
        let logger = crate::logging::get_logger("test");
        let mut retrier = Retrier::new(&p, &cancel, &logger);
        for retry in [0, 1, 2, 0, 1, 3, 0] {
            retrier.next_delay(retry);
        }
        assert!(retrier.delays().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn config_is_clamped() {
        let p = RetryPolicy::from(&RetryConfig {
            max_attempts: 0,
            base_delay_ms: 10,
            max_delay_ms: 100,
            jitter_ratio: 3.0,
        });
        assert_eq!(p.max_attempts, 1);
        assert_eq!(p.jitter_ratio, 1.0);
    }
}

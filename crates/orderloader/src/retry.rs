//! Bounded retry with exponential backoff.

use crate::errors::AutomationError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Blocking delay between attempts and polls.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested delays instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.delays().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Same delay after every failure.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }

    /// Delay after failure number `failure` (0-based).
    pub fn delay_for(&self, failure: u32) -> Duration {
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(failure as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }
}

/// Progress of one wrapped call.
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub attempt: u32,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryContext {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            max_attempts: policy.max_attempts.max(1),
            base_delay: policy.base_delay,
            max_delay: policy.max_delay,
            multiplier: policy.multiplier,
        }
    }

    pub fn has_next(&self) -> bool {
        self.attempt + 1 < self.max_attempts
    }

    /// Delay before the next attempt, after the current one failed.
    pub fn backoff(&self) -> Duration {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
        }
        .delay_for(self.attempt)
    }
}

/// Retry combinator. Clones share the retry counter.
#[derive(Clone)]
pub struct Retry {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    retries: Arc<AtomicU32>,
}

impl Retry {
    pub fn new(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            policy,
            sleeper,
            retries: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Retries performed since construction or the last `take_retries`.
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn take_retries(&self) -> u32 {
        self.retries.swap(0, Ordering::Relaxed)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` calls have been made. The last error is returned.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T, AutomationError>
    where
        F: FnMut() -> Result<T, AutomationError>,
    {
        let mut ctx = RetryContext::new(&self.policy);
        loop {
            match op() {
                Ok(value) => {
                    if ctx.attempt > 0 {
                        debug!("{} succeeded on attempt {}", label, ctx.attempt + 1);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if !ctx.has_next() => return Err(e),
                Err(e) => {
                    let delay = ctx.backoff();
                    warn!(
                        "{} failed on attempt {}/{}. Retrying in {:?}... Error: {}",
                        label,
                        ctx.attempt + 1,
                        ctx.max_attempts,
                        delay,
                        e
                    );
                    self.sleeper.sleep(delay);
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    ctx.attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_is_capped() {
        let p = policy();
        assert_eq!(p.delay_for(0), Duration::from_secs(1));
        assert_eq!(p.delay_for(1), Duration::from_secs(2));
        assert_eq!(p.delay_for(2), Duration::from_secs(4));
        assert_eq!(p.delay_for(3), Duration::from_secs(5));
        assert_eq!(p.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_always_failing_runs_max_attempts() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let retry = Retry::new(policy(), sleeper.clone());
        let mut calls = 0;
        let result: Result<(), _> = retry.run("probe", || {
            calls += 1;
            Err(AutomationError::NotFound("nothing".into()))
        });

        assert!(matches!(result, Err(AutomationError::NotFound(_))));
        assert_eq!(calls, 4);
        assert_eq!(
            sleeper.delays(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
        assert_eq!(retry.retries(), 3);
    }

    #[test]
    fn test_stops_on_success() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let retry = Retry::new(policy(), sleeper.clone());
        let mut calls = 0;
        let value = retry
            .run("probe", || {
                calls += 1;
                if calls < 2 {
                    Err(AutomationError::Platform("flaky".into()))
                } else {
                    Ok(7)
                }
            })
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(sleeper.delays().len(), 1);
        assert_eq!(retry.take_retries(), 1);
        assert_eq!(retry.retries(), 0);
    }

    #[test]
    fn test_non_retryable_short_circuits() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let retry = Retry::new(policy(), sleeper.clone());
        let mut calls = 0;
        let result: Result<(), _> = retry.run("probe", || {
            calls += 1;
            Err(AutomationError::Configuration("missing asset".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn test_fixed_policy() {
        let p = RetryPolicy::fixed(3, Duration::from_millis(250));
        assert_eq!(p.delay_for(0), p.delay_for(5));
    }
}

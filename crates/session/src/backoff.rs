//! Exponential backoff for transient failures
//!
//! Refresh attempts and remote calls that fail with a retryable error are
//! retried on an exponential schedule. The policy is a plain value so tests
//! can shrink the delays to nothing.

use std::time::Duration;

use log::debug;

use crate::error::AuthError;

/// Exponential backoff policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry
    pub initial: Duration,
    /// Multiplier applied to the delay after each attempt
    pub factor: u32,
    /// Ceiling on any single delay
    pub max_delay: Duration,
    /// Total attempts, counting the first one
    pub max_attempts: usize,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            factor: 2,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl Backoff {
    /// The delays slept between attempts, in order.
    ///
    /// A policy with `max_attempts` attempts sleeps `max_attempts - 1`
    /// times.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let mut delay = self.initial;
        (1..self.max_attempts).map(move |_| {
            let current = delay.min(self.max_delay);
            delay = delay.saturating_mul(self.factor).min(self.max_delay);
            current
        })
    }
}

/// Run `op` until it succeeds, a non-retryable error occurs, or the policy
/// is exhausted.
///
/// Only [`AuthError::is_retryable`] errors are retried; a rejected
/// credential or a full queue returns immediately.
pub fn retry_with_backoff<T>(
    policy: &Backoff,
    mut op: impl FnMut() -> Result<T, AuthError>,
) -> Result<T, AuthError> {
    let mut delays = policy.delays();
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => match delays.next() {
                Some(delay) => {
                    debug!("Retrying after {:?}: {}", delay, err);
                    std::thread::sleep(delay);
                }
                None => return Err(err),
            },
            Err(err) => return Err(err),
        }
    }
}

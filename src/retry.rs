//! # Retry Policy
//!
//! Pure backoff decisions for failed reconciliations.
//!
//! ## Overview
//!
//! A [`RetryPolicy`] answers one question: given that `attempt` retries have
//! already been scheduled, how long to wait before the next one, or whether the
//! failure chain is exhausted. It holds no state.
//!
//! The per-resource counter lives in [`RetryExecution`], which the scheduler
//! creates on the first failure of a resource and drops on the first success,
//! on exhaustion, or when the resource is cleaned up.
//!
//! ## Policies
//!
//! - **Disabled**: failures are logged once and never retried
//! - **Linear**: `interval × attempt`, bounded by a maximum attempt count
//! - **Exponential**: `initial × multiplier^(attempt - 1)`, capped at a maximum
//!   interval, optionally unbounded in attempts

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{RetryConfig, RetryPolicyKind};

/// Backoff decision function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    Disabled,
    Linear {
        interval: Duration,
        max_attempts: u32,
    },
    Exponential {
        initial_interval: Duration,
        multiplier: f64,
        max_interval: Option<Duration>,
        /// `None` retries forever
        max_attempts: Option<u32>,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Exponential {
            initial_interval: Duration::from_millis(
                crate::constants::retry::DEFAULT_INITIAL_INTERVAL_MS,
            ),
            multiplier: crate::constants::retry::DEFAULT_MULTIPLIER,
            max_interval: None,
            max_attempts: Some(crate::constants::retry::DEFAULT_MAX_ATTEMPTS),
        }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self::Disabled
    }

    pub fn linear(interval: Duration, max_attempts: u32) -> Self {
        Self::Linear {
            interval,
            max_attempts,
        }
    }

    /// Build the policy described by the `retry` configuration section
    pub fn from_config(config: &RetryConfig) -> Self {
        let interval = Duration::from_millis(config.initial_interval_ms);
        match config.policy {
            RetryPolicyKind::None => Self::Disabled,
            RetryPolicyKind::Linear => Self::Linear {
                interval,
                max_attempts: config.max_attempts,
            },
            RetryPolicyKind::Exponential => Self::Exponential {
                initial_interval: interval,
                multiplier: config.multiplier,
                max_interval: config.max_interval_ms.map(Duration::from_millis),
                max_attempts: Some(config.max_attempts),
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// No retry will ever be scheduled, so every first attempt is also the last
    pub fn has_zero_attempts(&self) -> bool {
        !self.is_enabled() || self.max_attempts() == Some(0)
    }

    /// Maximum number of retries, `None` when unbounded
    pub fn max_attempts(&self) -> Option<u32> {
        match self {
            Self::Disabled => Some(0),
            Self::Linear { max_attempts, .. } => Some(*max_attempts),
            Self::Exponential { max_attempts, .. } => *max_attempts,
        }
    }

    /// Delay before retry number `attempt` (1-based), or `None` once exhausted
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return None;
        }
        if let Some(max_attempts) = self.max_attempts() {
            if attempt > max_attempts {
                return None;
            }
        }

        match self {
            Self::Disabled => None,
            Self::Linear { interval, .. } => Some(interval.saturating_mul(attempt)),
            Self::Exponential {
                initial_interval,
                multiplier,
                max_interval,
                ..
            } => {
                let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                let millis = initial_interval.as_millis() as f64 * multiplier.powi(exponent);
                let mut delay = if millis.is_finite() && millis < u64::MAX as f64 {
                    Duration::from_millis(millis as u64)
                } else {
                    Duration::from_millis(u64::MAX)
                };
                if let Some(cap) = max_interval {
                    delay = delay.min(*cap);
                }
                Some(delay)
            }
        }
    }
}

/// Retry metadata exposed to reconcilers and carried in the execution scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryInfo {
    /// Number of retries scheduled so far in the current failure chain
    pub attempt: u32,
    /// No further retry will be scheduled if this execution fails
    pub last_attempt: bool,
}

/// Per-resource retry counter for one failure chain
#[derive(Debug, Clone)]
pub struct RetryExecution {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryExecution {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Advance the counter and return the delay for the next retry
    ///
    /// Returns `None` without advancing once the policy is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let next_attempt = self.attempts.saturating_add(1);
        let delay = self.policy.next_delay(next_attempt)?;
        self.attempts = next_attempt;
        Some(delay)
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts
    }

    pub fn is_last_attempt(&self) -> bool {
        self.policy
            .max_attempts()
            .is_some_and(|max_attempts| self.attempts >= max_attempts)
    }

    pub fn info(&self) -> RetryInfo {
        RetryInfo {
            attempt: self.attempts,
            last_attempt: self.is_last_attempt(),
        }
    }
}

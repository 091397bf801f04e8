//! Bounded retry loop shared by every interactive step.
//!
//! A step runs; when it fails with a retryable error and the budget still has
//! attempts left, one attempt is consumed, the recovery action runs (usually a
//! page reload) and the step runs again. A step that never succeeds therefore
//! runs exactly `budget + 1` times before the failure is turned into
//! [`Error::Interaction`]. Any handle the step held before recovery must be
//! considered invalid afterwards.

use crate::{Error, Result};
use log::warn;

/// Remaining retry attempts for one logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
}

impl RetryBudget {
    pub fn new(attempts: u32) -> Self {
        Self { remaining: attempts }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Take one attempt; returns `false` when none were left.
    pub fn consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// Retry `operation` on transient failures, running `recover` between attempts.
pub fn with_retry<T, F, R>(budget: &mut RetryBudget, step: &str, operation: F, recover: R) -> Result<T>
where
    F: FnMut() -> Result<T>,
    R: FnMut() -> Result<()>,
{
    with_retry_when(budget, step, Error::is_transient, operation, recover)
}

/// Like [`with_retry`] with a custom notion of which failures are retryable.
pub fn with_retry_when<T, F, R, P>(
    budget: &mut RetryBudget,
    step: &str,
    retryable: P,
    mut operation: F,
    mut recover: R,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
    R: FnMut() -> Result<()>,
    P: Fn(&Error) -> bool,
{
    loop {
        let err = match operation() {
            Ok(value) => return Ok(value),
            Err(err) if retryable(&err) => err,
            Err(err) => return Err(err),
        };

        if !budget.consume() {
            return Err(Error::interaction(step, err));
        }
        warn!("{}: {} (retrying, {} retries left)", step, err, budget.remaining());

        if let Err(recovery_err) = recover() {
            if !recovery_err.is_transient() {
                return Err(recovery_err);
            }
            // The next attempt surfaces whatever the failed recovery left behind.
            warn!("{}: recovery failed: {}", step, recovery_err);
        }
    }
}

/// Recovery action for steps that simply try again.
pub fn no_recovery() -> Result<()> {
    Ok(())
}

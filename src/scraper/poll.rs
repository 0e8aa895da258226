//! Bounded DOM polling.
//!
//! Infinite-scroll UIs settle eventually — or they don't. Every polling
//! loop in the scraper runs under a [`PollBudget`] so a stalled page
//! surfaces [`Error::PaginationStalled`] instead of suspending the caller
//! indefinitely.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default number of probe attempts.
const DEFAULT_ATTEMPTS: u32 = 50;

/// Default pause between probe attempts.
const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

// ============================================================================
// PollBudget
// ============================================================================

/// Attempt budget for a DOM polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    /// Maximum number of probe attempts.
    pub attempts: u32,

    /// Pause between probe attempts.
    pub interval: Duration,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl PollBudget {
    /// Creates a budget.
    #[inline]
    #[must_use]
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            interval,
        }
    }

    /// Polls a probe until it yields a value or the budget runs out.
    ///
    /// The probe returns `Ok(None)` while the condition is unmet.
    ///
    /// # Errors
    ///
    /// - the probe's own error, unmodified
    /// - [`Error::PaginationStalled`] when the budget is exhausted
    pub async fn poll<T, F>(&self, operation: &str, mut probe: F) -> Result<T>
    where
        F: AsyncFnMut() -> Result<Option<T>>,
    {
        for attempt in 1..=self.attempts {
            if let Some(value) = probe().await? {
                return Ok(value);
            }
            debug!(operation, attempt, "condition not met yet");
            tokio::time::sleep(self.interval).await;
        }

        Err(Error::pagination_stalled(operation, self.attempts))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poll_resolves() {
        let budget = PollBudget::new(10, Duration::from_millis(1));
        let mut calls = 0u32;

        let value = budget
            .poll("test condition", async || {
                calls += 1;
                Ok((calls == 3).then_some("ready"))
            })
            .await
            .unwrap();

        assert_eq!(value, "ready");
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_poll_exhaustion() {
        let budget = PollBudget::new(3, Duration::from_millis(1));

        let err = budget
            .poll("test condition", async || Ok(None::<()>))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::PaginationStalled { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_poll_propagates_probe_error() {
        let budget = PollBudget::new(3, Duration::from_millis(1));

        let err = budget
            .poll("test condition", async || {
                Err::<Option<()>, _>(Error::scraper("gone"))
            })
            .await
            .unwrap_err();

        assert!(err.is_scraper_error());
        assert!(!matches!(err, Error::PaginationStalled { .. }));
    }
}

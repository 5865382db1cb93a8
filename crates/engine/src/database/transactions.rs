//! Retry policy for closure transactions
//!
//! A transaction that fails with an isolation conflict saw a store that
//! changed under it. Running the whole closure again on a fresh transaction
//! is the only recovery, so conflicts are retried with exponential backoff.

use std::time::Duration;

/// Configuration for retrying conflicted transactions
///
/// # Example
/// ```ignore
/// let config = RetryConfig::new().with_max_retries(5).with_max_delay_ms(200);
/// db.transaction_with_retry(config, |conn| {
///     let seen = conn.size(&QuadPattern::any())?;
///     conn.add_statement(counter_quad(seen))
/// })?;
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: usize,
    /// Base delay between retries in milliseconds, doubled per attempt
    pub base_delay_ms: u64,
    /// Upper bound on any single delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Create a new RetryConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// A single attempt, conflicts are returned to the caller
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set base delay for exponential backoff
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set maximum delay between retries
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Backoff before retry number `attempt` (zero based)
    pub(crate) fn calculate_delay(&self, attempt: usize) -> Duration {
        // 1 << 63 is the largest multiplier that fits in u64
        let multiplier = 1u64 << attempt.min(63);
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

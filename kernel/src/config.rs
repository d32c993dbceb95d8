//! Reader configuration
use std::time::Duration;

/// How many times `_last_checkpoint` is read before giving up on it
pub const DEFAULT_LAST_CHECKPOINT_ATTEMPTS: usize = 3;

/// Pause between two reads of `_last_checkpoint`
pub const DEFAULT_LAST_CHECKPOINT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Options that control how a table's log is read.
///
/// ```
/// # use std::time::Duration;
/// # use delta_log_reader::TableOptions;
/// let options = TableOptions::default()
///     .with_last_checkpoint_attempts(5)
///     .with_last_checkpoint_retry_delay(Duration::from_millis(200));
/// assert_eq!(options.last_checkpoint_attempts, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOptions {
    /// Number of reads of `_last_checkpoint` before the hint is treated as absent. A read is
    /// retried when the file is missing, empty, or not valid JSON.
    pub last_checkpoint_attempts: usize,
    /// Pause between two reads of `_last_checkpoint`
    pub last_checkpoint_retry_delay: Duration,
    /// When false `_last_checkpoint` is never read and the log is always listed from version 0.
    pub use_checkpoint_hint: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            last_checkpoint_attempts: DEFAULT_LAST_CHECKPOINT_ATTEMPTS,
            last_checkpoint_retry_delay: DEFAULT_LAST_CHECKPOINT_RETRY_DELAY,
            use_checkpoint_hint: true,
        }
    }
}

impl TableOptions {
    pub fn with_last_checkpoint_attempts(mut self, attempts: usize) -> Self {
        self.last_checkpoint_attempts = attempts.max(1);
        self
    }

    pub fn with_last_checkpoint_retry_delay(mut self, delay: Duration) -> Self {
        self.last_checkpoint_retry_delay = delay;
        self
    }

    pub fn with_checkpoint_hint(mut self, use_checkpoint_hint: bool) -> Self {
        self.use_checkpoint_hint = use_checkpoint_hint;
        self
    }
}

//! Log throttling utility
//!
//! Limits how often the same warning is recorded so a misbehaving encoder
//! cannot flood the log from inside the drain loop.

use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry {
    last_logged: Instant,
    suppressed: u64,
}

/// Log throttler owned by a single thread
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use chunked_encoder::utils::LogThrottler;
///
/// let mut throttler = LogThrottler::new(Duration::from_secs(5));
///
/// // First call logs
/// assert_eq!(throttler.should_log("unknown_status"), Some(0));
///
/// // Subsequent calls within 5 seconds are suppressed and counted
/// assert_eq!(throttler.should_log("unknown_status"), None);
/// ```
pub struct LogThrottler {
    entries: HashMap<String, Entry>,
    interval: Duration,
}

impl LogThrottler {
    /// Create a new log throttler with the specified interval
    pub fn new(interval: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            interval,
        }
    }

    /// Create a new log throttler with interval specified in seconds
    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Check if a message should be logged
    ///
    /// Returns `Some(n)` when the message should be logged, where `n` is how
    /// many occurrences were suppressed since it was last logged. Returns
    /// `None` when the message is throttled.
    pub fn should_log(&mut self, key: &str) -> Option<u64> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(entry) if now.duration_since(entry.last_logged) < self.interval => {
                entry.suppressed += 1;
                None
            }
            Some(entry) => {
                let suppressed = entry.suppressed;
                entry.last_logged = now;
                entry.suppressed = 0;
                Some(suppressed)
            }
            None => {
                self.entries.insert(
                    key.to_string(),
                    Entry {
                        last_logged: now,
                        suppressed: 0,
                    },
                );
                Some(0)
            }
        }
    }

    /// Forget a key so its next occurrence is logged immediately
    pub fn clear(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Forget all keys
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Get the number of tracked keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the throttler is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LogThrottler {
    /// Create a default log throttler with 5 second interval
    fn default() -> Self {
        Self::with_secs(5)
    }
}

/// Macro for throttled warning logging
///
/// # Example
///
/// ```rust
/// use chunked_encoder::utils::LogThrottler;
/// use chunked_encoder::warn_throttled;
///
/// let mut throttler = LogThrottler::default();
/// warn_throttled!(throttler, "my_error", "Error occurred: {}", "details");
/// ```
#[macro_export]
macro_rules! warn_throttled {
    ($throttler:expr, $key:expr, $($arg:tt)*) => {
        if let Some(suppressed) = $throttler.should_log($key) {
            tracing::warn!(suppressed, $($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_should_log_first_call() {
        let mut throttler = LogThrottler::with_secs(1);
        assert_eq!(throttler.should_log("test_key"), Some(0));
    }

    #[test]
    fn test_throttling_counts_suppressed() {
        let mut throttler = LogThrottler::new(Duration::from_millis(100));

        assert!(throttler.should_log("test_key").is_some());
        assert!(throttler.should_log("test_key").is_none());
        assert!(throttler.should_log("test_key").is_none());

        // Wait for throttle to expire
        thread::sleep(Duration::from_millis(150));

        assert_eq!(throttler.should_log("test_key"), Some(2));
        assert!(throttler.should_log("test_key").is_none());
    }

    #[test]
    fn test_different_keys() {
        let mut throttler = LogThrottler::with_secs(10);

        assert!(throttler.should_log("key1").is_some());
        assert!(throttler.should_log("key2").is_some());
        assert!(throttler.should_log("key1").is_none());
        assert_eq!(throttler.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut throttler = LogThrottler::with_secs(10);

        assert!(throttler.should_log("key1").is_some());
        throttler.clear("key1");
        assert!(throttler.should_log("key1").is_some());

        throttler.clear_all();
        assert!(throttler.is_empty());
    }

    #[test]
    fn test_macro() {
        let mut throttler = LogThrottler::default();
        warn_throttled!(throttler, "macro_key", "first {}", 1);
        warn_throttled!(throttler, "macro_key", "second {}", 2);
        assert_eq!(throttler.len(), 1);
    }
}

//! Log throttling
//!
//! Peers that send garbage tend to send a lot of it. The throttler lets the
//! first warning for a key through, then suppresses the same key for an
//! interval and reports how many were swallowed when it next speaks.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry {
    last_logged: Instant,
    suppressed: u64,
}

/// Per-key log rate limiter
pub struct LogThrottler {
    entries: Mutex<HashMap<String, Entry>>,
    interval: Duration,
}

impl LogThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            interval,
        }
    }

    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Returns `Some(suppressed)` when a message for `key` may be logged now,
    /// where `suppressed` counts the messages dropped since the last one.
    pub fn admit(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get_mut(key) {
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
                entries.insert(
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

    pub fn should_log(&self, key: &str) -> bool {
        self.admit(key).is_some()
    }

    /// Forget `key`, so its next message is logged immediately
    pub fn clear(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for LogThrottler {
    /// 5 second interval
    fn default() -> Self {
        Self::with_secs(5)
    }
}

/// Throttled `tracing::warn!`
///
/// ```rust
/// use stream_viewer::utils::LogThrottler;
/// use stream_viewer::warn_throttled;
///
/// let throttler = LogThrottler::default();
/// warn_throttled!(throttler, "bad_frame", "Dropping frame: {}", "details");
/// ```
#[macro_export]
macro_rules! warn_throttled {
    ($throttler:expr, $key:expr, $($arg:tt)*) => {
        match $throttler.admit($key) {
            Some(0) => tracing::warn!($($arg)*),
            Some(suppressed) => tracing::warn!(suppressed, $($arg)*),
            None => {}
        }
    };
}

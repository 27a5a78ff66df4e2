//! Rate-limited warnings.
//!
//! Some warnings can fire once per frame per channel while resampling; each
//! cause is reported at most [`WARNING_LIMIT`] times, followed by a single
//! notice that further occurrences are suppressed.

use std::collections::HashMap;

/// Occurrences of one cause that are logged before suppression.
pub const WARNING_LIMIT: u32 = 10;

/// Per-cause warning counter owned by one conversion.
#[derive(Clone, Debug, Default)]
pub struct WarningLimiter {
    counts: HashMap<String, u32>,
}

impl WarningLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log `message` under `cause` unless the cause is already suppressed.
    /// Returns whether the message was logged.
    pub fn warn(&mut self, cause: &str, message: impl FnOnce() -> String) -> bool {
        let count = self.counts.entry(cause.to_string()).or_insert(0);
        *count += 1;
        if *count > WARNING_LIMIT {
            return false;
        }
        log::warn!("{}", message());
        if *count == WARNING_LIMIT {
            log::warn!("Suppressing further '{}' warnings", cause);
        }
        true
    }

    /// Number of times `cause` occurred, logged or not.
    pub fn count(&self, cause: &str) -> u32 {
        self.counts.get(cause).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suppressed_after_limit() {
        let mut limiter = WarningLimiter::new();
        let logged = (0..25)
            .filter(|i| limiter.warn("clamp", || format!("occurrence {i}")))
            .count();
        assert_eq!(logged, WARNING_LIMIT as usize);
        assert_eq!(limiter.count("clamp"), 25);
    }

    #[test]
    fn test_causes_are_independent() {
        let mut limiter = WarningLimiter::new();
        for _ in 0..WARNING_LIMIT {
            limiter.warn("a", || "a".to_string());
        }
        assert!(!limiter.warn("a", || "a".to_string()));
        assert!(limiter.warn("b", || "b".to_string()));
    }
}

//! # Runtime configuration.
//!
//! Provides [`Config`], centralized settings for the regulator and the stats
//! aggregator.
//!
//! Config is consumed by:
//! 1. [`Regulator::with_config`](crate::Regulator::with_config)
//! 2. [`Stater::with_config`](crate::Stater::with_config)
//!
//! ## Sentinel values
//! - `regulator_limit = 0` → unlimited (no admission wait)
//! - `stat_period < 1ms` → clamped to 1ms
//! - `stats_queue_capacity = 0` → clamped to 1

use std::time::Duration;

/// Global configuration for the tasktree runtime.
///
/// ## Field semantics
/// - `regulator_limit`: Max simultaneously active regulator processes (`0` = unlimited)
/// - `stat_period`: Sampling period of the stats aggregator
/// - `stats_queue_capacity`: Pending snapshots buffered for a slow stats handler
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to avoid
/// sprinkling sentinel checks across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum number of regulator processes active at once.
    ///
    /// - `0` = unlimited
    /// - `n > 0` = `new_process` waits while `n` processes are active
    pub regulator_limit: usize,

    /// Period between two stats samples.
    pub stat_period: Duration,

    /// Capacity of the queue between the sampling loop and the stats handler.
    ///
    /// When the handler lags behind by more than this many snapshots, newer
    /// snapshots are dropped (warn) instead of slowing the sampling loop.
    pub stats_queue_capacity: usize,
}

impl Config {
    /// Returns the regulator limit as an `Option`.
    ///
    /// - `None` → unlimited
    /// - `Some(n)` → at most `n` active processes
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.regulator_limit == 0 {
            None
        } else {
            Some(self.regulator_limit)
        }
    }

    /// Returns the stats period clamped to a minimum of 1ms.
    #[inline]
    pub fn stat_period_clamped(&self) -> Duration {
        self.stat_period.max(Duration::from_millis(1))
    }

    /// Returns the stats queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn stats_queue_capacity_clamped(&self) -> usize {
        self.stats_queue_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `regulator_limit = 0` (unlimited)
    /// - `stat_period = 1s`
    /// - `stats_queue_capacity = 16`
    fn default() -> Self {
        Self {
            regulator_limit: 0,
            stat_period: Duration::from_secs(1),
            stats_queue_capacity: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_limit_is_unlimited() {
        let cfg = Config::default();
        assert_eq!(cfg.concurrency_limit(), None);

        let cfg = Config {
            regulator_limit: 4,
            ..Config::default()
        };
        assert_eq!(cfg.concurrency_limit(), Some(4));
    }

    #[test]
    fn test_clamps() {
        let cfg = Config {
            regulator_limit: 0,
            stat_period: Duration::ZERO,
            stats_queue_capacity: 0,
        };
        assert_eq!(cfg.stat_period_clamped(), Duration::from_millis(1));
        assert_eq!(cfg.stats_queue_capacity_clamped(), 1);
    }
}

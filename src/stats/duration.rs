//! # Duration ratio instrument.
//!
//! [`DurationRatio`] reports the percentage of a sampling window during which
//! keyed intervals were open.
//!
//! ## Algorithm
//! ```text
//! add(k)   → open[k] = now
//! done(k)  → total += now - open[k]; remove k
//! value(Δ) → total += Σ (now - open[k]); open[k] = now for every k
//!            return 100 × total / Δ; total = 0
//! ```
//!
//! Resetting open intervals to `now` on every sample is what keeps an interval
//! straddling several windows from being counted twice.
//!
//! Several keys may be open at once, so the ratio can exceed 100%.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::instrument::Instrument;

/// Busy-time ratio over keyed intervals.
///
/// Recording only happens between [`Instrument::start`] and [`Instrument::stop`].
#[derive(Debug)]
pub struct DurationRatio<K = ()> {
    state: Mutex<RatioState<K>>,
}

#[derive(Debug)]
struct RatioState<K> {
    started: bool,
    total: Duration,
    open: HashMap<K, Instant>,
}

impl<K> Default for DurationRatio<K>
where
    K: Eq + Hash + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> DurationRatio<K>
where
    K: Eq + Hash + Send + 'static,
{
    /// Creates a stopped instrument.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RatioState {
                started: false,
                total: Duration::ZERO,
                open: HashMap::new(),
            }),
        }
    }

    /// Opens an interval for `key`.
    pub fn add(&self, key: K) {
        let mut st = self.state.lock();
        if !st.started {
            return;
        }
        st.open.insert(key, Instant::now());
    }

    /// Closes the interval for `key`. Unknown keys are ignored.
    pub fn done(&self, key: &K) {
        let mut st = self.state.lock();
        if !st.started {
            return;
        }
        if let Some(at) = st.open.remove(key) {
            st.total += at.elapsed();
        }
    }
}

impl<K> Instrument for DurationRatio<K>
where
    K: Eq + Hash + Send + 'static,
{
    fn start(&self) {
        let mut st = self.state.lock();
        st.started = true;
        st.total = Duration::ZERO;
        st.open.clear();
    }

    fn stop(&self) {
        self.state.lock().started = false;
    }

    fn value(&self, delta: Duration) -> f64 {
        let mut st = self.state.lock();
        let now = Instant::now();

        let mut total = st.total;
        for at in st.open.values_mut() {
            total += now.saturating_duration_since(*at);
            *at = now;
        }
        st.total = Duration::ZERO;

        if delta.is_zero() {
            return 0.0;
        }
        100.0 * total.as_secs_f64() / delta.as_secs_f64()
    }
}

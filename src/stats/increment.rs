//! # Increment instrument.
//!
//! [`Increment`] counts events between two samples; each sample returns the
//! count accumulated since the previous one and resets it.

use std::time::Duration;

use parking_lot::Mutex;

use super::instrument::Instrument;

/// Counter reset on every sample.
#[derive(Debug, Default)]
pub struct Increment {
    state: Mutex<IncrementState>,
}

#[derive(Debug, Default)]
struct IncrementState {
    started: bool,
    count: i64,
}

impl Increment {
    /// Creates a stopped counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta` to the counter while started.
    pub fn add(&self, delta: i64) {
        let mut st = self.state.lock();
        if st.started {
            st.count = st.count.wrapping_add(delta);
        }
    }
}

impl Instrument for Increment {
    fn start(&self) {
        let mut st = self.state.lock();
        st.started = true;
        st.count = 0;
    }

    fn stop(&self) {
        self.state.lock().started = false;
    }

    fn value(&self, _delta: Duration) -> f64 {
        let mut st = self.state.lock();
        std::mem::take(&mut st.count) as f64
    }
}

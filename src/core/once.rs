//! # One-shot guard.
//!
//! [`OneShot`] runs a body at most once, even under concurrent callers.
//! A spent guard is never cleared in place: callers that need to re-arm
//! (start/stop pairs) install a fresh instance instead.

use std::sync::atomic::{AtomicBool, Ordering};

/// CAS-guarded flag wrapping a body executed at most once.
#[derive(Debug, Default)]
pub(crate) struct OneShot {
    fired: AtomicBool,
}

impl OneShot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Runs `f` if this is the first call and returns `true`; otherwise returns `false`.
    pub(crate) fn call(&self, f: impl FnOnce()) -> bool {
        if self.try_fire() {
            f();
            true
        } else {
            false
        }
    }

    /// Marks the guard as spent. Returns `true` only for the caller that flipped it.
    pub(crate) fn try_fire(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_runs_once() {
        let guard = OneShot::new();
        let mut hits = 0;
        assert!(guard.call(|| hits += 1));
        assert!(!guard.call(|| hits += 1));
        assert_eq!(hits, 1);
        assert!(guard.is_fired());
    }

    #[test]
    fn test_runs_once_across_threads() {
        let guard = Arc::new(OneShot::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                let hits = hits.clone();
                std::thread::spawn(move || {
                    guard.call(|| {
                        hits.fetch_add(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}

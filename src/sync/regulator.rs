//! # Regulator: bounded admission with subprocess fan-out.
//!
//! A [`Regulator`] admits at most `limit` concurrent [`RegulatorProcess`]es.
//! A process fans out into subprocesses and hands control back to its driver
//! each time one of them completes, or when it is cancelled.
//!
//! ## Architecture
//! ```text
//! driver loop                          regulator (limit = L)
//!   │ new_process().await ───────────► waits while active ≥ L, then active += 1
//!   │ add_subprocesses(n, cb)
//!   │   spawn n subprocesses ────────► each calls subprocess_is_done()
//!   │ loop { wait().await }                     │ outstanding -= 1, wake driver
//!   │   ├─ SubprocessDone → react               └─ at 0: callbacks (reverse order),
//!   │   ├─ Cancelled      → bail out                   last one releases the slot,
//!   │   └─ Finished       → next process               token cancelled
//! ```
//!
//! ## Rules
//! - `active ≤ limit` whenever `limit > 0`
//! - Every completion is reported by exactly one `wait()` call
//! - A process with nothing outstanding finishes on `wait()` and frees its slot
//! - A cancelled process keeps its slot until its subprocesses report done

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::wait_group::WaitGroup;
use crate::config::Config;
use crate::stats::{FnInstrument, StatMetadata, Stater};

/// Completion callback of a process.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Reason a [`RegulatorProcess::wait`] call returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// One subprocess completed.
    SubprocessDone,
    /// Every subprocess completed; the slot is released.
    Finished,
    /// The process token was cancelled.
    Cancelled,
}

/// Admission gate bounding the number of active processes.
///
/// Cheap to clone; clones share the same slots.
#[derive(Clone)]
pub struct Regulator {
    inner: Arc<RegulatorInner>,
}

struct RegulatorInner {
    limit: Option<usize>,
    active: Mutex<usize>,
    released: Notify,
    parent: CancellationToken,
    subprocesses: WaitGroup,
}

impl RegulatorInner {
    fn release(&self) {
        {
            let mut active = self.active.lock();
            *active = active.saturating_sub(1);
        }
        self.released.notify_waiters();
    }
}

impl Regulator {
    /// Creates a regulator admitting `limit` processes at once (`0` = unlimited).
    ///
    /// Process tokens are children of `parent`.
    pub fn new(limit: usize, parent: CancellationToken) -> Self {
        let cfg = Config {
            regulator_limit: limit,
            ..Config::default()
        };
        Self::with_config(&cfg, parent)
    }

    /// Creates a regulator from the admission section of `cfg`.
    pub fn with_config(cfg: &Config, parent: CancellationToken) -> Self {
        Self {
            inner: Arc::new(RegulatorInner {
                limit: cfg.concurrency_limit(),
                active: Mutex::new(0),
                released: Notify::new(),
                parent,
                subprocesses: WaitGroup::new(),
            }),
        }
    }

    /// Admission limit, `None` when unlimited.
    pub fn limit(&self) -> Option<usize> {
        self.inner.limit
    }

    /// Number of processes holding a slot.
    pub fn active_count(&self) -> usize {
        *self.inner.active.lock()
    }

    /// Waits for a free slot and returns a new process holding it.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn new_process(&self) -> RegulatorProcess {
        loop {
            let notified = self.inner.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut active = self.inner.active.lock();
                if self.inner.limit.is_none_or(|limit| *active < limit) {
                    *active += 1;
                    break;
                }
            }
            notified.await;
        }
        RegulatorProcess::new(self.inner.clone())
    }

    /// Waits until every subprocess of every process is done.
    pub async fn wait(&self) {
        self.inner.subprocesses.wait().await;
    }

    /// Registers the "regulator processes" instrument on `stater`.
    pub fn add_stats(&self, stater: &Stater) {
        let inner = self.inner.clone();
        stater.add_stat(
            StatMetadata::new(
                "Regulator processes",
                "Number of processes the regulator is currently running",
                "",
            ),
            FnInstrument::arc(move |_: Duration| *inner.active.lock() as f64),
        );
    }
}

/// One admitted unit of work and its subprocesses.
///
/// Cheap to clone; subprocesses usually hold a clone to report completion.
#[derive(Clone)]
pub struct RegulatorProcess {
    inner: Arc<ProcessInner>,
}

struct ProcessInner {
    token: CancellationToken,
    regulator: Arc<RegulatorInner>,
    state: Mutex<ProcessState>,
    wake: Notify,
}

struct ProcessState {
    outstanding: usize,
    /// Completions not yet reported by `wait()`.
    unseen: usize,
    /// Run front to back on finish; the slot release sits last.
    callbacks: Vec<Callback>,
    finished: bool,
}

impl ProcessState {
    fn finish(&mut self) -> Vec<Callback> {
        self.finished = true;
        std::mem::take(&mut self.callbacks)
    }
}

impl RegulatorProcess {
    fn new(regulator: Arc<RegulatorInner>) -> Self {
        let token = regulator.parent.child_token();
        let release: Callback = {
            let regulator = regulator.clone();
            Box::new(move || regulator.release())
        };
        let inner = Arc::new(ProcessInner {
            token: token.clone(),
            regulator,
            state: Mutex::new(ProcessState {
                outstanding: 0,
                unseen: 0,
                callbacks: vec![release],
                finished: false,
            }),
            wake: Notify::new(),
        });

        let weak: Weak<ProcessInner> = Arc::downgrade(&inner);
        tokio::spawn(async move {
            token.cancelled().await;
            if let Some(inner) = weak.upgrade() {
                inner.wake.notify_waiters();
            }
        });
        Self { inner }
    }

    /// Cancellation token of this process; a child of the regulator's parent.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Number of subprocesses not done yet.
    pub fn outstanding(&self) -> usize {
        self.inner.state.lock().outstanding
    }

    /// Returns `true` once the process released its slot.
    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().finished
    }

    /// Announces `n` more subprocesses, with an optional callback run once all are done.
    ///
    /// Callbacks run in reverse registration order. Additions to a finished
    /// process are ignored (warn).
    pub fn add_subprocesses(&self, n: usize, on_all_done: Option<Callback>) {
        {
            let mut st = self.inner.state.lock();
            if st.finished {
                drop(st);
                warn!(n, "subprocesses added to a finished process; ignored");
                return;
            }
            st.outstanding += n;
            if let Some(cb) = on_all_done {
                st.callbacks.insert(0, cb);
            }
        }
        self.inner.regulator.subprocesses.add(n);
    }

    /// Waits for the next subprocess completion, the end of the process, or cancellation.
    ///
    /// With nothing outstanding the process finishes right away.
    pub async fn wait(&self) -> WaitOutcome {
        loop {
            let notified = self.inner.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let callbacks = {
                let mut st = self.inner.state.lock();
                if st.unseen > 0 {
                    st.unseen -= 1;
                    return WaitOutcome::SubprocessDone;
                }
                if st.finished {
                    return WaitOutcome::Finished;
                }
                (st.outstanding == 0).then(|| st.finish())
            };
            if let Some(callbacks) = callbacks {
                self.inner.run_finish(callbacks);
                return WaitOutcome::Finished;
            }
            if self.inner.token.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            notified.await;
        }
    }

    /// Reports one subprocess as done.
    ///
    /// The last one runs the callbacks and cancels the process token. Reports
    /// beyond the announced count are ignored (warn).
    pub fn subprocess_is_done(&self) {
        let callbacks = {
            let mut st = self.inner.state.lock();
            if st.outstanding == 0 {
                drop(st);
                warn!("subprocess reported done with nothing outstanding; ignored");
                return;
            }
            st.outstanding -= 1;
            st.unseen += 1;
            (st.outstanding == 0 && !st.finished).then(|| st.finish())
        };
        self.inner.regulator.subprocesses.done();
        self.inner.wake.notify_waiters();
        if let Some(callbacks) = callbacks {
            self.inner.run_finish(callbacks);
        }
    }
}

impl ProcessInner {
    fn run_finish(&self, callbacks: Vec<Callback>) {
        for cb in callbacks {
            cb();
        }
        self.token.cancel();
        debug!("regulator process finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const LONG: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_limit_one_blocks_until_subprocess_done() {
        let reg = Regulator::new(1, CancellationToken::new());
        let p1 = reg.new_process().await;
        p1.add_subprocesses(1, None);
        assert_eq!(reg.active_count(), 1);

        let second = {
            let reg = reg.clone();
            tokio::spawn(async move { reg.new_process().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!second.is_finished(), "limit reached");

        p1.subprocess_is_done();
        assert!(p1.is_finished());
        assert!(p1.token().is_cancelled());
        let p2 = tokio::time::timeout(LONG, second).await.unwrap().unwrap();
        assert_eq!(reg.active_count(), 1);

        assert_eq!(p1.wait().await, WaitOutcome::SubprocessDone);
        assert_eq!(p1.wait().await, WaitOutcome::Finished);

        assert_eq!(p2.wait().await, WaitOutcome::Finished);
        assert_eq!(reg.active_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_active_never_exceeds_limit() {
        const LIMIT: usize = 3;
        let reg = Regulator::new(LIMIT, CancellationToken::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut drivers = Vec::new();
        for _ in 0..20 {
            let reg = reg.clone();
            let running = running.clone();
            let peak = peak.clone();
            drivers.push(tokio::spawn(async move {
                let p = reg.new_process().await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                assert!(reg.active_count() <= LIMIT);

                let on_done: Callback = {
                    let running = running.clone();
                    Box::new(move || {
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                };
                p.add_subprocesses(2, Some(on_done));
                for _ in 0..2 {
                    let p = p.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        p.subprocess_is_done();
                    });
                }
                while p.wait().await != WaitOutcome::Finished {}
            }));
        }
        for d in drivers {
            tokio::time::timeout(LONG, d).await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= LIMIT);
        assert_eq!(reg.active_count(), 0);
        tokio::time::timeout(LONG, reg.wait()).await.expect("all subprocesses done");
    }

    #[tokio::test]
    async fn test_callbacks_run_in_reverse_order() {
        let reg = Regulator::new(0, CancellationToken::new());
        let p = reg.new_process().await;
        let order = Arc::new(Mutex::new(Vec::new()));
        let push = |tag: &'static str| -> Callback {
            let order = order.clone();
            Box::new(move || order.lock().push(tag))
        };

        p.add_subprocesses(1, Some(push("first")));
        p.add_subprocesses(1, Some(push("second")));
        p.subprocess_is_done();
        assert!(order.lock().is_empty());
        p.subprocess_is_done();

        assert_eq!(*order.lock(), vec!["second", "first"]);
        assert_eq!(reg.active_count(), 0, "slot released after the callbacks");
    }

    #[tokio::test]
    async fn test_wait_wakes_on_cancellation() {
        let root = CancellationToken::new();
        let reg = Regulator::new(2, root.clone());
        let p = reg.new_process().await;
        p.add_subprocesses(1, None);

        let waiter = {
            let p = p.clone();
            tokio::spawn(async move { p.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        root.cancel();
        let outcome = tokio::time::timeout(LONG, waiter).await.unwrap().unwrap();
        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert_eq!(reg.active_count(), 1, "slot held until subprocesses finish");

        p.subprocess_is_done();
        assert_eq!(reg.active_count(), 0);
    }

    #[tokio::test]
    async fn test_no_subprocesses_finishes_on_wait() {
        let reg = Regulator::new(1, CancellationToken::new());
        let p = reg.new_process().await;
        assert_eq!(p.wait().await, WaitOutcome::Finished);
        assert_eq!(p.wait().await, WaitOutcome::Finished);
        assert_eq!(reg.active_count(), 0);

        p.add_subprocesses(1, None);
        assert_eq!(p.outstanding(), 0, "finished process ignores additions");
        p.subprocess_is_done();
        assert_eq!(reg.active_count(), 0);
    }

    #[tokio::test]
    async fn test_regulator_wait_tracks_all_processes() {
        let reg = Regulator::new(0, CancellationToken::new());
        let a = reg.new_process().await;
        let b = reg.new_process().await;
        a.add_subprocesses(1, None);
        b.add_subprocesses(2, None);

        let waiter = {
            let reg = reg.clone();
            tokio::spawn(async move { reg.wait().await })
        };
        a.subprocess_is_done();
        b.subprocess_is_done();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        b.subprocess_is_done();
        tokio::time::timeout(LONG, waiter).await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_count_stat() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let stater = Stater::new(
            Duration::from_millis(100),
            crate::StatsFn::arc(move |s: Vec<crate::Stat>| {
                let _ = tx.send(s);
            }),
        );
        let reg = Regulator::new(0, CancellationToken::new());
        reg.add_stats(&stater);

        let _p1 = reg.new_process().await;
        let _p2 = reg.new_process().await;
        stater.start(&CancellationToken::new());
        let snap = rx.recv().await.expect("sample");
        assert_eq!(snap[0].metadata.label, "Regulator processes");
        assert_eq!(snap[0].value, 2.0);
        stater.stop();
    }
}

//! # Lifecycle: the root of the task tree.
//!
//! The [`Lifecycle`] owns the root cancellation token and the root completion
//! barrier (initialized to 1 for the root itself). It hands out [`Task`]s,
//! wires OS signals to [`Lifecycle::stop`], and blocks in [`Lifecycle::wait`]
//! until the whole tree has completed.
//!
//! ## Shutdown path
//! ```text
//! SIGINT/SIGTERM/SIGQUIT ──► signal task ──► handlers(signal)
//!                                       └──► stop()
//!                                              ├─► root token cancelled → every task token
//!                                              └─► root body marked done
//!
//! tasks observe cancellation ─► done() ─► ... ─► root barrier reaches zero ─► wait() returns
//! ```
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tasktree::Lifecycle;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let lifecycle = Lifecycle::new();
//!
//!     lifecycle.new_task().spawn(|ctx| async move {
//!         while !ctx.is_cancelled() {
//!             tokio::time::sleep(Duration::from_millis(5)).await;
//!         }
//!     });
//!
//!     let stopper = lifecycle.clone();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(20)).await;
//!         stopper.stop();
//!     });
//!
//!     lifecycle.wait().await;
//! }
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::node::CompletionNode;
use super::once::OneShot;
use super::shutdown::{self, Signal};
use super::task::Task;
use crate::error::RuntimeError;

/// Callback invoked for every received [`Signal`].
pub type SignalHandler = Arc<dyn Fn(Signal) + Send + Sync>;

/// Process-wide owner of the task tree.
///
/// Cheap to clone; clones share the same root.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    inner: Arc<LifecycleInner>,
}

#[derive(Debug)]
struct LifecycleInner {
    token: CancellationToken,
    node: Arc<CompletionNode>,
    stopped: OneShot,
    wait_logged: OneShot,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Creates a new root with a fresh cancellation token.
    pub fn new() -> Self {
        info!("starting lifecycle");
        Self {
            inner: Arc::new(LifecycleInner {
                token: CancellationToken::new(),
                node: CompletionNode::root(),
                stopped: OneShot::new(),
                wait_logged: OneShot::new(),
            }),
        }
    }

    /// Root cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Returns `true` once [`stop`](Lifecycle::stop) was called.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.is_fired()
    }

    /// Creates a task tracked by the root barrier.
    pub fn new_task(&self) -> Task {
        Task::new(&self.inner.token, &self.inner.node)
    }

    /// Cancels the whole tree and marks the root itself done. Idempotent.
    pub fn stop(&self) {
        self.inner.stopped.call(|| {
            info!(
                pending = self.inner.node.pending_children(),
                "stopping lifecycle"
            );
            self.inner.token.cancel();
            self.inner.node.mark_done();
        });
    }

    /// Waits until the root was stopped and every task completed.
    ///
    /// Returns immediately on later calls once the tree is complete.
    pub async fn wait(&self) {
        self.inner.wait_logged.call(|| info!("lifecycle is now waiting"));
        self.inner.node.wait_complete().await;
        debug_assert!(self.inner.node.is_complete());
    }

    /// Listens for OS signals in a dedicated task.
    ///
    /// Every signal is passed to each handler in order; terminating signals
    /// (interrupt, terminate, quit, abort) then call [`stop`](Lifecycle::stop).
    /// Must be called from within a tokio runtime.
    pub fn handle_signals(&self, handlers: Vec<SignalHandler>) -> Result<(), RuntimeError> {
        let task = self.new_task();
        let rx = match shutdown::listen(task.token().clone()) {
            Ok(rx) => rx,
            Err(error) => {
                task.done();
                return Err(RuntimeError::Signals { error });
            }
        };
        self.drive_signals(task, rx, handlers);
        Ok(())
    }

    /// Same as [`handle_signals`](Lifecycle::handle_signals) with a caller-provided source.
    pub fn handle_signals_from(&self, rx: mpsc::Receiver<Signal>, handlers: Vec<SignalHandler>) {
        let task = self.new_task();
        self.drive_signals(task, rx, handlers);
    }

    fn drive_signals(
        &self,
        task: Task,
        mut rx: mpsc::Receiver<Signal>,
        handlers: Vec<SignalHandler>,
    ) {
        let lifecycle = self.clone();
        task.spawn(move |ctx| async move {
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => break,
                    sig = rx.recv() => match sig {
                        Some(sig) => lifecycle.on_signal(sig, &handlers),
                        None => break,
                    }
                }
            }
        });
    }

    fn on_signal(&self, sig: Signal, handlers: &[SignalHandler]) {
        info!(signal = sig.as_str(), "received signal");
        for handler in handlers {
            handler(sig);
        }
        if sig.is_terminating() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    const LONG: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_wait_returns_after_stop_without_tasks() {
        let lc = Lifecycle::new();
        lc.stop();
        lc.stop();
        tokio::time::timeout(LONG, lc.wait()).await.expect("root stopped");
        tokio::time::timeout(LONG, lc.wait()).await.expect("second wait");
        assert!(lc.is_stopped());
        assert!(lc.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_blocks_until_every_task_is_done() {
        let lc = Lifecycle::new();
        let a = lc.new_task();
        let a1 = a.new_sub_task();
        let b = lc.new_task();

        lc.stop();
        a.done();
        b.done();
        assert!(
            tokio::time::timeout(Duration::from_millis(20), lc.wait())
                .await
                .is_err(),
            "a1 is still running"
        );

        a1.done();
        tokio::time::timeout(LONG, lc.wait()).await.expect("tree complete");
    }

    #[tokio::test]
    async fn test_stop_cancels_the_tree() {
        let lc = Lifecycle::new();
        let task = lc.new_task();
        let sub = task.new_sub_task();

        for t in [task.clone(), sub.clone()] {
            t.spawn(|ctx| async move { ctx.cancelled().await });
        }
        lc.stop();
        tokio::time::timeout(LONG, lc.wait()).await.expect("tasks exit");
        assert!(sub.is_cancelled());
        assert!(task.is_complete());
    }

    #[tokio::test]
    async fn test_terminating_signal_stops() {
        let lc = Lifecycle::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler: SignalHandler = {
            let seen = seen.clone();
            Arc::new(move |sig: Signal| seen.lock().push(sig))
        };

        let (tx, rx) = mpsc::channel(4);
        lc.handle_signals_from(rx, vec![handler]);

        tx.send(Signal::Hangup).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!lc.is_stopped(), "hangup is not terminating");

        tx.send(Signal::Terminate).await.unwrap();
        tokio::time::timeout(LONG, lc.wait()).await.expect("stopped by signal");
        assert_eq!(*seen.lock(), vec![Signal::Hangup, Signal::Terminate]);
    }

    #[tokio::test]
    async fn test_signal_task_exits_on_stop() {
        let lc = Lifecycle::new();
        let (_tx, rx) = mpsc::channel(1);
        lc.handle_signals_from(rx, Vec::new());
        lc.stop();
        tokio::time::timeout(LONG, lc.wait())
            .await
            .expect("signal task must not hold the barrier");
    }

    #[tokio::test]
    async fn test_handle_os_signals_registers() {
        let lc = Lifecycle::new();
        lc.handle_signals(Vec::new()).expect("registration");
        lc.stop();
        tokio::time::timeout(LONG, lc.wait()).await.expect("listener exits");
    }
}

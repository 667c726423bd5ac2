//! # Doer: fire-and-forget FIFO executor.
//!
//! [`Doer`] runs jobs one at a time, in submission order, on a dedicated
//! worker. Submitting never waits for the job to run.
//!
//! ```text
//! submit(j₁) ─┐
//! submit(j₂) ─┼─► [ j₁ ][ j₂ ][ j₃ ] ──► worker ──► f(job).await   (one at a time)
//! submit(j₃) ─┘                             ▲
//! close() / parent token cancelled ─────────┘ exits before the next job
//! ```
//!
//! ## Rules
//! - Jobs run in submission order, never concurrently
//! - A job already running finishes; jobs still queued at close are dropped
//! - `submit` after close returns `false`
//! - A panicking job is logged and the worker moves on

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::stats::panic_message;

/// Closure job run by [`Doer::closures`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// FIFO executor feeding every job to one function.
///
/// Cheap to clone; clones share the same worker.
pub struct Doer<T> {
    inner: Arc<DoerInner<T>>,
}

struct DoerInner<T> {
    tx: mpsc::UnboundedSender<T>,
    token: CancellationToken,
    exited: CancellationToken,
}

impl<T> Clone for Doer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Doer<T> {
    /// Spawns a worker applying `f` to every submitted job.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn(CancellationToken::new(), f)
    }

    /// Same as [`new`](Doer::new); the worker also stops when `parent` is cancelled.
    pub fn with_token<F, Fut>(parent: &CancellationToken, f: F) -> Self
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn(parent.child_token(), f)
    }

    fn spawn<F, Fut>(token: CancellationToken, mut f: F) -> Self
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        let exited = CancellationToken::new();

        let worker_token = token.clone();
        let worker_exited = exited.clone();
        tokio::spawn(async move {
            loop {
                let job = tokio::select! {
                    biased;
                    _ = worker_token.cancelled() => break,
                    job = rx.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };
                if let Err(panic_err) = std::panic::AssertUnwindSafe(f(job)).catch_unwind().await {
                    let info = panic_message(&*panic_err);
                    error!(%info, "doer job panicked");
                }
            }
            debug!(dropped = rx.len(), "doer stopped");
            worker_exited.cancel();
        });

        Self {
            inner: Arc::new(DoerInner { tx, token, exited }),
        }
    }

    /// Queues `job` without waiting. Returns `false` once the doer is closed.
    pub fn submit(&self, job: T) -> bool {
        if self.is_closed() {
            return false;
        }
        self.inner.tx.send(job).is_ok()
    }

    /// Stops the worker before its next job. Idempotent.
    pub fn close(&self) {
        self.inner.token.cancel();
    }

    /// Returns `true` once closed, directly or through the parent token.
    pub fn is_closed(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Waits until the worker has exited.
    pub async fn wait(&self) {
        self.inner.exited.cancelled().await;
    }
}

impl Doer<Job> {
    /// Doer whose jobs are the closures themselves.
    pub fn closures() -> Self {
        Self::new(|job: Job| async move { job() })
    }
}

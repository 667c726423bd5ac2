//! # Snapshot handlers and non-blocking dispatch.
//!
//! The sampling loop never awaits a handler. Snapshots go through a bounded
//! queue drained by one dedicated worker:
//!
//! ```text
//! sampling loop ──try_send──► [queue] ──► worker ──► handler.handle(&stats)
//!                 (full → drop, warn)          └──► panic → error log, keep going
//! ```
//!
//! ## Rules
//! - **Non-blocking**: `dispatch()` returns immediately
//! - **FIFO**: the handler sees snapshots in sampling order
//! - **Overflow**: the newest snapshot is dropped when the queue is full
//! - **Isolation**: a panicking handler does not stop the worker
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave shared state
//! inconsistent if the handler panics while holding a lock.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{error, warn};

use super::instrument::Stat;

/// Receives every snapshot produced by a [`Stater`](crate::Stater).
///
/// Failures must be handled inside `handle`; the sampling loop continues regardless.
///
/// ## Example
/// ```rust
/// use async_trait::async_trait;
/// use tasktree::{Stat, StatsHandler};
///
/// struct Print;
///
/// #[async_trait]
/// impl StatsHandler for Print {
///     async fn handle(&self, stats: &[Stat]) {
///         for s in stats {
///             println!("{}: {:.1}{}", s.metadata.label, s.value, s.metadata.unit);
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait StatsHandler: Send + Sync + 'static {
    /// Handles one snapshot, in registration order of the instruments.
    async fn handle(&self, stats: &[Stat]);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Closure-backed handler.
pub struct StatsFn<F> {
    f: F,
}

impl<F> StatsFn<F>
where
    F: Fn(Vec<Stat>) + Send + Sync + 'static,
{
    /// Wraps `f` and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self { f })
    }
}

#[async_trait]
impl<F> StatsHandler for StatsFn<F>
where
    F: Fn(Vec<Stat>) + Send + Sync + 'static,
{
    async fn handle(&self, stats: &[Stat]) {
        (self.f)(stats.to_vec());
    }

    fn name(&self) -> &'static str {
        "StatsFn"
    }
}

/// Extracts the message of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Bounded queue plus worker feeding one handler.
pub(crate) struct Dispatcher {
    name: &'static str,
    sender: mpsc::Sender<Vec<Stat>>,
    worker: JoinHandle<()>,
}

impl Dispatcher {
    /// Spawns the worker. It exits once the dispatcher is dropped and the queue drained.
    pub(crate) fn spawn(handler: Arc<dyn StatsHandler>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Vec<Stat>>(capacity.max(1));
        let name = handler.name();

        let worker = tokio::spawn(async move {
            while let Some(stats) = rx.recv().await {
                let fut = handler.handle(&stats);
                if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                    let info = panic_message(&*panic_err);
                    error!(handler = handler.name(), %info, "stats handler panicked");
                }
            }
        });

        Self {
            name,
            sender: tx,
            worker,
        }
    }

    /// Queues a snapshot without waiting.
    pub(crate) fn dispatch(&self, stats: Vec<Stat>) {
        match self.sender.try_send(stats) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(handler = self.name, "stats handler lagging; snapshot dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(handler = self.name, "stats handler worker is gone; snapshot dropped");
            }
        }
    }

    /// Closes the queue and waits for the worker to drain it.
    pub(crate) async fn shutdown(self) {
        drop(self.sender);
        let _ = self.worker.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::instrument::StatMetadata;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn snapshot(value: f64) -> Vec<Stat> {
        vec![Stat {
            metadata: StatMetadata::new("test", "test value", ""),
            value,
        }]
    }

    struct Slow {
        seen: Mutex<Vec<f64>>,
    }

    #[async_trait]
    impl StatsHandler for Slow {
        async fn handle(&self, stats: &[Stat]) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.seen.lock().push(stats[0].value);
        }
    }

    struct Panicky {
        seen: Mutex<Vec<f64>>,
    }

    #[async_trait]
    impl StatsHandler for Panicky {
        async fn handle(&self, stats: &[Stat]) {
            if stats[0].value < 0.0 {
                panic!("negative");
            }
            self.seen.lock().push(stats[0].value);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_drops_without_blocking() {
        let slow = Arc::new(Slow {
            seen: Mutex::new(Vec::new()),
        });
        let d = Dispatcher::spawn(slow.clone(), 1);

        for v in 0..5 {
            d.dispatch(snapshot(v as f64));
        }
        d.shutdown().await;

        let seen = slow.seen.lock().clone();
        assert!(!seen.is_empty());
        assert!(seen.len() < 5, "some snapshots must have been dropped: {seen:?}");
        assert_eq!(seen[0], 0.0);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let handler = Arc::new(Panicky {
            seen: Mutex::new(Vec::new()),
        });
        let d = Dispatcher::spawn(handler.clone(), 4);
        d.dispatch(snapshot(-1.0));
        d.dispatch(snapshot(1.0));
        d.shutdown().await;
        assert_eq!(*handler.seen.lock(), vec![1.0]);
    }

    #[tokio::test]
    async fn test_closure_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let d = {
            let seen = seen.clone();
            Dispatcher::spawn(StatsFn::arc(move |s: Vec<Stat>| seen.lock().push(s[0].value)), 4)
        };
        d.dispatch(snapshot(2.0));
        d.shutdown().await;
        assert_eq!(*seen.lock(), vec![2.0]);
    }
}

//! # Cancellation-safe ordered mailbox.
//!
//! [`CancellableQueue`] hands payloads from many producers to exactly one
//! consumer loop, without ever losing a payload it accepted.
//!
//! ## Architecture
//! ```text
//! send(p) ─┐                         ┌──────────── state lock ───────────┐
//! send(p) ─┼─► wait for start/cancel ─► [ p₁ ][ p₂ ][ p₃ ][ ✕ sentinel ] ──► start(consumer)
//! send(p) ─┘                         └──────────── one conduit ──────────┘         │
//!                                                  ▲                         consumer(p)
//! handle_ctx(token) ── token cancelled ──► cancel()┘                               │
//!                                                                    ack (send_and_wait only)
//! ```
//!
//! ## Rules
//! - Payloads and the sentinel are enqueued under the same lock, into the same
//!   conduit: every payload accepted before cancellation is consumed before the sentinel
//! - A send on a cancelled queue returns [`Delivery::Rejected`] right away
//! - A send on a queue that is not started waits for `start` **or** cancellation
//! - At most one consumer loop ever runs per queue
//!
//! ## Example
//! ```rust
//! use tasktree::{CancellableQueue, Delivery, Lifecycle};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let lifecycle = Lifecycle::new();
//!     let queue = CancellableQueue::<String>::new();
//!     queue.handle_ctx(lifecycle.token().clone());
//!
//!     let consumer = queue.clone();
//!     lifecycle.new_task().spawn(move |_ctx| async move {
//!         consumer.start(|msg| async move { println!("got {msg}") }).await;
//!     });
//!
//!     assert_eq!(queue.send_and_wait("hello".into()).await, Delivery::Processed);
//!     lifecycle.stop();
//!     lifecycle.wait().await;
//! }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::once::OneShot;
use crate::stats::{DurationRatio, StatMetadata, Stater};

/// Outcome of a submission.
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Enqueued; the consumer will see it before any cancellation.
    Accepted,
    /// The consumer returned for this payload.
    Processed,
    /// The queue was cancelled; the payload was dropped.
    Rejected,
    /// Accepted, but the consumer loop ended (panic or abort) before finishing it.
    Abandoned,
}

enum Message<T> {
    Payload {
        value: T,
        ack: Option<oneshot::Sender<()>>,
    },
    Cancelled,
}

struct QueueState<T> {
    tx: mpsc::UnboundedSender<Message<T>>,
    started: bool,
}

struct QueueInner<T> {
    state: Mutex<QueueState<T>>,
    /// Written only under `state`; read without it on the fast path.
    cancelled: AtomicBool,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Message<T>>>>,
    start_changed: Notify,
    start_guard: OneShot,
    listen: Arc<DurationRatio<()>>,
}

/// Ordered hand-off from many producers to one consumer.
pub struct CancellableQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for CancellableQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Default for CancellableQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> CancellableQueue<T> {
    /// Creates a queue that is neither started nor cancelled.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState { tx, started: false }),
                cancelled: AtomicBool::new(false),
                receiver: Mutex::new(Some(rx)),
                start_changed: Notify::new(),
                start_guard: OneShot::new(),
                listen: Arc::new(DurationRatio::new()),
            }),
        }
    }

    /// Returns `true` once the consumer loop was started.
    pub fn is_started(&self) -> bool {
        self.inner.state.lock().started
    }

    /// Returns `true` once cancellation was observed.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Cancels the queue when `token` is cancelled.
    ///
    /// The listener does not keep the queue alive. Must be called from within a tokio runtime.
    pub fn handle_ctx(&self, token: CancellationToken) {
        let weak: Weak<QueueInner<T>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            token.cancelled().await;
            if let Some(inner) = weak.upgrade() {
                CancellableQueue { inner }.cancel();
            }
        });
    }

    /// Injects the cancellation sentinel after every accepted payload. Idempotent.
    pub fn cancel(&self) {
        {
            let st = self.inner.state.lock();
            if self.inner.cancelled.swap(true, Ordering::AcqRel) {
                return;
            }
            // The receiver is only dropped once the consumer loop ended.
            let _ = st.tx.send(Message::Cancelled);
        }
        debug!("queue cancelled");
        self.inner.start_changed.notify_waiters();
    }

    /// Hands `value` to the consumer without waiting for it to be processed.
    pub async fn send(&self, value: T) -> Delivery {
        self.enqueue(value, None).await
    }

    /// Hands `value` to the consumer and waits until the consumer returned for it.
    pub async fn send_and_wait(&self, value: T) -> Delivery {
        let (ack_tx, ack_rx) = oneshot::channel();
        match self.enqueue(value, Some(ack_tx)).await {
            Delivery::Accepted => match ack_rx.await {
                Ok(()) => Delivery::Processed,
                Err(_) => Delivery::Abandoned,
            },
            other => other,
        }
    }

    async fn enqueue(&self, value: T, ack: Option<oneshot::Sender<()>>) -> Delivery {
        if self.is_cancelled() {
            return Delivery::Rejected;
        }
        loop {
            let notified = self.inner.start_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let st = self.inner.state.lock();
                if self.inner.cancelled.load(Ordering::Acquire) {
                    return Delivery::Rejected;
                }
                if st.started {
                    return match st.tx.send(Message::Payload { value, ack }) {
                        Ok(()) => Delivery::Accepted,
                        Err(_) => Delivery::Rejected,
                    };
                }
            }
            notified.await;
        }
    }

    /// Runs the consumer loop until the cancellation sentinel is reached.
    ///
    /// Only the first call runs a loop; later calls return immediately.
    pub async fn start<F, Fut>(&self, mut consumer: F)
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = ()>,
    {
        if !self.inner.start_guard.try_fire() {
            return;
        }
        let Some(mut rx) = self.inner.receiver.lock().take() else {
            return;
        };
        self.inner.state.lock().started = true;
        self.inner.start_changed.notify_waiters();
        debug!("queue consumer started");

        let listen = &self.inner.listen;
        listen.add(());
        while let Some(msg) = rx.recv().await {
            listen.done(&());
            match msg {
                Message::Cancelled => break,
                Message::Payload { value, ack } => {
                    consumer(value).await;
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                }
            }
            listen.add(());
        }
        debug!("queue consumer stopped");
    }

    /// Registers the "listen ratio" instrument: share of time the consumer
    /// spent waiting for the next message.
    pub fn add_stats(&self, stater: &Stater) {
        stater.add_stat(
            StatMetadata::new(
                "Listen ratio",
                "Percentage of time spent listening and waiting for new object",
                "%",
            ),
            self.inner.listen.clone(),
        );
    }
}

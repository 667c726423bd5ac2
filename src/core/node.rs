//! # Hierarchical completion barrier.
//!
//! Every [`Lifecycle`](crate::Lifecycle) and [`Task`](crate::Task) owns one
//! [`CompletionNode`]. A node counts its own body plus its live children:
//!
//! ```text
//! root (own=stop())
//!  ├── task A (own=A.done())
//!  │    ├── sub A1 (own=A1.done())
//!  │    └── sub A2 (own=A2.done())
//!  └── task B (own=B.done())
//! ```
//!
//! A node is **complete** once its own body is done and every child is
//! complete. Completion releases the parent exactly once, so completion
//! ripples up the tree and the root completes only after the whole tree has.
//!
//! ## Rules
//! - Waiters register on the [`Notify`] before checking their predicate (no lost wakeups)
//! - Children created on an already complete node are detached (warn)
//! - Releasing more children than were registered is ignored (error log)

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{error, warn};

#[derive(Debug, Default)]
struct NodeState {
    /// Children registered and not complete yet.
    children: usize,
    /// The node's own body reported done.
    own_done: bool,
    /// Own body done and no children left; never reverts.
    complete: bool,
}

impl NodeState {
    /// Flips `complete` on the transition and reports whether it happened now.
    fn try_complete(&mut self) -> bool {
        if !self.complete && self.own_done && self.children == 0 {
            self.complete = true;
            return true;
        }
        false
    }
}

/// Counting barrier linked to its parent node.
#[derive(Debug)]
pub(crate) struct CompletionNode {
    state: Mutex<NodeState>,
    changed: Notify,
    parent: Option<Arc<CompletionNode>>,
}

impl CompletionNode {
    /// Creates a node without parent (the lifecycle root).
    pub(crate) fn root() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(NodeState::default()),
            changed: Notify::new(),
            parent: None,
        })
    }

    /// Registers a new child on `self` and returns it.
    pub(crate) fn child(self: &Arc<Self>) -> Arc<Self> {
        let attached = {
            let mut st = self.state.lock();
            if st.complete {
                false
            } else {
                st.children += 1;
                true
            }
        };
        if !attached {
            warn!("child created on a completed node; it will not be awaited");
        }

        Arc::new(Self {
            state: Mutex::new(NodeState::default()),
            changed: Notify::new(),
            parent: attached.then(|| Arc::clone(self)),
        })
    }

    /// Marks the node's own body as done. Idempotent.
    pub(crate) fn mark_done(&self) {
        let completed = {
            let mut st = self.state.lock();
            if st.own_done {
                return;
            }
            st.own_done = true;
            st.try_complete()
        };
        if completed {
            self.on_complete();
        }
    }

    fn release_child(&self) {
        let (drained, completed) = {
            let mut st = self.state.lock();
            if st.children == 0 {
                drop(st);
                error!("completion node released more children than registered");
                return;
            }
            st.children -= 1;
            (st.children == 0, st.try_complete())
        };
        if completed {
            self.on_complete();
        } else if drained {
            self.changed.notify_waiters();
        }
    }

    fn on_complete(&self) {
        self.changed.notify_waiters();
        if let Some(parent) = &self.parent {
            parent.release_child();
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.state.lock().complete
    }

    /// Number of children not complete yet.
    pub(crate) fn pending_children(&self) -> usize {
        self.state.lock().children
    }

    /// Waits until the node is complete.
    pub(crate) async fn wait_complete(&self) {
        self.wait_until(|st| st.complete).await;
    }

    /// Waits until every registered child is complete.
    pub(crate) async fn wait_children(&self) {
        self.wait_until(|st| st.children == 0).await;
    }

    async fn wait_until(&self, pred: impl Fn(&NodeState) -> bool) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if pred(&self.state.lock()) {
                return;
            }
            notified.await;
        }
    }
}

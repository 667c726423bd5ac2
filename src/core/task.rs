//! # Task: a cancellable, completion-tracked unit of work.
//!
//! Tasks form a tree rooted in a [`Lifecycle`](crate::Lifecycle). Each task carries:
//! - a [`CancellationToken`] derived from its creator's token (parent cancellation
//!   propagates down, a task's own cancellation does **not** propagate up);
//! - a completion node counting its own body plus its live subtasks.
//!
//! ```text
//! Lifecycle::new_task() ──► Task ──► new_sub_task() ──► Task
//!        │                    │                          │
//!   root.token.child()   task.token.child()         done() ─► releases Task
//!                             │
//!                        done() + all subtasks complete ─► releases root
//! ```
//!
//! ## Contract
//! Every task must eventually call [`Task::done`], on every code path. A task
//! that never does keeps [`Lifecycle::wait`](crate::Lifecycle::wait) pending
//! forever; this is not detected. [`Task::spawn`] calls `done` for you, even
//! when the body panics.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::node::CompletionNode;
use super::once::OneShot;

/// Handle to one node of the task tree.
///
/// Cheap to clone; clones refer to the same task.
#[derive(Clone, Debug)]
pub struct Task {
    inner: Arc<TaskInner>,
}

#[derive(Debug)]
struct TaskInner {
    token: CancellationToken,
    node: Arc<CompletionNode>,
    done: OneShot,
    wait_logged: OneShot,
}

impl Task {
    pub(crate) fn new(
        parent_token: &CancellationToken,
        parent_node: &Arc<CompletionNode>,
    ) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                token: parent_token.child_token(),
                node: parent_node.child(),
                done: OneShot::new(),
                wait_logged: OneShot::new(),
            }),
        }
    }

    /// Creates a subtask tracked by this task (not by the root).
    ///
    /// This task only counts as complete once the subtask is complete too.
    pub fn new_sub_task(&self) -> Task {
        Task::new(&self.inner.token, &self.inner.node)
    }

    /// Cancellation token of this task.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Returns `true` once this task or one of its ancestors was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Completes when this task is cancelled.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }

    /// Cancels this task and its subtasks. Ancestors are unaffected.
    pub fn cancel(&self) {
        self.inner.token.cancel();
    }

    /// Reports this task's own body as done. Idempotent.
    pub fn done(&self) {
        if self.inner.done.try_fire() {
            self.inner.node.mark_done();
        }
    }

    /// Returns `true` once [`done`](Task::done) was called.
    pub fn is_done(&self) -> bool {
        self.inner.done.is_fired()
    }

    /// Returns `true` once the body is done and every subtask is complete.
    pub fn is_complete(&self) -> bool {
        self.inner.node.is_complete()
    }

    /// Waits until every subtask of this task is complete.
    pub async fn wait(&self) {
        self.inner.wait_logged.call(|| {
            debug!(
                pending = self.inner.node.pending_children(),
                "task waiting for subtasks"
            );
        });
        self.inner.node.wait_children().await;
    }

    /// Runs `f` on the tokio runtime and marks this task done when it ends.
    ///
    /// `done` runs whether the future completes, panics, or is aborted.
    pub fn spawn<F, Fut>(&self, f: F) -> JoinHandle<Fut::Output>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let guard = DoneGuard(self.clone());
        let fut = f(self.inner.token.clone());
        tokio::spawn(async move {
            let _guard = guard;
            fut.await
        })
    }
}

/// Calls [`Task::done`] on drop.
struct DoneGuard(Task);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn root() -> (CancellationToken, Arc<CompletionNode>) {
        (CancellationToken::new(), CompletionNode::root())
    }

    #[test]
    fn test_done_is_idempotent() {
        let (token, node) = root();
        let task = Task::new(&token, &node);
        node.mark_done();

        task.done();
        task.done();
        assert!(task.is_done());
        assert!(node.is_complete());
        assert_eq!(node.pending_children(), 0);
    }

    #[test]
    fn test_task_waits_for_sub_tasks() {
        let (token, node) = root();
        node.mark_done();
        let task = Task::new(&token, &node);
        let sub = task.new_sub_task();

        task.done();
        assert!(!task.is_complete());
        assert!(!node.is_complete());

        sub.done();
        assert!(task.is_complete());
        assert!(node.is_complete());
    }

    #[test]
    fn test_cancellation_flows_down_only() {
        let (token, node) = root();
        let task = Task::new(&token, &node);
        let sub = task.new_sub_task();

        sub.cancel();
        assert!(sub.is_cancelled());
        assert!(!task.is_cancelled());

        token.cancel();
        assert!(task.is_cancelled());
    }

    #[tokio::test]
    async fn test_spawn_marks_done_on_panic() {
        let (token, node) = root();
        let task = Task::new(&token, &node);

        let handle = task.spawn(|_ctx| async move {
            panic!("boom");
        });
        assert!(handle.await.is_err());
        assert!(task.is_done());
    }

    #[tokio::test]
    async fn test_wait_returns_after_sub_tasks() {
        let (token, node) = root();
        let task = Task::new(&token, &node);
        let sub = task.new_sub_task();

        sub.spawn(|ctx| async move {
            ctx.cancelled().await;
        });
        let waiter = {
            let task = task.clone();
            tokio::spawn(async move { task.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("subtask finished after cancellation")
            .unwrap();
    }
}

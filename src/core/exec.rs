//! # External commands managed as tasks.
//!
//! [`Lifecycle::exec`] launches a [`Command`] and tracks it with a dedicated
//! [`Task`], so [`Lifecycle::wait`] only returns once the child has exited.
//!
//! ## Flow
//! ```text
//! exec(cmd) ──► cmd.spawn() ──► new_task() ──► watcher
//!                                               ├─ child exits        → finish(status)
//!                                               └─ task cancelled     → stop_fn(child)
//!                                                  (lifecycle stop or    → child.wait()
//!                                                   ExecHandle::stop)    → finish(Stopped)
//! ```
//!
//! ## Status rules
//! - `Running` until the child has exited
//! - `Stopped` if stop was requested, or the child exited successfully
//! - `Crashed` if the child exited on its own with a failure

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::lifecycle::Lifecycle;
use super::task::Task;
use crate::error::RuntimeError;

/// Asks a running child to stop. The default kills it.
pub type StopFn = Box<dyn FnOnce(&mut Child) -> io::Result<()> + Send>;

/// Status of an external command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecStatus {
    /// The child is still running.
    Running,
    /// The child was stopped on request or exited successfully.
    Stopped,
    /// The child exited on its own with a failure.
    Crashed,
}

impl ExecStatus {
    /// Returns a short stable name.
    pub fn as_str(self) -> &'static str {
        match self {
            ExecStatus::Running => "running",
            ExecStatus::Stopped => "stopped",
            ExecStatus::Crashed => "crashed",
        }
    }
}

/// Handle to a command launched by [`Lifecycle::exec`].
#[derive(Clone, Debug)]
pub struct ExecHandle {
    inner: Arc<ExecInner>,
}

#[derive(Debug)]
struct ExecInner {
    command: String,
    task: Task,
    stop_requested: AtomicBool,
    status: Mutex<ExecStatus>,
    exited: CancellationToken,
}

impl ExecHandle {
    fn new(command: String, task: Task) -> Self {
        Self {
            inner: Arc::new(ExecInner {
                command,
                task,
                stop_requested: AtomicBool::new(false),
                status: Mutex::new(ExecStatus::Running),
                exited: CancellationToken::new(),
            }),
        }
    }

    /// Command line as it was launched.
    pub fn command(&self) -> &str {
        &self.inner.command
    }

    /// Current status.
    pub fn status(&self) -> ExecStatus {
        *self.inner.status.lock()
    }

    /// Asks the child to stop. Idempotent.
    pub fn stop(&self) {
        self.inner.task.cancel();
    }

    /// Waits until the child has exited.
    pub async fn wait(&self) -> ExecStatus {
        self.inner.exited.cancelled().await;
        self.status()
    }

    fn finish(&self, res: io::Result<std::process::ExitStatus>) {
        let status = match &res {
            _ if self.inner.stop_requested.load(Ordering::Acquire) => ExecStatus::Stopped,
            Ok(exit) if exit.success() => ExecStatus::Stopped,
            _ => ExecStatus::Crashed,
        };
        match &res {
            Ok(exit) => info!(
                command = %self.inner.command,
                status = status.as_str(),
                %exit,
                "command exited"
            ),
            Err(error) => warn!(
                command = %self.inner.command,
                %error,
                "waiting for command failed"
            ),
        }
        *self.inner.status.lock() = status;
        self.inner.exited.cancel();
    }
}

impl Lifecycle {
    /// Launches `command`; the child is killed when the lifecycle stops.
    ///
    /// Callers adapt the [`Command`] (arguments, environment, stdio) before passing it.
    pub fn exec(&self, command: Command) -> Result<ExecHandle, RuntimeError> {
        self.exec_with_stop(command, Box::new(|child: &mut Child| child.start_kill()))
    }

    /// Launches `command` and applies `stop` to the child when it must stop.
    pub fn exec_with_stop(
        &self,
        mut command: Command,
        stop: StopFn,
    ) -> Result<ExecHandle, RuntimeError> {
        let line = describe(&command);
        info!(command = %line, "starting command");

        let mut child = command.spawn().map_err(|error| RuntimeError::Spawn {
            command: line.clone(),
            error,
        })?;

        let task = self.new_task();
        let handle = ExecHandle::new(line, task.clone());
        let watched = handle.clone();

        task.spawn(move |ctx| async move {
            let exited = tokio::select! {
                res = child.wait() => Some(res),
                _ = ctx.cancelled() => None,
            };
            let res = match exited {
                Some(res) => res,
                None => {
                    watched.inner.stop_requested.store(true, Ordering::Release);
                    if let Err(error) = stop(&mut child) {
                        warn!(command = %watched.inner.command, %error, "stopping command failed");
                    }
                    child.wait().await
                }
            };
            watched.finish(res);
        });
        Ok(handle)
    }
}

fn describe(command: &Command) -> String {
    let inner = command.as_std();
    std::iter::once(inner.get_program())
        .chain(inner.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    const LONG: Duration = Duration::from_secs(5);

    fn cmd(program: &str, args: &[&str]) -> Command {
        let mut c = Command::new(program);
        c.args(args);
        c
    }

    #[tokio::test]
    async fn test_successful_exit_is_stopped() {
        let lc = Lifecycle::new();
        let h = lc.exec(cmd("true", &[])).expect("spawn true");
        assert_eq!(h.command(), "true");
        let status = tokio::time::timeout(LONG, h.wait()).await.expect("exits");
        assert_eq!(status, ExecStatus::Stopped);
    }

    #[tokio::test]
    async fn test_failed_exit_is_crashed() {
        let lc = Lifecycle::new();
        let h = lc.exec(cmd("false", &[])).expect("spawn false");
        let status = tokio::time::timeout(LONG, h.wait()).await.expect("exits");
        assert_eq!(status, ExecStatus::Crashed);
    }

    #[tokio::test]
    async fn test_stop_kills_child() {
        let lc = Lifecycle::new();
        let h = lc.exec(cmd("sleep", &["30"])).expect("spawn sleep");
        assert_eq!(h.status(), ExecStatus::Running);

        h.stop();
        let status = tokio::time::timeout(LONG, h.wait()).await.expect("killed");
        assert_eq!(status, ExecStatus::Stopped);
    }

    #[tokio::test]
    async fn test_lifecycle_stop_waits_for_child() {
        let lc = Lifecycle::new();
        let h = lc.exec(cmd("sleep", &["30"])).expect("spawn sleep");

        lc.stop();
        tokio::time::timeout(LONG, lc.wait()).await.expect("child reaped");
        assert_eq!(h.status(), ExecStatus::Stopped);
    }

    #[tokio::test]
    async fn test_custom_stop_fn_is_used() {
        let lc = Lifecycle::new();
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let h = lc
            .exec_with_stop(
                cmd("sleep", &["30"]),
                Box::new(move |child: &mut Child| {
                    flag.store(true, Ordering::SeqCst);
                    child.start_kill()
                }),
            )
            .expect("spawn sleep");

        h.stop();
        tokio::time::timeout(LONG, h.wait()).await.expect("stopped");
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let lc = Lifecycle::new();
        let err = lc
            .exec(cmd("definitely-not-a-real-binary-3f9a", &["-x"]))
            .expect_err("must fail");
        assert_eq!(err.as_label(), "runtime_spawn");
        lc.stop();
        tokio::time::timeout(LONG, lc.wait()).await.expect("no task was created");
    }
}

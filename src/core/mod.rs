//! Runtime core: the task tree and its lifecycle.
//!
//! The public API from this module is [`Lifecycle`] (root owner), [`Task`]
//! (node of the tree) and the external command helpers.
//!
//! Internal modules:
//! - [`lifecycle`]: root token and barrier, stop/wait, signal wiring;
//! - [`task`]: cancellable, completion-tracked unit of work;
//! - [`node`]: hierarchical completion barrier;
//! - [`once`]: one-shot guard for idempotent start/stop;
//! - [`shutdown`]: cross-platform OS signal listeners;
//! - [`exec`]: external commands tracked as tasks.

mod exec;
mod lifecycle;
mod node;
pub(crate) mod once;
mod shutdown;
mod task;

pub use exec::{ExecHandle, ExecStatus, StopFn};
pub use lifecycle::{Lifecycle, SignalHandler};
pub use shutdown::Signal;
pub use task::Task;

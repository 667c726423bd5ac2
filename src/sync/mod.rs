//! Concurrency primitives built on the task tree.
//!
//! - [`queue`]: cancellation-safe ordered mailbox with a single consumer;
//! - [`regulator`]: bounded admission with subprocess fan-out;
//! - [`doer`]: fire-and-forget FIFO executor;
//! - [`rwlock`]: read/write lock recording its last caller;
//! - [`wait_group`]: counter with a barrier at zero.

mod doer;
mod queue;
mod regulator;
mod rwlock;
mod wait_group;

pub use doer::{Doer, Job};
pub use queue::{CancellableQueue, Delivery};
pub use regulator::{Callback, Regulator, RegulatorProcess, WaitOutcome};
pub use rwlock::TracedRwLock;

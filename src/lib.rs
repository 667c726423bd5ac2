//! # tasktree
//!
//! **tasktree** is a small toolkit for long-running tokio services that must
//! shut down cleanly.
//!
//! It provides a tree of cancellable tasks rooted in one process-wide
//! [`Lifecycle`], a cancellation-safe mailbox, a bounded-concurrency
//! regulator and a periodic instrument sampler.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                  ┌──────────────────────────────────────────────┐
//!  SIGINT/TERM ──► │  Lifecycle (root token + completion barrier) │ ◄── wait()
//!                  └──────┬─────────────────┬─────────────────────┘
//!                         ▼                 ▼
//!                  ┌──────────────┐  ┌──────────────┐
//!                  │    Task A    │  │    Task B    │  ... each: child token,
//!                  └──────┬───────┘  └──────────────┘      done() + subtasks
//!                         ▼
//!                  ┌──────────────┐
//!                  │  SubTask A1  │
//!                  └──────────────┘
//!
//!   producers ──► CancellableQueue ──► one consumer   (cancelled by a token)
//!   driver    ──► Regulator ──► RegulatorProcess ──► subprocesses
//!   Stater    ──► every period: [Instrument values] ──► StatsHandler
//! ```
//!
//! ### Shutdown
//! ```text
//! stop() / terminating signal
//!   ├─► root token cancelled ─► every task, queue and process token
//!   │     ├─► queues: sentinel after the last accepted payload
//!   │     ├─► regulator processes: wait() returns Cancelled
//!   │     └─► staters: sampling loop exits, instruments stopped
//!   └─► root body done
//!
//! tasks call done() ─► completion ripples up ─► Lifecycle::wait() returns
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                          |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Lifecycle**     | Root of the tree, OS signals, stop/wait.                      | [`Lifecycle`], [`Signal`], [`SignalHandler`]|
//! | **Tasks**         | Cancellable, completion-tracked units of work.                | [`Task`]                                    |
//! | **Commands**      | External processes tracked as tasks.                          | [`ExecHandle`], [`ExecStatus`]              |
//! | **Queue**         | Ordered hand-off that never loses an accepted payload.        | [`CancellableQueue`], [`Delivery`]          |
//! | **Regulator**     | At most N active processes, each fanning out.                 | [`Regulator`], [`RegulatorProcess`]         |
//! | **Doer**          | Fire-and-forget FIFO job execution.                           | [`Doer`], [`Job`]                           |
//! | **Locks**         | Read/write lock with caller tracing and deadlock check.       | [`TracedRwLock`]                            |
//! | **Stats**         | Periodic sampling of instruments.                             | [`Stater`], [`Instrument`], [`StatsHandler`]|
//! | **Errors**        | Typed errors for the runtime edges.                           | [`RuntimeError`]                            |
//! | **Configuration** | Centralize tunables.                                          | [`Config`]                                  |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tasktree::{CancellableQueue, Lifecycle, Regulator, WaitOutcome};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let lifecycle = Lifecycle::new();
//!     let jobs = CancellableQueue::<u64>::new();
//!     jobs.handle_ctx(lifecycle.token().clone());
//!
//!     // Consumer: at most two jobs in flight, each fanning out into two subprocesses.
//!     let regulator = Regulator::new(2, lifecycle.token().clone());
//!     let consumer = jobs.clone();
//!     let task = lifecycle.new_task();
//!     let drivers = task.clone();
//!     task.spawn(move |_ctx| async move {
//!         consumer
//!             .start(|job| {
//!                 let regulator = regulator.clone();
//!                 let drivers = drivers.clone();
//!                 async move {
//!                     // Holds the consumer back while two jobs are in flight.
//!                     let process = regulator.new_process().await;
//!                     process.add_subprocesses(2, None);
//!                     for _ in 0..2 {
//!                         let process = process.clone();
//!                         tokio::spawn(async move {
//!                             tokio::time::sleep(Duration::from_millis(job)).await;
//!                             process.subprocess_is_done();
//!                         });
//!                     }
//!                     drivers.new_sub_task().spawn(move |_ctx| async move {
//!                         while process.wait().await == WaitOutcome::SubprocessDone {}
//!                     });
//!                 }
//!             })
//!             .await;
//!     });
//!
//!     for job in 1..=3 {
//!         let _ = jobs.send(job).await;
//!     }
//!     lifecycle.stop();
//!     lifecycle.wait().await;
//! }
//! ```

mod config;
mod core;
mod error;
mod stats;
mod sync;

// ---- Public re-exports ----

pub use config::Config;
pub use core::{ExecHandle, ExecStatus, Lifecycle, Signal, SignalHandler, StopFn, Task};
pub use error::RuntimeError;
pub use stats::{
    DurationRatio, FnInstrument, Increment, Instrument, Stat, StatMetadata, Stater, StatsFn,
    StatsHandler,
};
pub use sync::{
    Callback, CancellableQueue, Delivery, Doer, Job, Regulator, RegulatorProcess, TracedRwLock,
    WaitOutcome,
};

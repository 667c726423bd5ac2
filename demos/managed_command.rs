//! # Example: managed_command
//!
//! Launches external commands tracked by the [`Lifecycle`]: one that exits on
//! its own and one that is stopped when the lifecycle stops.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► exec("true")       ─► exits ─► status Stopped
//!   ├─► exec("sleep 60")   ─► running
//!   ├─► lifecycle.stop()   ─► sleep is killed ─► status Stopped
//!   └─► lifecycle.wait()   ─► both children have exited
//! ```
//!
//! ## Run (Unix)
//! ```bash
//! cargo run --example managed_command
//! ```

use tasktree::{ExecStatus, Lifecycle};
use tokio::process::Command;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== managed_command example ===\n");
    let lifecycle = Lifecycle::new();

    let quick = lifecycle.exec(Command::new("true"))?;
    let status = quick.wait().await;
    println!("[main] `{}` -> {}", quick.command(), status.as_str());

    let mut cmd = Command::new("sleep");
    cmd.arg("60");
    let long = lifecycle.exec(cmd)?;
    println!("[main] `{}` -> {}", long.command(), long.status().as_str());

    lifecycle.stop();
    lifecycle.wait().await;

    assert_eq!(long.status(), ExecStatus::Stopped);
    println!("[main] `{}` -> {}", long.command(), long.status().as_str());
    Ok(())
}

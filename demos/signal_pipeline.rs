//! # Example: signal_pipeline
//!
//! A producer feeds jobs into a [`CancellableQueue`]; the consumer admits them
//! through a [`Regulator`] (two in flight) and every job fans out into three
//! subprocesses. A [`Stater`] prints the listen ratio and the number of active
//! processes every second.
//!
//! Stops on Ctrl-C, or by itself after five seconds.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► Lifecycle::handle_signals (Ctrl-C → stop)
//!   ├─► producer task ── send(job) ──► queue
//!   ├─► consumer task ── start(consumer)
//!   │     └─► regulator.new_process()   (waits while 2 are active)
//!   │           ├─► 3 subprocesses (sleep, subprocess_is_done)
//!   │           └─► driver subtask: wait() until Finished or Cancelled
//!   ├─► stater: prints a snapshot every second
//!   └─► lifecycle.wait() ─► every task done
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example signal_pipeline
//! ```

use std::sync::Arc;
use std::time::Duration;

use tasktree::{
    CancellableQueue, Delivery, Lifecycle, Regulator, Signal, SignalHandler, Stat, Stater,
    StatsFn, WaitOutcome,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== signal_pipeline example ===\n");

    // 1. Root of the tree; Ctrl-C stops it
    let lifecycle = Lifecycle::new();
    let on_signal: SignalHandler = Arc::new(|sig: Signal| println!("[main] received {sig}"));
    lifecycle.handle_signals(vec![on_signal])?;

    // 2. Queue, regulator and stats
    let jobs = CancellableQueue::<u32>::new();
    jobs.handle_ctx(lifecycle.token().clone());
    let regulator = Regulator::new(2, lifecycle.token().clone());

    let stater = Stater::new(
        Duration::from_secs(1),
        StatsFn::arc(|stats: Vec<Stat>| {
            let line: Vec<String> = stats
                .iter()
                .map(|s| format!("{} = {:.1}{}", s.metadata.label, s.value, s.metadata.unit))
                .collect();
            println!("[stats] {}", line.join(", "));
        }),
    );
    jobs.add_stats(&stater);
    regulator.add_stats(&stater);
    stater.start(lifecycle.token());

    // 3. Consumer: one driver subtask per admitted job
    let consumer_task = lifecycle.new_task();
    let drivers = consumer_task.clone();
    let consumer = jobs.clone();
    consumer_task.spawn(move |_ctx| async move {
        consumer
            .start(|job| {
                let regulator = regulator.clone();
                let drivers = drivers.clone();
                async move {
                    let process = regulator.new_process().await;
                    process.add_subprocesses(3, None);
                    for part in 0..3u64 {
                        let process = process.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(Duration::from_millis(200 + 100 * part)).await;
                            process.subprocess_is_done();
                        });
                    }
                    drivers.new_sub_task().spawn(move |_ctx| async move {
                        loop {
                            match process.wait().await {
                                WaitOutcome::SubprocessDone => println!("[job {job}] part done"),
                                WaitOutcome::Finished => {
                                    println!("[job {job}] finished");
                                    break;
                                }
                                WaitOutcome::Cancelled => {
                                    println!("[job {job}] cancelled");
                                    break;
                                }
                            }
                        }
                    });
                }
            })
            .await;
        println!("[consumer] queue drained");
    });

    // 4. Producer: one job every 250ms until the queue rejects
    let producer = jobs.clone();
    lifecycle.new_task().spawn(move |_ctx| async move {
        for job in 1.. {
            if producer.send(job).await == Delivery::Rejected {
                println!("[producer] queue closed after {} jobs", job - 1);
                break;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    });

    // 5. Self-stop so the example terminates without Ctrl-C
    let stopper = lifecycle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        println!("[main] time is up, stopping");
        stopper.stop();
    });

    lifecycle.wait().await;
    println!("\n=== all tasks done ===");
    Ok(())
}

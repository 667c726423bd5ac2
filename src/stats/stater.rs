//! # Stater: periodic instrument sampler.
//!
//! ## Architecture
//! ```text
//! add_stat(meta, instrument) ──► [ (meta₁, inst₁), (meta₂, inst₂), ... ]   (registration order)
//!
//! start(parent)
//!   ├─► token = parent.child_token()
//!   ├─► every instrument.start()
//!   └─► sampling loop (every `period`):
//!         delta = now - last_tick
//!         snapshot = [ Stat{meta₁, inst₁.value(delta)}, ... ]
//!         dispatcher.dispatch(snapshot)   (never awaits the handler)
//!
//! stop() / parent cancelled
//!   └─► loop exits ─► every instrument.stop() ─► dispatcher drained
//! ```
//!
//! ## Rules
//! - `start` and `stop` are idempotent; each re-arms the other by installing a fresh guard
//! - `delta` is measured, not assumed, so a delayed tick is not misreported
//! - A start on an already cancelled parent is a no-op until the next `stop`

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::handler::{Dispatcher, StatsHandler};
use super::instrument::{Instrument, Stat, StatMetadata};
use crate::config::Config;
use crate::core::once::OneShot;

struct Entry {
    metadata: StatMetadata,
    instrument: Arc<dyn Instrument>,
}

struct Guards {
    start: Arc<OneShot>,
    stop: Arc<OneShot>,
}

/// Periodic sampler of registered instruments.
///
/// Cheap to clone; clones share the same registrations and state.
#[derive(Clone)]
pub struct Stater {
    inner: Arc<StaterInner>,
}

struct StaterInner {
    period: Duration,
    queue_capacity: usize,
    handler: Arc<dyn StatsHandler>,
    stats: Mutex<Vec<Entry>>,
    guards: Mutex<Guards>,
    running: Mutex<Option<CancellationToken>>,
    /// Bumped on every launch; a finished loop only stops instruments it started.
    generation: AtomicU64,
}

impl Stater {
    /// Creates a stater sampling every `period` and feeding `handler`.
    pub fn new(period: Duration, handler: Arc<dyn StatsHandler>) -> Self {
        let cfg = Config {
            stat_period: period,
            ..Config::default()
        };
        Self::with_config(&cfg, handler)
    }

    /// Creates a stater from the stats section of `cfg`.
    pub fn with_config(cfg: &Config, handler: Arc<dyn StatsHandler>) -> Self {
        Self {
            inner: Arc::new(StaterInner {
                period: cfg.stat_period_clamped(),
                queue_capacity: cfg.stats_queue_capacity_clamped(),
                handler,
                stats: Mutex::new(Vec::new()),
                guards: Mutex::new(Guards {
                    start: Arc::new(OneShot::new()),
                    stop: Arc::new(OneShot::new()),
                }),
                running: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Sampling period.
    pub fn period(&self) -> Duration {
        self.inner.period
    }

    /// Registers an instrument; snapshots list instruments in registration order.
    ///
    /// Meant to be called before [`start`](Stater::start). An instrument added
    /// while running is started right away.
    pub fn add_stat(&self, metadata: StatMetadata, instrument: Arc<dyn Instrument>) {
        if self.is_running() {
            instrument.start();
        }
        self.inner.stats.lock().push(Entry {
            metadata,
            instrument,
        });
    }

    /// Metadata of every registered instrument, in registration order.
    pub fn metadata(&self) -> Vec<StatMetadata> {
        self.inner
            .stats
            .lock()
            .iter()
            .map(|e| e.metadata.clone())
            .collect()
    }

    /// Returns `true` while the sampling loop is running.
    pub fn is_running(&self) -> bool {
        self.inner
            .running
            .lock()
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    /// Starts sampling until [`stop`](Stater::stop) or `parent` cancellation. Idempotent.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, parent: &CancellationToken) {
        let guard = self.inner.guards.lock().start.clone();
        guard.call(|| self.launch(parent));
    }

    /// Stops sampling and every instrument. Idempotent.
    pub fn stop(&self) {
        let guard = self.inner.guards.lock().stop.clone();
        guard.call(|| {
            if let Some(token) = self.inner.running.lock().take() {
                token.cancel();
            }
            for e in self.inner.stats.lock().iter() {
                e.instrument.stop();
            }
            self.inner.guards.lock().start = Arc::new(OneShot::new());
        });
    }

    fn launch(&self, parent: &CancellationToken) {
        if parent.is_cancelled() {
            return;
        }
        let token = parent.child_token();
        *self.inner.running.lock() = Some(token.clone());
        self.inner.guards.lock().stop = Arc::new(OneShot::new());

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        for e in self.inner.stats.lock().iter() {
            e.instrument.start();
        }

        let dispatcher = Dispatcher::spawn(self.inner.handler.clone(), self.inner.queue_capacity);
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.sample_loop(token, generation, dispatcher).await });
        debug!(period = ?self.inner.period, "stats sampling started");
    }
}

impl StaterInner {
    async fn sample_loop(&self, token: CancellationToken, generation: u64, dispatcher: Dispatcher) {
        let mut last = Instant::now();
        let mut ticker = time::interval_at(last + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let delta = now - last;
                    last = now;
                    dispatcher.dispatch(self.sample(delta));
                }
            }
        }

        {
            let stats = self.stats.lock();
            if self.generation.load(Ordering::Acquire) == generation {
                for e in stats.iter() {
                    e.instrument.stop();
                }
            }
        }
        dispatcher.shutdown().await;
        debug!("stats sampling stopped");
    }

    fn sample(&self, delta: Duration) -> Vec<Stat> {
        self.stats
            .lock()
            .iter()
            .map(|e| Stat {
                metadata: e.metadata.clone(),
                value: e.instrument.value(delta),
            })
            .collect()
    }
}

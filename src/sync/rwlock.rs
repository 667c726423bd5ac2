//! # Read/write lock with caller tracing.
//!
//! [`TracedRwLock`] wraps a [`parking_lot::RwLock`] and remembers where the
//! last lock was acquired, to ease deadlock debugging. With logging enabled,
//! every request and acquisition is emitted at `debug` level with the caller
//! location.
//!
//! [`TracedRwLock::is_deadlocked`] checks whether the write lock can be taken
//! within a timeout; on failure, [`TracedRwLock::last_caller`] points at the
//! most recent holder.
//!
//! The lock is synchronous: never hold a guard across an `.await`.

use std::borrow::Cow;
use std::fmt;
use std::panic::Location;
use std::time::Duration;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Named read/write lock that records its last successful caller.
pub struct TracedRwLock<T> {
    name: Cow<'static, str>,
    log: bool,
    lock: RwLock<T>,
    last_caller: Mutex<Option<&'static Location<'static>>>,
}

impl<T> TracedRwLock<T> {
    /// Creates a lock named `name`; `log` enables per-acquisition debug events.
    pub fn new(name: impl Into<Cow<'static, str>>, value: T, log: bool) -> Self {
        Self {
            name: name.into(),
            log,
            lock: RwLock::new(value),
            last_caller: Mutex::new(None),
        }
    }

    /// Lock name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquires the write lock.
    #[track_caller]
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        let caller = Location::caller();
        if self.log {
            debug!(lock = %self.name, %caller, "requesting write lock");
        }
        let guard = self.lock.write();
        self.acquired(caller, "write lock acquired");
        guard
    }

    /// Acquires a read lock.
    #[track_caller]
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        let caller = Location::caller();
        if self.log {
            debug!(lock = %self.name, %caller, "requesting read lock");
        }
        let guard = self.lock.read();
        self.acquired(caller, "read lock acquired");
        guard
    }

    fn acquired(&self, caller: &'static Location<'static>, msg: &'static str) {
        if self.log {
            debug!(lock = %self.name, %caller, "{msg}");
        }
        *self.last_caller.lock() = Some(caller);
    }

    /// Location of the last successful `read` or `write`.
    pub fn last_caller(&self) -> Option<&'static Location<'static>> {
        *self.last_caller.lock()
    }

    /// Returns `true` if the write lock could not be taken within `timeout`.
    ///
    /// Blocks the current thread for up to `timeout`; from async code, call it
    /// through `tokio::task::spawn_blocking`.
    pub fn is_deadlocked(&self, timeout: Duration) -> bool {
        self.lock.try_write_for(timeout).is_none()
    }
}

impl<T> fmt::Debug for TracedRwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedRwLock")
            .field("name", &self.name)
            .field("last_caller", &self.last_caller())
            .finish_non_exhaustive()
    }
}

//! Counter of outstanding units with an async barrier at zero.

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::error;

#[derive(Debug, Default)]
pub(crate) struct WaitGroup {
    count: Mutex<usize>,
    zero: Notify,
}

impl WaitGroup {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, n: usize) {
        *self.count.lock() += n;
    }

    /// Releases one unit. Releasing below zero is ignored (error log).
    pub(crate) fn done(&self) {
        let drained = {
            let mut count = self.count.lock();
            if *count == 0 {
                drop(count);
                error!("wait group released more units than added");
                return;
            }
            *count -= 1;
            *count == 0
        };
        if drained {
            self.zero.notify_waiters();
        }
    }

    #[cfg(test)]
    pub(crate) fn count(&self) -> usize {
        *self.count.lock()
    }

    /// Waits until the counter is zero.
    pub(crate) async fn wait(&self) {
        loop {
            let notified = self.zero.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if *self.count.lock() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_at_zero() {
        let wg = Arc::new(WaitGroup::new());
        wg.wait().await;

        wg.add(2);
        let waiter = {
            let wg = wg.clone();
            tokio::spawn(async move { wg.wait().await })
        };
        wg.done();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        wg.done();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter must wake up")
            .unwrap();
    }

    #[test]
    fn test_underflow_is_ignored() {
        let wg = WaitGroup::new();
        wg.done();
        assert_eq!(wg.count(), 0);
        wg.add(1);
        assert_eq!(wg.count(), 1);
    }
}

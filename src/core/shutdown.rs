//! # Cross-platform OS signal handling.
//!
//! Provides [`listen`], which forwards OS notifications as [`Signal`] values
//! until its token is cancelled.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal), `SIGTERM`, `SIGQUIT`, `SIGABRT`: terminating
//! - `SIGHUP`, `SIGUSR1`, `SIGUSR2`: informational (handlers only)
//! - `SIGKILL` cannot be observed by a process and is not listed
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Notification received from the operating system.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    /// `SIGINT` / Ctrl-C.
    Interrupt,
    /// `SIGTERM`.
    Terminate,
    /// `SIGQUIT`.
    Quit,
    /// `SIGABRT`.
    Abort,
    /// `SIGHUP`.
    Hangup,
    /// `SIGUSR1`.
    User1,
    /// `SIGUSR2`.
    User2,
}

impl Signal {
    /// Returns `true` for signals that stop the lifecycle.
    pub fn is_terminating(self) -> bool {
        matches!(
            self,
            Signal::Interrupt | Signal::Terminate | Signal::Quit | Signal::Abort
        )
    }

    /// Returns a short stable name.
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Interrupt => "interrupt",
            Signal::Terminate => "terminate",
            Signal::Quit => "quit",
            Signal::Abort => "abort",
            Signal::Hangup => "hangup",
            Signal::User1 => "user1",
            Signal::User2 => "user2",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `SIGABRT` number (POSIX).
#[cfg(unix)]
const SIGABRT: i32 = 6;

/// Registers OS signal listeners and forwards received signals.
///
/// Registration happens before returning, so failures surface here.
/// The forwarder exits when `token` is cancelled or the receiver is dropped.
#[cfg(unix)]
pub(crate) fn listen(token: CancellationToken) -> std::io::Result<mpsc::Receiver<Signal>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;
    let mut sigabrt = signal(SignalKind::from_raw(SIGABRT))?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigusr2 = signal(SignalKind::user_defined2())?;

    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        loop {
            let sig = tokio::select! {
                _ = token.cancelled() => break,
                Some(()) = sigint.recv() => Signal::Interrupt,
                Some(()) = sigterm.recv() => Signal::Terminate,
                Some(()) = sigquit.recv() => Signal::Quit,
                Some(()) = sigabrt.recv() => Signal::Abort,
                Some(()) = sighup.recv() => Signal::Hangup,
                Some(()) = sigusr1.recv() => Signal::User1,
                Some(()) = sigusr2.recv() => Signal::User2,
            };
            if tx.send(sig).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

/// Registers OS signal listeners and forwards received signals.
///
/// Only Ctrl-C is available on this platform.
#[cfg(not(unix))]
pub(crate) fn listen(token: CancellationToken) -> std::io::Result<mpsc::Receiver<Signal>> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                res = tokio::signal::ctrl_c() => {
                    if res.is_err() || tx.send(Signal::Interrupt).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminating_signals() {
        assert!(Signal::Interrupt.is_terminating());
        assert!(Signal::Terminate.is_terminating());
        assert!(Signal::Quit.is_terminating());
        assert!(Signal::Abort.is_terminating());
        assert!(!Signal::Hangup.is_terminating());
        assert!(!Signal::User1.is_terminating());
        assert!(!Signal::User2.is_terminating());
    }

    #[test]
    fn test_display() {
        assert_eq!(Signal::Hangup.to_string(), "hangup");
        assert_eq!(Signal::Abort.to_string(), "abort");
    }
}

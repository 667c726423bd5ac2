//! Error types used by the tasktree runtime.
//!
//! Only genuine failures are errors here. Cancellation, rejection of a payload
//! by a cancelled queue, or a process woken by its token are normal outcomes
//! and are reported through [`Delivery`](crate::Delivery),
//! [`WaitOutcome`](crate::WaitOutcome) and [`ExecStatus`](crate::ExecStatus).
//!
//! [`RuntimeError`] provides helper methods (`as_label`, `as_message`) for
//! logs and metrics.

use std::io;

use thiserror::Error;

/// # Errors produced by the tasktree runtime.
///
/// These represent failures to wire the runtime to the operating system:
/// registering signal listeners or launching an external command.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Registering the OS signal listeners failed.
    #[error("registering signal listeners failed: {error}")]
    Signals {
        /// The underlying I/O error.
        #[source]
        error: io::Error,
    },

    /// Spawning an external command failed.
    #[error("spawning {command} failed: {error}")]
    Spawn {
        /// Human-readable command line.
        command: String,
        /// The underlying I/O error.
        #[source]
        error: io::Error,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use tasktree::RuntimeError;
    ///
    /// let err = RuntimeError::Signals { error: std::io::Error::other("denied") };
    /// assert_eq!(err.as_label(), "runtime_signals");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Signals { .. } => "runtime_signals",
            RuntimeError::Spawn { .. } => "runtime_spawn",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::Signals { error } => format!("signals: {error}"),
            RuntimeError::Spawn { command, error } => format!("spawn {command:?}: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        let sig = RuntimeError::Signals {
            error: io::Error::other("denied"),
        };
        let spawn = RuntimeError::Spawn {
            command: "ffmpeg -i in.wav".into(),
            error: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(sig.as_label(), "runtime_signals");
        assert_eq!(spawn.as_label(), "runtime_spawn");
    }

    #[test]
    fn test_display_includes_command() {
        let err = RuntimeError::Spawn {
            command: "ffmpeg -i in.wav".into(),
            error: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        let text = err.to_string();
        assert!(text.contains("ffmpeg -i in.wav"), "got {text}");
        assert!(err.as_message().starts_with("spawn "));
    }
}

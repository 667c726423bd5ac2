//! # Instrument contract and snapshot types.
//!
//! An [`Instrument`] is a stateful measurement source sampled by the [`Stater`](crate::Stater).
//! [`Instrument::value`] must be an atomic read-and-reset: two consecutive
//! samples never count the same elapsed time or the same increment twice.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

/// Stateful measurement source sampled periodically.
pub trait Instrument: Send + Sync + 'static {
    /// Resets the instrument and begins recording.
    fn start(&self);

    /// Stops recording.
    fn stop(&self);

    /// Returns the value for the window of length `delta` and resets it.
    fn value(&self, delta: Duration) -> f64;
}

/// Describes one instrument in a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatMetadata {
    /// Short label, e.g. `"Listen ratio"`.
    pub label: Cow<'static, str>,
    /// One sentence describing what is measured.
    pub description: Cow<'static, str>,
    /// Unit of the value (`"%"`, empty for plain counts).
    pub unit: Cow<'static, str>,
}

impl StatMetadata {
    /// Creates metadata from its three parts.
    pub fn new(
        label: impl Into<Cow<'static, str>>,
        description: impl Into<Cow<'static, str>>,
        unit: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
            unit: unit.into(),
        }
    }
}

/// One sampled value.
#[derive(Clone, Debug, PartialEq)]
pub struct Stat {
    /// Metadata the instrument was registered with.
    pub metadata: StatMetadata,
    /// Value returned by [`Instrument::value`].
    pub value: f64,
}

/// Closure-backed instrument without start/stop.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use tasktree::{FnInstrument, Instrument};
///
/// let gauge = FnInstrument::arc(|_delta: Duration| 3.0);
/// assert_eq!(gauge.value(Duration::from_secs(1)), 3.0);
/// ```
#[derive(Debug)]
pub struct FnInstrument<F> {
    f: F,
}

impl<F> FnInstrument<F>
where
    F: Fn(Duration) -> f64 + Send + Sync + 'static,
{
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wraps `f` and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

impl<F> Instrument for FnInstrument<F>
where
    F: Fn(Duration) -> f64 + Send + Sync + 'static,
{
    fn start(&self) {}

    fn stop(&self) {}

    fn value(&self, delta: Duration) -> f64 {
        (self.f)(delta)
    }
}

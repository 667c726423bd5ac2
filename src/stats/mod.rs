//! Periodic instrumentation.
//!
//! - [`stater`]: the sampling loop and its registrations;
//! - [`instrument`]: the [`Instrument`] contract and snapshot types;
//! - [`duration`]: busy-time ratio over keyed intervals;
//! - [`increment`]: counter reset on every sample;
//! - [`handler`]: snapshot handlers and non-blocking dispatch.

mod duration;
mod handler;
mod increment;
mod instrument;
mod stater;

pub use duration::DurationRatio;
pub use handler::{StatsFn, StatsHandler};
pub(crate) use handler::panic_message;
pub use increment::Increment;
pub use instrument::{FnInstrument, Instrument, Stat, StatMetadata};
pub use stater::Stater;

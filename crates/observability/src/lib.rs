//! Logging and metrics for X-Vine tools.
//!
//! Library crates only emit `tracing` events and `metrics` counters. Binaries
//! call [`init_logging`] and, when they want to print counters, install a
//! [`MetricsSnapshot`] before creating any overlay.

mod logging;
mod snapshot;

pub use logging::{LogArgs, init_logging};
pub use snapshot::{CounterValue, MetricsSnapshot};

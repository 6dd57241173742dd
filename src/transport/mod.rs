//! Violation delivery to the downstream processor.
//!
//! Reports are handed to a `ViolationNotifier`, a small worker pool fed by a
//! bounded channel, so a slow processor never stalls frame production. Sinks
//! decide where a report goes: HTTP POST (`HttpSink`) or the log (`LogSink`).

mod notifier;
mod report;
mod sink;

pub use notifier::{NotifierSnapshot, ViolationNotifier};
pub use report::ViolationReport;
pub use sink::{validate_endpoint, HttpSink, LogSink, ViolationSink};

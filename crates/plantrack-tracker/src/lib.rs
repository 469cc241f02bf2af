#![forbid(unsafe_code)]
//! plantrack-tracker: the per-process face of the optimizer tracker.
//!
//! A [`TrackerContext`] owns this process's configuration, attaches lazily
//! to the shared fingerprint store on first use, and implements the two
//! executor-hook contracts: enable instrumentation at execution start, and
//! assess + record the plan at execution end. It also exposes the
//! inspection surface (`scan`, `reset`, `flush`, `status`) and runs the
//! auto-flush protocol when dropped.

pub mod report;
pub mod tracker;

pub use report::{LogReporter, PlanReporter};
pub use tracker::{Execution, InstrumentOptions, StoreStatus, TrackerContext};

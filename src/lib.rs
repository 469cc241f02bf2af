#![forbid(unsafe_code)]
//! plantrack: cardinality-estimation-quality tracking for executed query
//! plans.
//!
//! Facade over the workspace crates. Embedders usually need only
//! [`TrackerContext`] plus the plan-tree model to feed it; the lower layers
//! are re-exported for tests and advanced integrations.

pub use plantrack_core::config::{TrackMode, TrackerConfig};
pub use plantrack_core::error::{Error, Result};
pub use plantrack_core::id::{Fingerprint, QueryKey, TenantId};
pub use plantrack_core::plan::{
    BufferCounters, Instrumentation, NodeKind, PlanNode, SubPlan, WorkerSet,
};
pub use plantrack_core::rstats::RStats;

pub use plantrack_estimator::{assess_plan, PlanMetrics};

pub use plantrack_store::{
    capacity_entries, EntryStats, FingerprintStore, StoreRow, UpsertOutcome, STATS_FILE_NAME,
};

pub use plantrack_tracker::{
    Execution, InstrumentOptions, LogReporter, PlanReporter, StoreStatus, TrackerContext,
};

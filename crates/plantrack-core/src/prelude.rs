//! Convenient re-exports for downstream crates.

pub use crate::config::{TrackMode, TrackerConfig};
pub use crate::error::{Error, Result};
pub use crate::id::{Fingerprint, QueryKey, TenantId};
pub use crate::plan::{
    BufferCounters, InstrTotals, Instrumentation, NodeKind, PlanNode, SubPlan, WorkerSet,
};
pub use crate::rstats::RStats;

//! Per-execution output of the plan walker.

use serde::{Deserialize, Serialize};

use plantrack_core::plan::BufferCounters;

/// Everything one execution contributes to the fingerprint store.
///
/// The four error scalars are non-negative, or `-1.0` when no node
/// contributed (`wca_error` is also `-1.0` whenever the plan's total cost
/// was non-positive). Hotspot factors are non-negative and zero when no
/// qualifying node exists. Buffer counters are injected by the caller via
/// [`PlanMetrics::with_buffers`]; the walk itself never derives them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanMetrics {
    /// Mean `|ln(real/planned)|` over assessed nodes.
    pub avg_error: f64,
    /// Root mean square of the per-node errors.
    pub rms_error: f64,
    /// Time-weighted mean error.
    pub twa_error: f64,
    /// Cost-weighted mean error.
    pub wca_error: f64,

    /// Worst join-clause filter pressure seen at any join node.
    pub max_join_filter_factor: f64,
    /// Worst scan-filter pressure seen at any leaf.
    pub max_scan_filter_factor: f64,
    /// Worst correlated-subplan repetition factor.
    pub worst_subplan_factor: f64,

    pub blks_accessed: u64,
    pub local_blks: u64,

    /// Nodes that contributed to the error scalars.
    pub evaluated_nodes: i32,
    /// Total nodes in the plan, sub-plans included.
    pub plan_nodes: i32,
    /// Join-variety nodes in the plan.
    pub njoins: u32,

    /// Executor wall time, seconds. Positive by walker precondition.
    pub totaltime: f64,
}

impl PlanMetrics {
    /// Attach the host's aggregated buffer counters.
    pub fn with_buffers(mut self, buffers: &BufferCounters) -> Self {
        self.blks_accessed = buffers.blks_accessed();
        self.local_blks = buffers.local_blks();
        self
    }

    /// Wall time at the statistics boundary, milliseconds.
    pub fn exec_time_ms(&self) -> f64 {
        self.totaltime * 1000.0
    }
}

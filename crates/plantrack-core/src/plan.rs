//! Borrowed plan-tree model the estimator walks.
//!
//! The host engine produces and destroys the tree; the walker borrows it
//! immutably for one execution. Sub-plans hang off expression positions and
//! are *not* regular children: recursion must reach each of them exactly
//! once, from its owning node, never through the child list.

use serde::{Deserialize, Serialize};

/// Operator kinds, reduced to what the estimator distinguishes: join
/// varieties get the join-filter hotspot treatment, everything else is
/// classified structurally (a node with no regular children is a leaf).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Scan,
    IndexScan,
    NestLoop,
    HashJoin,
    MergeJoin,
    Aggregate,
    Sort,
    Gather,
    Other,
}

impl NodeKind {
    pub fn is_join(self) -> bool {
        matches!(self, NodeKind::NestLoop | NodeKind::HashJoin | NodeKind::MergeJoin)
    }
}

/// Per-node runtime counters.
///
/// `running`/`tuplecount` describe a loop still in flight; `closed()` folds
/// it in without mutating the tree, which is what makes the close-out
/// idempotent. Times are in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Instrumentation {
    pub running: bool,
    pub tuplecount: f64,
    pub nloops: f64,
    pub ntuples: f64,
    pub ntuples2: f64,
    pub nfiltered1: f64,
    pub nfiltered2: f64,
    pub total: f64,
}

/// Finalized counters after the (virtual) end-of-loop close-out.
#[derive(Debug, Clone, Copy)]
pub struct InstrTotals {
    pub nloops: f64,
    pub ntuples: f64,
    pub ntuples2: f64,
    pub nfiltered1: f64,
    pub nfiltered2: f64,
    pub total: f64,
}

impl Instrumentation {
    /// Counters for `nloops` completed loops producing `ntuples` in
    /// `total` seconds.
    pub fn completed(nloops: f64, ntuples: f64, total: f64) -> Self {
        Self {
            nloops,
            ntuples,
            total,
            ..Self::default()
        }
    }

    /// Close out any in-flight loop and return the finalized totals.
    pub fn closed(&self) -> InstrTotals {
        let mut nloops = self.nloops;
        let mut ntuples = self.ntuples;
        if self.running {
            nloops += 1.0;
            ntuples += self.tuplecount;
        }
        InstrTotals {
            nloops,
            ntuples,
            ntuples2: self.ntuples2,
            nfiltered1: self.nfiltered1,
            nfiltered2: self.nfiltered2,
            total: self.total,
        }
    }
}

/// Per-worker instrumentation for a parallel node. The node's own
/// `Instrumentation` keeps the aggregated totals; this carries the
/// per-worker breakdown plus whether the leader also ran the plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerSet {
    pub leader_participation: bool,
    pub workers: Vec<Instrumentation>,
}

impl WorkerSet {
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }
}

/// A correlated subquery executed from an expression position. Its
/// instrumentation is attached to its own plan head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubPlan {
    pub root: PlanNode,
}

/// One operator node of an executed plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanNode {
    pub kind: NodeKind,
    /// Rows the planner predicted per loop.
    pub plan_rows: f64,
    /// Planner cost of the subtree rooted here.
    pub total_cost: f64,
    pub children: Vec<PlanNode>,
    pub subplans: Vec<SubPlan>,
    pub instrument: Option<Instrumentation>,
    pub workers: Option<WorkerSet>,
}

impl PlanNode {
    pub fn new(kind: NodeKind, plan_rows: f64, total_cost: f64) -> Self {
        Self {
            kind,
            plan_rows,
            total_cost,
            children: Vec::new(),
            subplans: Vec::new(),
            instrument: None,
            workers: None,
        }
    }

    pub fn with_instrument(mut self, instrument: Instrumentation) -> Self {
        self.instrument = Some(instrument);
        self
    }

    pub fn with_children(mut self, children: Vec<PlanNode>) -> Self {
        self.children = children;
        self
    }
}

/// Aggregated buffer counters the host hands over per execution. The two
/// derived values are what the store tracks.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BufferCounters {
    pub shared_blks_hit: u64,
    pub shared_blks_read: u64,
    pub shared_blks_written: u64,
    pub local_blks_read: u64,
    pub local_blks_written: u64,
    pub local_blks_dirtied: u64,
}

impl BufferCounters {
    /// Shared-buffer traffic: hits + reads + writes.
    pub fn blks_accessed(&self) -> u64 {
        self.shared_blks_hit + self.shared_blks_read + self.shared_blks_written
    }

    /// Local-buffer traffic, a work_mem pressure indicator.
    pub fn local_blks(&self) -> u64 {
        self.local_blks_read + self.local_blks_written + self.local_blks_dirtied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_out_is_idempotent() {
        let instr = Instrumentation {
            running: true,
            tuplecount: 5.0,
            nloops: 2.0,
            ntuples: 20.0,
            total: 0.5,
            ..Instrumentation::default()
        };
        let first = instr.closed();
        let second = instr.closed();
        assert_eq!(first.nloops, 3.0);
        assert_eq!(first.ntuples, 25.0);
        assert_eq!(second.nloops, first.nloops);
        assert_eq!(second.ntuples, first.ntuples);
    }

    #[test]
    fn buffer_counter_derivation() {
        let buf = BufferCounters {
            shared_blks_hit: 10,
            shared_blks_read: 5,
            shared_blks_written: 1,
            local_blks_read: 2,
            local_blks_written: 3,
            local_blks_dirtied: 4,
        };
        assert_eq!(buf.blks_accessed(), 16);
        assert_eq!(buf.local_blks(), 9);
    }
}

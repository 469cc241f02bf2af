//! Post-order traversal deriving the estimation-error scalars.

use plantrack_core::error::{Error, Result};
use plantrack_core::plan::{PlanNode, SubPlan};

use crate::metrics::PlanMetrics;

struct WalkState {
    totaltime: f64,
    totalcost: f64,

    /// Nodes visited so far; also drives leaf detection.
    counter: i32,
    /// Nodes that contributed to the error scalars.
    nnodes: i32,
    njoins: u32,

    avg_error: f64,
    rms_error: f64,
    twa_error: f64,
    wca_error: f64,

    max_join_filter: f64,
    max_scan_filter: f64,
    worst_subplan: f64,
}

/// Assess planning quality for one executed plan.
///
/// Walks every node (sub-plans included) exactly once and derives the error
/// scalars and hotspot factors of [`PlanMetrics`]. `totaltime` is the
/// executor wall time in seconds and must be positive; `totalcost` is the
/// planner's total cost for the plan, and a non-positive value turns the
/// cost-weighted error off (`-1.0`).
pub fn assess_plan(root: &PlanNode, totaltime: f64, totalcost: f64) -> Result<PlanMetrics> {
    if totaltime <= 0.0 {
        return Err(Error::Precondition(format!(
            "plan walker requires a positive total time, got {totaltime}"
        )));
    }

    let mut state = WalkState {
        totaltime,
        totalcost,
        counter: 0,
        nnodes: 0,
        njoins: 0,
        avg_error: 0.0,
        rms_error: 0.0,
        twa_error: 0.0,
        wca_error: 0.0,
        max_join_filter: 0.0,
        max_scan_filter: 0.0,
        worst_subplan: 0.0,
    };

    visit(root, &mut state);

    let (avg, rms, twa, wca) = if state.nnodes > 0 {
        let n = state.nnodes as f64;
        (
            state.avg_error / n,
            (state.rms_error / n).sqrt(),
            state.twa_error / n,
            if state.totalcost > 0.0 {
                state.wca_error / n
            } else {
                -1.0
            },
        )
    } else {
        (-1.0, -1.0, -1.0, -1.0)
    };

    Ok(PlanMetrics {
        avg_error: avg,
        rms_error: rms,
        twa_error: twa,
        wca_error: wca,
        max_join_filter_factor: state.max_join_filter,
        max_scan_filter_factor: state.max_scan_filter,
        worst_subplan_factor: state.worst_subplan,
        blks_accessed: 0,
        local_blks: 0,
        evaluated_nodes: state.nnodes,
        plan_nodes: state.counter,
        njoins: state.njoins,
        totaltime,
    })
}

fn visit(node: &PlanNode, st: &mut WalkState) {
    st.counter += 1;
    let pre_counter = st.counter;

    for child in &node.children {
        visit(child, st);
    }

    // A leaf has no regular children; sub-plans hang off expressions and do
    // not count.
    let is_leaf = pre_counter == st.counter;

    visit_subplans(&node.subplans, st);

    if node.kind.is_join() {
        st.njoins += 1;
    }

    let Some(instrument) = node.instrument.as_ref() else {
        return;
    };
    let totals = instrument.closed();
    let nloops = totals.nloops;
    if nloops <= 0.0 || totals.total == 0.0 {
        // Never executed, or timing instrumentation switched off.
        return;
    }

    let mut plan_rows;
    let mut real_rows = 0.0;

    if let Some(ws) = node.workers.as_ref() {
        // The node's own instrumentation aggregates across workers; the
        // per-worker array lets us reconstruct rows-per-loop without the
        // skew an overall average would introduce.
        let nworkers = ws.num_workers() as f64;
        let mut divisor = nworkers;
        if ws.leader_participation {
            let leader_share = 1.0 - 0.3 * nworkers;
            if leader_share > 0.0 {
                divisor += leader_share;
            }
        }
        plan_rows = node.plan_rows * divisor;

        let mut wntuples = 0.0;
        let mut wnloops = 0.0;
        for worker in &ws.workers {
            let wt = worker.closed();
            if wt.nloops <= 0.0 {
                // Worker launched but never processed a tuple.
                debug_assert!(wt.ntuples <= 0.0);
                continue;
            }
            let mut produced = wt.ntuples;
            if is_leaf {
                produced += wt.nfiltered1 + wt.nfiltered2 + wt.ntuples2;
            }
            wntuples += produced;
            wnloops += wt.nloops;
            real_rows += produced / wt.nloops;
        }

        debug_assert!(nloops >= wnloops);
        if nloops - wnloops > 0.0 {
            // Residual loops ran in the leader.
            let mut ntuples = totals.ntuples;
            if is_leaf {
                ntuples += totals.nfiltered1 + totals.nfiltered2 + totals.ntuples2;
            }
            debug_assert!(ntuples >= wntuples);
            real_rows += (ntuples - wntuples) / (nloops - wnloops);
        }
    } else {
        plan_rows = node.plan_rows;
        real_rows = totals.ntuples / nloops;
        if is_leaf {
            real_rows += (totals.nfiltered1 + totals.nfiltered2 + totals.ntuples2) / nloops;
        }
    }

    // Planner convention: estimates never go below one row.
    if plan_rows < 1.0 {
        plan_rows = 1.0;
    }
    // A parameterized subplan can filter away every tuple; keep ln() fed.
    if real_rows <= 0.0 {
        real_rows = 1.0 / nloops;
    }

    let node_error = (real_rows / plan_rows).ln().abs();
    let relative_time = totals.total / nloops / st.totaltime;

    st.avg_error += node_error;
    st.rms_error += node_error * node_error;
    st.twa_error += node_error * relative_time;
    if st.totalcost > 0.0 {
        st.wca_error += node_error * (node.total_cost / st.totalcost);
    }
    st.nnodes += 1;

    if node.kind.is_join() {
        let mut jf = (totals.nfiltered1 + totals.nfiltered2) / nloops;
        if jf > 0.0 {
            jf *= relative_time / real_rows;
            if jf > st.max_join_filter {
                st.max_join_filter = jf;
            }
        }
    }

    if is_leaf {
        let mut sf = totals.nfiltered1 / nloops;
        if sf > 0.0 {
            sf *= relative_time / real_rows;
            if sf > st.max_scan_filter {
                st.max_scan_filter = sf;
            }
        }
    }
}

fn visit_subplans(subplans: &[SubPlan], st: &mut WalkState) {
    for subplan in subplans {
        if let Some(instrument) = subplan.root.instrument.as_ref() {
            let totals = instrument.closed();
            if totals.nloops > 0.0 && st.totaltime > 0.0 {
                // Repeated execution hurts roughly linearly, damped for the
                // startup-amortization a long loop enjoys.
                let loop_factor = totals.nloops / (totals.nloops + 1.0).ln();
                let time_ratio = totals.total / st.totaltime;
                let factor = loop_factor * time_ratio;
                if factor > st.worst_subplan {
                    st.worst_subplan = factor;
                }
            }
        }
        // Each sub-plan tree is analyzed here and nowhere else.
        visit(&subplan.root, st);
    }
}

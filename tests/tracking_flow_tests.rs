//! End-to-end executor-hook flow: assess, gate, store, report.

use std::sync::{Arc, Mutex};

use plantrack::{
    BufferCounters, Execution, Fingerprint, Instrumentation, NodeKind, PlanNode, PlanReporter,
    TenantId, TrackMode, TrackerConfig, TrackerContext,
};

struct CapturingReporter {
    calls: Arc<Mutex<Vec<(String, f64)>>>,
}

impl PlanReporter for CapturingReporter {
    fn emit_plan_report(&self, execution: &Execution<'_>, avg_error: f64) {
        self.calls
            .lock()
            .unwrap()
            .push((execution.query.to_string(), avg_error));
    }
}

fn config(dir: &std::path::Path, region: &str) -> TrackerConfig {
    TrackerConfig {
        mode: TrackMode::Forced,
        stats_dir: dir.to_path_buf(),
        region: region.to_string(),
        auto_flush: false,
        ..TrackerConfig::default()
    }
}

fn scan_leaf(plan_rows: f64, ntuples: f64, total: f64) -> PlanNode {
    PlanNode::new(NodeKind::Scan, plan_rows, 100.0)
        .with_instrument(Instrumentation::completed(1.0, ntuples, total))
}

fn execution<'a>(root: &'a PlanNode, fingerprint: u64, query: &'a str) -> Execution<'a> {
    Execution {
        root,
        totaltime: 0.01,
        totalcost: 100.0,
        buffers: BufferCounters {
            shared_blks_hit: 6,
            shared_blks_read: 2,
            ..BufferCounters::default()
        },
        tenant: TenantId::new(1),
        fingerprint: Fingerprint::new(fingerprint),
        query,
    }
}

#[test]
fn underestimated_scan_flows_into_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TrackerContext::new(config(dir.path(), "flow-underestimate")).unwrap();

    // 10 real rows against 100 predicted: every error scalar is ln(10).
    let root = scan_leaf(100.0, 10.0, 0.01);
    let metrics = ctx
        .on_execution_end(&execution(&root, 0xA1, "SELECT * FROM t WHERE x = 1"))
        .unwrap()
        .unwrap();

    let ln10 = 10.0f64.ln();
    assert!((metrics.avg_error - ln10).abs() < 1e-9);
    assert!((metrics.rms_error - ln10).abs() < 1e-9);
    assert!((metrics.twa_error - ln10).abs() < 1e-9);
    assert!((metrics.wca_error - ln10).abs() < 1e-9);
    assert_eq!(metrics.blks_accessed, 8);

    let rows = ctx.scan().unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(&*row.query, "SELECT * FROM t WHERE x = 1");
    assert_eq!(row.nexecs, 1);
    assert_eq!(row.evaluated_nodes, 1);
    assert_eq!(row.plan_nodes, 1);
    assert!((row.stats.avg_error.mean() - ln10).abs() < 1e-9);
    assert_eq!(row.stats.blks_accessed.mean(), 8.0);
    // Wall time is folded in milliseconds.
    assert_eq!(row.stats.exec_time_ms.mean(), 10.0);
}

#[test]
fn filtered_leaf_records_the_scan_hotspot() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TrackerContext::new(config(dir.path(), "flow-filtered")).unwrap();

    let mut root = scan_leaf(100.0, 10.0, 0.01);
    root.instrument.as_mut().unwrap().nfiltered1 = 90.0;
    let metrics = ctx
        .on_execution_end(&execution(&root, 0xB2, "SELECT * FROM t WHERE y > 9"))
        .unwrap()
        .unwrap();

    // 10 produced + 90 filtered hits the prediction exactly.
    assert!(metrics.avg_error.abs() < 1e-9);
    assert!((metrics.max_scan_filter_factor - 0.9).abs() < 1e-9);

    let rows = ctx.scan().unwrap();
    assert!((rows[0].stats.scan_filter.mean() - 0.9).abs() < 1e-9);
}

#[test]
fn never_executed_plan_keeps_error_stats_empty() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TrackerContext::new(config(dir.path(), "flow-never-executed")).unwrap();

    let root = scan_leaf(100.0, 0.0, 0.0); // nloops stays 0
    let metrics = ctx
        .on_execution_end(&execution(&root, 0xC3, "SELECT 1 WHERE false"))
        .unwrap()
        .unwrap();
    assert_eq!(metrics.avg_error, -1.0);

    // Forced mode still records the execution; the gated error scalars
    // simply fold nothing.
    let rows = ctx.scan().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].nexecs, 1);
    assert!(rows[0].stats.avg_error.is_empty().unwrap());
    assert!(rows[0].stats.wca_error.is_empty().unwrap());
    assert_eq!(rows[0].stats.exec_time_ms.count(), 1);
}

#[test]
fn repeated_executions_accumulate() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TrackerContext::new(config(dir.path(), "flow-accumulate")).unwrap();

    for ntuples in [10.0, 20.0, 40.0] {
        let root = scan_leaf(100.0, ntuples, 0.01);
        ctx.on_execution_end(&execution(&root, 0xD4, "SELECT * FROM t"))
            .unwrap()
            .unwrap();
    }

    let rows = ctx.scan().unwrap();
    assert_eq!(rows.len(), 1);
    let avg = &rows[0].stats.avg_error;
    assert_eq!(rows[0].nexecs, 3);
    assert_eq!(avg.count(), 3);
    assert!((avg.max() - 10.0f64.ln()).abs() < 1e-9);
    assert!((avg.min() - 2.5f64.ln()).abs() < 1e-9);
}

#[test]
fn reporter_fires_at_the_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path(), "flow-reporter");
    cfg.mode = TrackMode::Normal;
    cfg.log_min_error = 1.0;

    let calls = Arc::new(Mutex::new(Vec::new()));
    let reporter = CapturingReporter {
        calls: Arc::clone(&calls),
    };
    let ctx = TrackerContext::new(cfg)
        .unwrap()
        .with_reporter(Box::new(reporter));

    let good = scan_leaf(10.0, 10.0, 0.01);
    ctx.on_execution_end(&execution(&good, 1, "good")).unwrap();
    let bad = scan_leaf(100.0, 10.0, 0.01);
    ctx.on_execution_end(&execution(&bad, 2, "bad")).unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "bad");
    assert!((calls[0].1 - 10.0f64.ln()).abs() < 1e-9);
}

#[test]
fn two_contexts_share_one_region() {
    let dir = tempfile::tempdir().unwrap();
    let a = TrackerContext::new(config(dir.path(), "flow-shared-region")).unwrap();
    let b = TrackerContext::new(config(dir.path(), "flow-shared-region")).unwrap();

    let root = scan_leaf(100.0, 10.0, 0.01);
    a.on_execution_end(&execution(&root, 0xE5, "SELECT shared"))
        .unwrap();
    b.on_execution_end(&execution(&root, 0xE5, "SELECT shared"))
        .unwrap();

    // Both processes folded into the same entry.
    let rows = a.scan().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].nexecs, 2);
    assert_eq!(b.scan().unwrap()[0].nexecs, 2);
}

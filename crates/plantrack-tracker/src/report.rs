//! Plan-report callback contract.
//!
//! When an execution's average estimation error reaches the configured
//! threshold, the tracker hands the execution to a reporter. What a report
//! looks like (a rendered plan dump, a ticket, a metric) is the embedder's
//! business; the tracker only promises to call.

use tracing::info;

use crate::tracker::Execution;

pub trait PlanReporter: Send + Sync {
    fn emit_plan_report(&self, execution: &Execution<'_>, avg_error: f64);
}

/// Default reporter: one structured log line per offending execution.
pub struct LogReporter;

impl PlanReporter for LogReporter {
    fn emit_plan_report(&self, execution: &Execution<'_>, avg_error: f64) {
        info!(
            duration_ms = execution.totaltime * 1000.0,
            relative_error = avg_error,
            query = execution.query,
            "plan exceeded the estimation-error threshold"
        );
    }
}

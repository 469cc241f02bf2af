//! The per-process tracking context.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{debug, error};

use plantrack_core::config::{TrackMode, TrackerConfig};
use plantrack_core::error::Result;
use plantrack_core::id::{Fingerprint, QueryKey, TenantId};
use plantrack_core::plan::{BufferCounters, PlanNode};
use plantrack_estimator::{assess_plan, PlanMetrics};
use plantrack_store::{capacity_entries, FingerprintStore, StoreRow, UpsertOutcome};

use crate::report::PlanReporter;

/// Instrumentation the host should enable for an execution about to start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstrumentOptions {
    pub rows: bool,
    pub timer: bool,
    pub buffers: bool,
}

/// Everything the host hands over when an execution finishes.
#[derive(Debug, Clone, Copy)]
pub struct Execution<'a> {
    pub root: &'a PlanNode,
    /// Executor wall time, seconds.
    pub totaltime: f64,
    /// Planner total cost for the plan.
    pub totalcost: f64,
    pub buffers: BufferCounters,
    pub tenant: TenantId,
    pub fingerprint: Fingerprint,
    pub query: &'a str,
}

/// Operator-facing store health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatus {
    pub mode: TrackMode,
    pub free_slots: u32,
    pub is_synced: bool,
}

/// Process-wide tracker state: the runtime-settable configuration, the
/// lazily attached store handle, and the optional report callback.
///
/// Not a global; tests and embedders may run any number of independent
/// contexts, including several attached to the same region.
pub struct TrackerContext {
    config: RwLock<TrackerConfig>,
    store: OnceCell<Arc<FingerprintStore>>,
    reporter: Option<Box<dyn PlanReporter>>,
}

impl TrackerContext {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
            store: OnceCell::new(),
            reporter: None,
        })
    }

    pub fn with_reporter(mut self, reporter: Box<dyn PlanReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn config(&self) -> TrackerConfig {
        self.config.read().clone()
    }

    /// Apply a runtime settings change. The region and stats directory of an
    /// already-attached context are sticky; everything else takes effect on
    /// the next operation.
    pub fn reconfigure(&self, apply: impl FnOnce(&mut TrackerConfig)) -> Result<()> {
        let mut config = self.config.write();
        let mut updated = config.clone();
        apply(&mut updated);
        updated.validate()?;
        *config = updated;
        Ok(())
    }

    /// Idempotent attach, run before any operation that touches the store.
    fn attach(&self) -> Result<&Arc<FingerprintStore>> {
        self.store.get_or_try_init(|| {
            let config = self.config.read();
            FingerprintStore::attach(&config.region, &config.stats_dir)
        })
    }

    /// Execution-start hook: request row, timer, and buffer instrumentation
    /// when this execution may end up being tracked.
    pub fn on_execution_begin(&self, options: &mut InstrumentOptions) -> Result<()> {
        if !self.config.read().tracking_enabled() {
            return Ok(());
        }
        self.attach()?;
        options.rows = true;
        options.timer = true;
        options.buffers = true;
        Ok(())
    }

    /// Execution-end hook: assess the plan, fold the result into the shared
    /// store when the mode says so, and report threshold breaches.
    ///
    /// Returns the metrics when the execution was assessed, `None` when it
    /// was skipped (tracking off, zero fingerprint, or no instrumentation).
    pub fn on_execution_end(&self, execution: &Execution<'_>) -> Result<Option<PlanMetrics>> {
        let config = self.config.read().clone();
        if !config.tracking_enabled() {
            return Ok(None);
        }
        if execution.fingerprint.get() == 0 {
            // The host did not compute a fingerprint; nothing to key on.
            // Another extension may have reset it mid-flight, so this is a
            // skip, not an error.
            return Ok(None);
        }
        if execution.root.instrument.is_none() {
            debug!("execution finished without instrumentation; skipping");
            return Ok(None);
        }

        let store = self.attach()?;
        let metrics = assess_plan(execution.root, execution.totaltime, execution.totalcost)?
            .with_buffers(&execution.buffers);

        let should_store = config.mode == TrackMode::Forced
            || (config.log_min_error >= 0.0 && metrics.avg_error >= config.log_min_error);
        if should_store {
            let key = QueryKey::new(execution.tenant, execution.fingerprint);
            let capacity = capacity_entries(config.hash_mem_kb);
            if store.upsert(key, execution.query, &metrics, capacity)? == UpsertOutcome::Full {
                debug!(%key, "fingerprint store is full; execution not recorded");
            }
        }

        if config.log_min_error >= 0.0 && metrics.avg_error >= config.log_min_error {
            if let Some(reporter) = self.reporter.as_deref() {
                reporter.emit_plan_report(execution, metrics.avg_error);
            }
        }

        Ok(Some(metrics))
    }

    pub fn scan(&self) -> Result<Vec<StoreRow>> {
        Ok(self.attach()?.scan())
    }

    /// Remove every entry and clear the on-disk state. Returns the number
    /// of entries removed.
    pub fn reset(&self) -> Result<u32> {
        self.attach()?.reset()
    }

    /// Checkpoint now. Returns the number of records written.
    pub fn flush(&self) -> Result<u32> {
        self.attach()?.flush()
    }

    pub fn status(&self) -> Result<StoreStatus> {
        let config = self.config.read().clone();
        let store = self.attach()?;
        let capacity = capacity_entries(config.hash_mem_kb);
        Ok(StoreStatus {
            mode: config.mode,
            free_slots: capacity.saturating_sub(store.live_entries()),
            is_synced: store.is_synced(),
        })
    }
}

impl Drop for TrackerContext {
    /// Before-exit protocol: flush unsynced statistics when auto-flush is
    /// on. The dirty flag is cleared up front so an I/O failure is not
    /// retried; shutdown errors are logged and swallowed.
    fn drop(&mut self) {
        if !self.config.read().auto_flush {
            return;
        }
        let Some(store) = self.store.get() else {
            return;
        };
        if store.is_synced() {
            return;
        }
        if let Err(err) = store.shutdown_flush() {
            error!(error = %err, "shutdown flush of optimizer statistics failed");
        }
    }
}

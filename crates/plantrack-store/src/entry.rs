//! Store entry layout and its fixed-width raw codec.
//!
//! The raw form is the checkpoint record body: native-endian by deliberate
//! design (the file never travels between hosts), fields in declared order,
//! with the query-text handle written as zero because the text is carried
//! explicitly next to the record.

use plantrack_core::error::{Error, Result};
use plantrack_core::id::{Fingerprint, QueryKey, TenantId};
use plantrack_core::rstats::{RStats, RSTATS_WIRE_LEN};
use plantrack_estimator::PlanMetrics;
use plantrack_region::TextHandle;

/// Cumulative metrics tracked per fingerprint.
pub const ENTRY_STATS: usize = 11;

/// Raw record width: key (4 + 8), two snapshot i32s, the eleven `RStats`,
/// the execution counter, and the zeroed text-handle slot.
pub const ENTRY_DISK_LEN: usize = 4 + 8 + 4 + 4 + ENTRY_STATS * RSTATS_WIRE_LEN + 8 + 8;

/// Entries the configured memory bound admits.
pub fn capacity_entries(hash_mem_kb: usize) -> u32 {
    let per_entry = std::mem::size_of::<StoreEntry>();
    ((hash_mem_kb * 1024) / per_entry).min(u32::MAX as usize) as u32
}

/// One `RStats` per cumulative metric, in checkpoint order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntryStats {
    pub avg_error: RStats,
    pub rms_error: RStats,
    pub twa_error: RStats,
    pub wca_error: RStats,
    pub blks_accessed: RStats,
    pub local_blks: RStats,
    pub exec_time_ms: RStats,
    pub join_filter: RStats,
    pub scan_filter: RStats,
    pub worst_subplan: RStats,
    pub njoins: RStats,
}

impl EntryStats {
    fn fields(&self) -> [&RStats; ENTRY_STATS] {
        [
            &self.avg_error,
            &self.rms_error,
            &self.twa_error,
            &self.wca_error,
            &self.blks_accessed,
            &self.local_blks,
            &self.exec_time_ms,
            &self.join_filter,
            &self.scan_filter,
            &self.worst_subplan,
            &self.njoins,
        ]
    }

    /// Every field is either canonically empty or internally consistent.
    pub fn validate(&self) -> Result<()> {
        for stats in self.fields() {
            stats.is_empty()?;
        }
        Ok(())
    }

    fn write_ne(&self, out: &mut Vec<u8>) {
        for stats in self.fields() {
            stats.write_ne(out);
        }
    }

    fn from_ne_bytes(bytes: &[u8]) -> Result<Self> {
        let at = |i: usize| RStats::from_ne_bytes(&bytes[i * RSTATS_WIRE_LEN..]);
        Ok(Self {
            avg_error: at(0)?,
            rms_error: at(1)?,
            twa_error: at(2)?,
            wca_error: at(3)?,
            blks_accessed: at(4)?,
            local_blks: at(5)?,
            exec_time_ms: at(6)?,
            join_filter: at(7)?,
            scan_filter: at(8)?,
            worst_subplan: at(9)?,
            njoins: at(10)?,
        })
    }
}

/// A live record of the fingerprint table.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    pub key: QueryKey,

    /// Per-execution snapshots, overwritten each time.
    pub evaluated_nodes: i32,
    pub plan_nodes: i32,

    pub stats: EntryStats,

    /// Executions folded into `stats`.
    pub nexecs: i64,

    /// Arena handle for the query text. Owned by the region, freed on reset.
    pub text: TextHandle,
}

impl StoreEntry {
    pub fn new(key: QueryKey, text: TextHandle) -> Self {
        Self {
            key,
            evaluated_nodes: 0,
            plan_nodes: 0,
            stats: EntryStats::default(),
            nexecs: 0,
            text,
        }
    }

    /// End-of-records marker: all-zero key, everything else zeroed too.
    pub fn sentinel() -> Self {
        Self::new(QueryKey::sentinel(), TextHandle::INVALID)
    }

    pub fn is_sentinel(&self) -> bool {
        self.key.is_sentinel()
    }

    /// Fold one execution's metrics in. Error scalars only contribute when
    /// non-negative (negative means "no measurable contribution"); the rest
    /// are valid measurements on every execution.
    pub fn fold_execution(&mut self, metrics: &PlanMetrics) {
        self.evaluated_nodes = metrics.evaluated_nodes;
        self.plan_nodes = metrics.plan_nodes;

        if metrics.avg_error >= 0.0 {
            self.stats.avg_error.add(metrics.avg_error);
        }
        if metrics.rms_error >= 0.0 {
            self.stats.rms_error.add(metrics.rms_error);
        }
        if metrics.twa_error >= 0.0 {
            self.stats.twa_error.add(metrics.twa_error);
        }
        if metrics.wca_error >= 0.0 {
            self.stats.wca_error.add(metrics.wca_error);
        }

        self.stats.blks_accessed.add(metrics.blks_accessed as f64);
        self.stats.local_blks.add(metrics.local_blks as f64);
        self.stats.exec_time_ms.add(metrics.exec_time_ms());
        self.stats.join_filter.add(metrics.max_join_filter_factor);
        self.stats.scan_filter.add(metrics.max_scan_filter_factor);
        self.stats
            .worst_subplan
            .add(metrics.worst_subplan_factor);
        self.stats.njoins.add(metrics.njoins as f64);

        self.nexecs += 1;
    }

    /// Raw record body. The text-handle slot is always written as zero.
    pub fn write_ne(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.key.tenant.get().to_ne_bytes());
        out.extend_from_slice(&self.key.fingerprint.get().to_ne_bytes());
        out.extend_from_slice(&self.evaluated_nodes.to_ne_bytes());
        out.extend_from_slice(&self.plan_nodes.to_ne_bytes());
        self.stats.write_ne(out);
        out.extend_from_slice(&self.nexecs.to_ne_bytes());
        out.extend_from_slice(&0u64.to_ne_bytes());
    }

    pub fn from_ne_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ENTRY_DISK_LEN {
            return Err(Error::Corruption(format!(
                "short store entry: {} bytes, expected {ENTRY_DISK_LEN}",
                bytes.len()
            )));
        }
        let tenant = u32::from_ne_bytes(bytes[0..4].try_into().unwrap());
        let fingerprint = u64::from_ne_bytes(bytes[4..12].try_into().unwrap());
        let evaluated_nodes = i32::from_ne_bytes(bytes[12..16].try_into().unwrap());
        let plan_nodes = i32::from_ne_bytes(bytes[16..20].try_into().unwrap());
        let stats = EntryStats::from_ne_bytes(&bytes[20..20 + ENTRY_STATS * RSTATS_WIRE_LEN])?;
        let tail = 20 + ENTRY_STATS * RSTATS_WIRE_LEN;
        let nexecs = i64::from_ne_bytes(bytes[tail..tail + 8].try_into().unwrap());
        let text = u64::from_ne_bytes(bytes[tail + 8..tail + 16].try_into().unwrap());

        Ok(Self {
            key: QueryKey::new(TenantId::new(tenant), Fingerprint::new(fingerprint)),
            evaluated_nodes,
            plan_nodes,
            stats,
            nexecs,
            text: TextHandle::from_raw(text),
        })
    }
}

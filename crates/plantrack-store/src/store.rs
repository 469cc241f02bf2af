//! The shared fingerprint store.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use plantrack_core::error::{Error, Result};
use plantrack_core::id::QueryKey;
use plantrack_estimator::PlanMetrics;
use plantrack_region::{attach_named, TextArena};

use crate::checkpoint::{self, RestoreFile};
use crate::entry::{EntryStats, StoreEntry};
use crate::table::PartitionedTable;

pub const STATS_FILE_NAME: &str = "plantrack.stat";

/// Result of an upsert. `Full` is the silent capacity rejection: nothing was
/// touched and no error propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Stored,
    Full,
}

/// A materialized scan row.
#[derive(Debug, Clone)]
pub struct StoreRow {
    pub key: QueryKey,
    pub query: Arc<str>,
    pub stats: EntryStats,
    pub evaluated_nodes: i32,
    pub plan_nodes: i32,
    pub nexecs: i64,
}

/// Shared state every tracking context attaches to.
///
/// Upserts synchronize through the table's partition locks only. The coarse
/// lock exists for whole-table passes: scan takes it shared, reset and flush
/// exclusive. The two atomics are read without any lock for capacity checks
/// and the status surface.
pub struct FingerprintStore {
    coarse: RwLock<()>,
    table: PartitionedTable,
    arena: TextArena,
    htab_counter: AtomicU32,
    need_syncing: AtomicU32,
    file_path: PathBuf,
}

impl FingerprintStore {
    /// Idempotent attach: the first caller for `region` creates the store
    /// and runs restore; everyone else gets the existing instance.
    pub fn attach(region: &str, stats_dir: &Path) -> Result<Arc<FingerprintStore>> {
        let (store, created) = attach_named(region, || Ok(Self::init(stats_dir)))?;
        if !created {
            debug!(region, "attached to existing fingerprint store");
        }
        Ok(store)
    }

    /// First-writer initialization. A restore failure must never leave a
    /// half-populated region behind, so the partially filled store is
    /// dropped wholesale and a fresh empty one takes its place.
    fn init(stats_dir: &Path) -> FingerprintStore {
        let store = Self::empty(stats_dir);
        match store.restore() {
            Ok(Some(count)) => {
                info!(
                    records = count,
                    file = %store.file_path.display(),
                    "optimizer statistics restored"
                );
                store
            }
            Ok(None) => store,
            Err(err) => {
                warn!(
                    error = %err,
                    file = %store.file_path.display(),
                    "saved optimizer statistics are unusable and were discarded; \
                     remove the file to silence this warning"
                );
                Self::empty(stats_dir)
            }
        }
    }

    fn empty(stats_dir: &Path) -> FingerprintStore {
        FingerprintStore {
            coarse: RwLock::new(()),
            table: PartitionedTable::new(),
            arena: TextArena::new(),
            htab_counter: AtomicU32::new(0),
            need_syncing: AtomicU32::new(0),
            file_path: stats_dir.join(STATS_FILE_NAME),
        }
    }

    /// Fold one execution into the entry for `key`, creating it on first
    /// sight. `capacity` is the entry bound derived from the live memory
    /// setting; at or above it the upsert is rejected without touching
    /// anything.
    pub fn upsert(
        &self,
        key: QueryKey,
        query: &str,
        metrics: &PlanMetrics,
        capacity: u32,
    ) -> Result<UpsertOutcome> {
        if !key.is_valid() {
            return Err(Error::Precondition(format!(
                "upsert requires a live key, got {key}"
            )));
        }

        let counter = self.htab_counter.load(Ordering::Acquire);
        if counter == u32::MAX || counter >= capacity {
            return Ok(UpsertOutcome::Full);
        }

        self.table.with_partition(&key, |map| {
            use std::collections::hash_map::Entry as MapEntry;
            let entry = match map.entry(key) {
                MapEntry::Occupied(slot) => slot.into_mut(),
                MapEntry::Vacant(slot) => {
                    let text = self.arena.alloc(query);
                    self.htab_counter.fetch_add(1, Ordering::AcqRel);
                    slot.insert(StoreEntry::new(key, text))
                }
            };
            entry.fold_execution(metrics);
        });

        self.need_syncing.store(1, Ordering::Release);
        Ok(UpsertOutcome::Stored)
    }

    /// Materialize every live entry. Corrupt entries are skipped with a
    /// warning; a reset clears them.
    pub fn scan(&self) -> Vec<StoreRow> {
        let _shared = self.coarse.read();
        let mut rows = Vec::new();
        self.table.for_each_entry(|entry| match self.materialize(entry) {
            Ok(row) => rows.push(row),
            Err(err) => warn!(
                key = %entry.key,
                error = %err,
                "skipping corrupt statistics entry; resetting the store will clear it"
            ),
        });
        rows
    }

    fn materialize(&self, entry: &StoreEntry) -> Result<StoreRow> {
        if !entry.key.is_valid() {
            return Err(Error::Corruption(format!(
                "entry carries the reserved key {}",
                entry.key
            )));
        }
        if entry.nexecs < 1 {
            return Err(Error::Corruption(format!(
                "entry {} has execution count {}",
                entry.key, entry.nexecs
            )));
        }
        entry.stats.validate()?;
        let query = self.arena.resolve(entry.text)?;
        Ok(StoreRow {
            key: entry.key,
            query,
            stats: entry.stats,
            evaluated_nodes: entry.evaluated_nodes,
            plan_nodes: entry.plan_nodes,
            nexecs: entry.nexecs,
        })
    }

    /// Drop every entry and its text, write an empty checkpoint, and return
    /// how many entries were actually removed (concurrent inserts racing
    /// the lock acquisition are counted if they won, not if they lost).
    pub fn reset(&self) -> Result<u32> {
        let _exclusive = self.coarse.write();

        let mut removed: u32 = 0;
        self.table.drain_entries(|entry| {
            if let Err(err) = self.arena.free(entry.text) {
                warn!(key = %entry.key, error = %err, "query text was already released");
            }
            let pre = self.htab_counter.fetch_sub(1, Ordering::AcqRel);
            if pre == 0 {
                // The counter disagreed with the table contents. Repair
                // rather than wrap; the entries themselves are gone either way.
                self.htab_counter.store(0, Ordering::Release);
                warn!("fingerprint store counter inconsistency repaired during reset");
            }
            removed += 1;
        });

        self.flush_locked()?;
        Ok(removed)
    }

    /// Checkpoint the table to disk and return the number of records
    /// written.
    pub fn flush(&self) -> Result<u32> {
        let _exclusive = self.coarse.write();
        self.flush_locked()
    }

    /// Flush body for callers already holding the coarse lock exclusively.
    fn flush_locked(&self) -> Result<u32> {
        let mut records = Vec::new();
        self.table.for_each_entry(|entry| {
            match self.arena.resolve(entry.text) {
                Ok(text) => records.push((entry.clone(), text)),
                Err(err) => warn!(
                    key = %entry.key,
                    error = %err,
                    "not checkpointing entry with unresolvable query text"
                ),
            }
        });

        let tmp = self.file_path.with_extension("stat.tmp");
        let count = match checkpoint::write_records(&tmp, &records) {
            Ok(count) => count,
            Err(err) => {
                let _ = std::fs::remove_file(&tmp);
                return Err(err);
            }
        };
        if let Err(err) = std::fs::rename(&tmp, &self.file_path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err.into());
        }

        self.need_syncing.store(0, Ordering::Release);
        info!(
            records = count,
            file = %self.file_path.display(),
            "optimizer statistics stored"
        );
        Ok(count)
    }

    /// Init-time restore into a known-empty table. `Ok(None)` means there
    /// was nothing (or nothing usable without error) to load.
    fn restore(&self) -> Result<Option<u32>> {
        debug_assert!(self.table.is_empty());
        let records = match checkpoint::read_records(&self.file_path)? {
            RestoreFile::Missing | RestoreFile::ForeignHost => return Ok(None),
            RestoreFile::Loaded(records) => records,
        };

        let mut count: u32 = 0;
        for (mut entry, text) in records {
            if !entry.key.is_valid() {
                return Err(Error::Corruption(format!(
                    "checkpoint record carries the reserved key {}",
                    entry.key
                )));
            }
            entry.text = self.arena.alloc(&text);
            self.table.insert_unique(entry)?;
            count += 1;
        }

        self.htab_counter.store(count, Ordering::Release);
        Ok(Some(count))
    }

    /// Shutdown-hook flush: clear the dirty flag up front so a failure is
    /// not retried, then write. Callers log and swallow the error.
    pub fn shutdown_flush(&self) -> Result<u32> {
        self.need_syncing.store(0, Ordering::Release);
        self.flush()
    }

    pub fn live_entries(&self) -> u32 {
        self.htab_counter.load(Ordering::Acquire)
    }

    pub fn is_synced(&self) -> bool {
        self.need_syncing.load(Ordering::Acquire) == 0
    }

    /// Live arena allocations; every live entry owns exactly one.
    pub fn live_texts(&self) -> usize {
        self.arena.live_allocations()
    }

    pub fn stats_file(&self) -> &Path {
        &self.file_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plantrack_core::id::{Fingerprint, TenantId};

    fn metrics(avg: f64) -> PlanMetrics {
        PlanMetrics {
            avg_error: avg,
            rms_error: avg,
            twa_error: avg,
            wca_error: avg,
            max_join_filter_factor: 0.0,
            max_scan_filter_factor: 0.0,
            worst_subplan_factor: 0.0,
            blks_accessed: 8,
            local_blks: 0,
            evaluated_nodes: 1,
            plan_nodes: 1,
            njoins: 0,
            totaltime: 0.01,
        }
    }

    fn key(fp: u64) -> QueryKey {
        QueryKey::new(TenantId::new(1), Fingerprint::new(fp))
    }

    fn store(dir: &Path) -> FingerprintStore {
        FingerprintStore::init(dir)
    }

    #[test]
    fn upsert_then_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        store.upsert(key(1), "SELECT 1", &metrics(0.5), 16).unwrap();
        store.upsert(key(1), "SELECT 1", &metrics(1.5), 16).unwrap();
        store.upsert(key(2), "SELECT 2", &metrics(0.25), 16).unwrap();

        assert_eq!(store.live_entries(), 2);
        assert_eq!(store.live_texts(), 2);
        assert!(!store.is_synced());

        let mut rows = store.scan();
        rows.sort_by_key(|row| row.key.fingerprint.get());
        assert_eq!(rows.len(), 2);
        assert_eq!(&*rows[0].query, "SELECT 1");
        assert_eq!(rows[0].nexecs, 2);
        assert_eq!(rows[0].stats.avg_error.count(), 2);
        assert_eq!(rows[0].stats.avg_error.mean(), 1.0);
        assert_eq!(rows[1].nexecs, 1);
    }

    #[test]
    fn zero_fingerprint_is_a_precondition() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let bad = QueryKey::new(TenantId::new(1), Fingerprint::new(0));
        assert!(matches!(
            store.upsert(bad, "q", &metrics(0.1), 16),
            Err(Error::Precondition(_))
        ));
    }

    #[test]
    fn capacity_rejection_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        assert_eq!(
            store.upsert(key(10), "A", &metrics(0.1), 2).unwrap(),
            UpsertOutcome::Stored
        );
        assert_eq!(
            store.upsert(key(11), "B", &metrics(0.1), 2).unwrap(),
            UpsertOutcome::Stored
        );
        assert_eq!(
            store.upsert(key(12), "C", &metrics(0.1), 2).unwrap(),
            UpsertOutcome::Full
        );

        assert_eq!(store.live_entries(), 2);
        let rows = store.scan();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.key.fingerprint.get() != 12));
    }

    #[test]
    fn reset_frees_texts_and_reports_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        for fp in 1..=5 {
            store.upsert(key(fp), "q", &metrics(0.1), 64).unwrap();
        }

        let removed = store.reset().unwrap();
        assert_eq!(removed, 5);
        assert_eq!(store.live_entries(), 0);
        assert_eq!(store.live_texts(), 0);
        assert!(store.scan().is_empty());
        // Reset flushes an empty checkpoint.
        assert!(store.is_synced());
        assert!(store.stats_file().exists());
    }

    #[test]
    fn flush_and_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let first = store(dir.path());
        first.upsert(key(1), "SELECT a FROM t", &metrics(0.75), 64).unwrap();
        first.upsert(key(2), "SELECT b FROM t", &metrics(0.5), 64).unwrap();
        assert_eq!(first.flush().unwrap(), 2);
        assert!(first.is_synced());

        let second = store(dir.path());
        assert_eq!(second.live_entries(), 2);
        let mut rows = second.scan();
        rows.sort_by_key(|row| row.key.fingerprint.get());
        assert_eq!(&*rows[0].query, "SELECT a FROM t");
        let originals = first.scan();
        let matching = originals
            .iter()
            .find(|row| row.key == rows[0].key)
            .unwrap();
        assert_eq!(rows[0].stats, matching.stats);
    }

    #[test]
    fn corrupt_checkpoint_rebuilds_empty() {
        let dir = tempfile::tempdir().unwrap();
        let first = store(dir.path());
        first.upsert(key(1), "SELECT 1", &metrics(0.1), 64).unwrap();
        first.flush().unwrap();

        let path = dir.path().join(STATS_FILE_NAME);
        let mut bytes = std::fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x10;
        std::fs::write(&path, &bytes).unwrap();

        let second = store(dir.path());
        assert_eq!(second.live_entries(), 0);
        assert!(second.scan().is_empty());
    }
}

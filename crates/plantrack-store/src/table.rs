//! Partitioned hash table.
//!
//! Partitions lock independently so concurrent upserts on different keys
//! never serialize; a whole-table read/write lock here would defeat the
//! store's concurrency model. Whole-table passes (scan, reset, flush) walk
//! partition by partition, which yields a per-partition-consistent snapshot
//! while other partitions keep taking writes.

use std::collections::HashMap;

use parking_lot::Mutex;
use xxhash_rust::xxh3::xxh3_64;

use plantrack_core::error::{Error, Result};
use plantrack_core::id::QueryKey;

use crate::entry::StoreEntry;

pub const NUM_PARTITIONS: usize = 16;

pub struct PartitionedTable {
    partitions: Vec<Mutex<HashMap<QueryKey, StoreEntry>>>,
}

impl Default for PartitionedTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionedTable {
    pub fn new() -> Self {
        Self {
            partitions: (0..NUM_PARTITIONS)
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
        }
    }

    fn partition_index(key: &QueryKey) -> usize {
        let mut buf = [0u8; 12];
        buf[..4].copy_from_slice(&key.tenant.get().to_le_bytes());
        buf[4..].copy_from_slice(&key.fingerprint.get().to_le_bytes());
        (xxh3_64(&buf) as usize) % NUM_PARTITIONS
    }

    /// Run `f` on the key's partition while holding its lock. This is the
    /// find-or-insert primitive every per-entry update goes through.
    pub fn with_partition<T>(
        &self,
        key: &QueryKey,
        f: impl FnOnce(&mut HashMap<QueryKey, StoreEntry>) -> T,
    ) -> T {
        let mut map = self.partitions[Self::partition_index(key)].lock();
        f(&mut map)
    }

    /// Visit every live entry, partition by partition.
    pub fn for_each_entry(&self, mut f: impl FnMut(&StoreEntry)) {
        for partition in &self.partitions {
            let map = partition.lock();
            for entry in map.values() {
                f(entry);
            }
        }
    }

    /// Remove every entry, handing each to `f`.
    pub fn drain_entries(&self, mut f: impl FnMut(StoreEntry)) {
        for partition in &self.partitions {
            let mut map = partition.lock();
            for (_, entry) in map.drain() {
                f(entry);
            }
        }
    }

    /// Restore-path insert: a key seen twice means the checkpoint is bad.
    pub fn insert_unique(&self, entry: StoreEntry) -> Result<()> {
        let key = entry.key;
        self.with_partition(&key, |map| {
            use std::collections::hash_map::Entry as MapEntry;
            match map.entry(key) {
                MapEntry::Occupied(_) => Err(Error::Corruption(format!(
                    "duplicate record for key {key} in checkpoint file"
                ))),
                MapEntry::Vacant(slot) => {
                    slot.insert(entry);
                    Ok(())
                }
            }
        })
    }

    /// Live entry count, summed across partitions. Advisory; the store's
    /// atomic counter is the authoritative value for capacity checks.
    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plantrack_core::id::{Fingerprint, TenantId};
    use plantrack_region::TextHandle;

    fn key(fp: u64) -> QueryKey {
        QueryKey::new(TenantId::new(1), Fingerprint::new(fp))
    }

    #[test]
    fn insert_and_visit() {
        let table = PartitionedTable::new();
        for fp in 1..=100u64 {
            table
                .insert_unique(StoreEntry::new(key(fp), TextHandle::from_raw(fp)))
                .unwrap();
        }
        assert_eq!(table.len(), 100);

        let mut seen = 0;
        table.for_each_entry(|_| seen += 1);
        assert_eq!(seen, 100);
    }

    #[test]
    fn duplicate_insert_is_corruption() {
        let table = PartitionedTable::new();
        table
            .insert_unique(StoreEntry::new(key(9), TextHandle::from_raw(1)))
            .unwrap();
        assert!(matches!(
            table.insert_unique(StoreEntry::new(key(9), TextHandle::from_raw(2))),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn drain_empties_every_partition() {
        let table = PartitionedTable::new();
        for fp in 1..=40u64 {
            table
                .insert_unique(StoreEntry::new(key(fp), TextHandle::from_raw(fp)))
                .unwrap();
        }
        let mut drained = 0;
        table.drain_entries(|_| drained += 1);
        assert_eq!(drained, 40);
        assert!(table.is_empty());
    }
}

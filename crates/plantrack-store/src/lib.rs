#![forbid(unsafe_code)]
//! plantrack-store: the shared fingerprint store.
//!
//! A partitioned hash table keyed by `(tenant, fingerprint)`, living in a
//! named shared region so every tracking context in the system folds into
//! the same statistics. Entries embed one `RStats` per tracked metric plus
//! per-execution snapshots and a handle to arena-owned query text.
//!
//! Per-entry updates take only the entry's partition lock; a single coarse
//! reader/writer lock coordinates whole-table passes (scan shared, reset and
//! flush exclusive). The table checkpoints to a versioned, CRC32C-protected
//! file via write-temp/fsync/rename, and the first attacher of a region
//! restores from that file on init.

pub mod checkpoint;
pub mod entry;
pub mod store;
pub mod table;

pub use entry::{capacity_entries, EntryStats, StoreEntry, ENTRY_DISK_LEN};
pub use store::{FingerprintStore, StoreRow, UpsertOutcome, STATS_FILE_NAME};

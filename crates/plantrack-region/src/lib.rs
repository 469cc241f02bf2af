#![forbid(unsafe_code)]
//! plantrack-region: named shared regions and region-owned text storage.
//!
//! A region is a named segment every tracking context rendezvouses on: the
//! first attacher creates and initializes it under the registry lock, later
//! attachers get the existing value. Regions outlive every attached context
//! and are torn down only with the process.
//!
//! The [`arena::TextArena`] is the region-owned allocator for query texts.
//! Entries in the fingerprint table hold stable, non-zero handles into it;
//! the arena is the sole owner of the bytes.

pub mod arena;
pub mod registry;

pub use arena::{TextArena, TextHandle};
pub use registry::attach_named;

#![forbid(unsafe_code)]
//! plantrack-core: shared vocabulary of the optimizer tracker.
//!
//! This crate holds the types every other layer speaks: the error taxonomy,
//! the tracker configuration, the `RStats` running-statistics value, the
//! borrowed plan-tree model the estimator walks, and the key newtypes used
//! by the fingerprint store. No I/O and no locking live here.

pub mod config;
pub mod error;
pub mod id;
pub mod plan;
pub mod prelude;
pub mod rstats;

pub use config::{TrackMode, TrackerConfig};
pub use error::{Error, Result};
pub use id::{Fingerprint, QueryKey, TenantId};
pub use rstats::RStats;

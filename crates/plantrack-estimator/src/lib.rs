#![forbid(unsafe_code)]
//! plantrack-estimator: scoring the optimizer against reality.
//!
//! A pure, post-order walk over one executed plan tree. For every node that
//! actually ran with timing enabled, the walker reconstructs the real rows
//! per loop (untangling parallel workers and leaf-filtered tuples), compares
//! them to the planner's prediction on a log scale, and folds the result
//! into four whole-plan error scalars plus three structural hotspot factors.
//!
//! The walker borrows the tree immutably and touches nothing outside it.

pub mod metrics;
pub mod walker;

pub use metrics::PlanMetrics;
pub use walker::assess_plan;

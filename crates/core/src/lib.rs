#![forbid(unsafe_code)]
//! Domain types for per-video watch progress.
//!
//! This crate owns the progress record shape and its invariants (monotonic
//! offsets, the 95% completion threshold) plus the completion report types
//! consumed by dashboards. It does no I/O.

pub mod model;
pub mod time;

pub use time::Clock;

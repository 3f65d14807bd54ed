//! Tube-cycling spaced repetition ("Triple Helix")
//!
//! This module provides:
//! - Tube, stitch position and aggregate state models
//! - The skip-number / distractor-level algorithm
//! - The `Scheduler` trait and its `TubeScheduler` implementation

pub mod algorithm;
pub mod models;
pub mod tubes;

pub use models::*;
pub use tubes::{Scheduler, SchedulerError, TubeScheduler};

//! Drill sessions
//!
//! This module provides:
//! - `SessionCoordinator`, which drives the scheduler, resolver and state
//!   store for one learner
//! - Session status, summary and presentation models
//! - Building multiple-choice drill items from a stitch

pub mod coordinator;
pub mod drill;
pub mod models;

pub use coordinator::{SessionCoordinator, SessionError};
pub use drill::{build_drill, DrillItem};
pub use models::*;

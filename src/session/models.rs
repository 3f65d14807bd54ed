//! Data models for drill sessions

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::content::{SourceTier, Stitch};
use crate::scheduler::TubeIndex;

/// Whether a completion is being applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Transitioning,
}

/// The stitch the learner should play now
#[derive(Debug, Clone)]
pub struct PresentedStitch {
    pub tube: TubeIndex,
    pub stitch: Arc<Stitch>,
    /// Difficulty of the wrong answers to offer
    pub distractor_level: u8,
    pub skip_number: u32,
    /// Tier that supplied the content
    pub source: SourceTier,
}

/// Running totals for one session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub stitches_completed: u32,
    pub perfect_stitches: u32,
    pub questions_answered: u32,
    pub questions_correct: u32,
    /// Full tube revolutions, all time
    pub cycle_count: u64,
    /// Completions reported for stitches the scheduler does not know
    pub ignored_completions: u32,
}

impl SessionSummary {
    pub fn accuracy(&self) -> Option<f64> {
        if self.questions_answered == 0 {
            None
        } else {
            Some(self.questions_correct as f64 / self.questions_answered as f64)
        }
    }
}

/// Session tuning taken from the app config
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Stitches to prefetch ahead of the learner; 0 disables prefetch
    pub prefetch_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { prefetch_window: 5 }
    }
}

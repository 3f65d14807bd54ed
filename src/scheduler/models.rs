//! Data models for the tube scheduler

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Spaced-repetition intervals, in stitches seen, a stitch climbs through
pub const SKIP_SEQUENCE: [u32; 5] = [3, 5, 10, 25, 100];

/// Distractor levels run from easiest (1) to hardest (5)
pub const MIN_DISTRACTOR_LEVEL: u8 = 1;
pub const MAX_DISTRACTOR_LEVEL: u8 = 5;

/// One of the three tubes, cycled 1 → 2 → 3 → 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TubeIndex {
    One,
    Two,
    Three,
}

impl TubeIndex {
    pub const ALL: [TubeIndex; 3] = [TubeIndex::One, TubeIndex::Two, TubeIndex::Three];

    pub fn as_u8(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    /// Zero-based slot in `TubeState::tubes`
    pub fn slot(self) -> usize {
        self.as_u8() as usize - 1
    }

    /// The tube after this one; `(index % 3) + 1`
    pub fn next(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::Three,
            Self::Three => Self::One,
        }
    }
}

impl TryFrom<u8> for TubeIndex {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            other => Err(format!("tube index must be 1, 2 or 3 (got {})", other)),
        }
    }
}

impl From<TubeIndex> for u8 {
    fn from(index: TubeIndex) -> Self {
        index.as_u8()
    }
}

impl fmt::Display for TubeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Per-user scheduling record for one stitch in one tube
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StitchPosition {
    pub stitch_id: String,
    /// Slot within the tube; 0 is the active slot
    pub position: u32,
    #[serde(default = "default_skip_number")]
    pub skip_number: u32,
    #[serde(default = "default_distractor_level")]
    pub distractor_level: u8,
    #[serde(default)]
    pub perfect_completion_count: u32,
    /// Consecutive perfect completions since seeding or the last miss
    #[serde(default)]
    pub perfect_streak: u32,
}

fn default_skip_number() -> u32 {
    SKIP_SEQUENCE[0]
}

fn default_distractor_level() -> u8 {
    MIN_DISTRACTOR_LEVEL
}

impl StitchPosition {
    pub fn new(stitch_id: String, position: u32) -> Self {
        Self {
            stitch_id,
            position,
            skip_number: default_skip_number(),
            distractor_level: default_distractor_level(),
            perfect_completion_count: 0,
            perfect_streak: 0,
        }
    }

    /// Reached the terminal interval; still cycles, just rarely
    pub fn is_retired(&self) -> bool {
        self.skip_number == SKIP_SEQUENCE[SKIP_SEQUENCE.len() - 1]
    }
}

/// An ordered queue of stitch positions drawn from one thread
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tube {
    pub index: TubeIndex,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Kept sorted by `position`
    #[serde(default)]
    pub positions: Vec<StitchPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stitch_id: Option<String>,
}

impl Tube {
    pub fn new(index: TubeIndex) -> Self {
        Self {
            index,
            thread_id: None,
            positions: Vec::new(),
            current_stitch_id: None,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn find(&self, stitch_id: &str) -> Option<&StitchPosition> {
        self.positions.iter().find(|p| p.stitch_id == stitch_id)
    }

    pub fn contains(&self, stitch_id: &str) -> bool {
        self.find(stitch_id).is_some()
    }
}

/// Aggregate scheduling state for one learner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TubeState {
    pub user_id: String,
    pub active_tube: TubeIndex,
    pub tubes: [Tube; 3],
    #[serde(default)]
    pub cycle_count: u64,
    /// Manifest version the tubes were last seeded from
    #[serde(default)]
    pub manifest_version: u32,
    pub updated_at: DateTime<Utc>,
}

impl TubeState {
    pub fn new(user_id: String) -> Self {
        Self {
            user_id,
            active_tube: TubeIndex::One,
            tubes: [
                Tube::new(TubeIndex::One),
                Tube::new(TubeIndex::Two),
                Tube::new(TubeIndex::Three),
            ],
            cycle_count: 0,
            manifest_version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn tube(&self, index: TubeIndex) -> &Tube {
        &self.tubes[index.slot()]
    }

    pub fn tube_mut(&mut self, index: TubeIndex) -> &mut Tube {
        &mut self.tubes[index.slot()]
    }
}

/// Kind of structural damage found in a tube
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Corruption {
    /// Two or more stitches shared a position
    DuplicatePosition { position: u32 },
    /// Positions were not a dense run from 0
    Gap { expected: u32, found: u32 },
    /// `current_stitch_id` disagreed with the position-0 stitch
    StaleCurrentStitch,
}

/// A structural repair the scheduler applied instead of failing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub tube: TubeIndex,
    pub problems: Vec<Corruption>,
}

/// Result of recording a completion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutcome {
    pub completed_tube: TubeIndex,
    pub stitch_id: String,
    pub perfect: bool,
    pub new_skip_number: u32,
    pub new_distractor_level: u8,
    pub new_position: u32,
    pub next_tube: TubeIndex,
    /// Position-0 stitch of `next_tube`; `None` if that tube is not seeded
    pub next_stitch_id: Option<String>,
    pub cycle_count: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repairs: Vec<RepairReport>,
}

//! Triple Helix spaced-repetition algorithm
//!
//! Pure functions over stitch positions. A perfect completion climbs the
//! skip sequence (3 → 5 → 10 → 25 → 100) and raises the distractor level;
//! any miss drops the stitch back to the first interval but never lowers
//! the distractor level.
//!
//! The interval applied on a perfect completion is indexed by the streak of
//! consecutive perfect completions: the first perfect completion after
//! seeding (or after a miss) uses the first interval, the second the next
//! one, and so on until the terminal interval.

use std::collections::BTreeMap;

use super::models::{
    Corruption, StitchPosition, MAX_DISTRACTOR_LEVEL, MIN_DISTRACTOR_LEVEL, SKIP_SEQUENCE,
};

/// Every question answered correctly, and at least one question asked
pub fn is_perfect(correct_count: u32, total_count: u32) -> bool {
    total_count > 0 && correct_count == total_count
}

/// Interval for a perfect completion given the streak before it
pub fn next_skip_number(perfect_streak: u32) -> u32 {
    let idx = (perfect_streak as usize).min(SKIP_SEQUENCE.len() - 1);
    SKIP_SEQUENCE[idx]
}

pub fn is_valid_skip_number(skip_number: u32) -> bool {
    SKIP_SEQUENCE.contains(&skip_number)
}

pub fn is_valid_distractor_level(level: u8) -> bool {
    (MIN_DISTRACTOR_LEVEL..=MAX_DISTRACTOR_LEVEL).contains(&level)
}

/// Update a stitch's schedule after a completion.
///
/// The interval is indexed by the streak before this completion, so the
/// first perfect run keeps skip 3 and the second moves to 5. That is the
/// progression the five-stitch walkthrough in `tubes` tests expects.
pub fn apply_completion(stitch: &mut StitchPosition, perfect: bool) {
    if perfect {
        stitch.skip_number = next_skip_number(stitch.perfect_streak);
        stitch.perfect_streak = stitch.perfect_streak.saturating_add(1);
        stitch.distractor_level = (stitch.distractor_level + 1).min(MAX_DISTRACTOR_LEVEL);
        stitch.perfect_completion_count = stitch.perfect_completion_count.saturating_add(1);
    } else {
        stitch.skip_number = SKIP_SEQUENCE[0];
        stitch.perfect_streak = 0;
    }
}

/// Move a completed stitch back into the tube.
///
/// The stitch is taken out, every stitch behind it moves up one slot, and it
/// is re-inserted at `min(skip_number, len - 1)`. `positions` must be sorted
/// and dense. Returns the new position, or `None` if the stitch is absent.
pub fn reslot(positions: &mut Vec<StitchPosition>, stitch_id: &str) -> Option<u32> {
    let idx = positions.iter().position(|p| p.stitch_id == stitch_id)?;
    let stitch = positions.remove(idx);

    let target = (stitch.skip_number as usize).min(positions.len());
    positions.insert(target, stitch);

    for (i, p) in positions.iter_mut().enumerate() {
        p.position = i as u32;
    }

    Some(target as u32)
}

/// Detect structural damage without changing anything
pub fn detect_corruption(positions: &[StitchPosition]) -> Vec<Corruption> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for p in positions {
        *counts.entry(p.position).or_default() += 1;
    }

    let duplicates: Vec<Corruption> = counts
        .iter()
        .filter(|(_, n)| **n > 1)
        .map(|(&position, _)| Corruption::DuplicatePosition { position })
        .collect();
    if !duplicates.is_empty() {
        return duplicates;
    }

    // Distinct positions: dense iff the sorted keys are exactly 0..n
    counts
        .keys()
        .enumerate()
        .find(|(i, found)| *i as u32 != **found)
        .map(|(i, &found)| {
            vec![Corruption::Gap {
                expected: i as u32,
                found,
            }]
        })
        .unwrap_or_default()
}

/// Re-sort by prior position (stable for ties) and reassign `0..n-1`.
///
/// Returns the problems that were repaired; empty if the tube was sound.
pub fn normalize_positions(positions: &mut Vec<StitchPosition>) -> Vec<Corruption> {
    let problems = detect_corruption(positions);

    positions.sort_by_key(|p| p.position);
    for (i, p) in positions.iter_mut().enumerate() {
        p.position = i as u32;
    }

    problems
}

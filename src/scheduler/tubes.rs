//! Tube scheduler
//!
//! Owns the three tubes of one learner and decides which stitch is shown
//! next. Works on stitch ids only; content never passes through here.

use chrono::Utc;
use thiserror::Error;

use super::algorithm::{
    apply_completion, detect_corruption, is_perfect, is_valid_distractor_level,
    is_valid_skip_number, normalize_positions, reslot,
};
use super::models::*;
use crate::manifest::ContentManifest;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Tube {0} has no seeded stitches")]
    EmptyTube(TubeIndex),

    #[error("Stitch {stitch_id} is not in tube {tube}")]
    UnknownStitch { tube: TubeIndex, stitch_id: String },

    #[error("Invalid tube index: {0}")]
    InvalidTube(u8),

    #[error("Corrupt scheduler state: {0}")]
    CorruptState(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// The interface every scheduler implementation provides
pub trait Scheduler {
    /// Tube whose stitch is presented next
    fn active_tube(&self) -> TubeIndex;

    /// Make a tube active without touching positions
    fn select_tube(&mut self, tube: TubeIndex);

    /// Position-0 stitch of the active tube
    fn current_stitch(&self) -> Result<String>;

    /// Apply a completion, re-slot the stitch and rotate to the next tube
    fn record_completion(
        &mut self,
        tube: TubeIndex,
        stitch_id: &str,
        correct_count: u32,
        total_count: u32,
    ) -> Result<CompletionOutcome>;

    /// Snapshot of a tube's stitches sorted by position
    fn get_tube_stitches(&self, tube: TubeIndex) -> Vec<StitchPosition>;

    /// Full state, for persistence
    fn state(&self) -> &TubeState;
}

/// Triple Helix scheduler: three tubes, cycled round-robin
#[derive(Debug, Clone)]
pub struct TubeScheduler {
    state: TubeState,
}

impl TubeScheduler {
    /// Fresh scheduler with empty tubes; seed it from a manifest
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            state: TubeState::new(user_id.into()),
        }
    }

    /// Rebuild a scheduler from state loaded under `user_id`.
    ///
    /// State recorded for a different learner is rejected as corrupt rather
    /// than adopted.
    pub fn from_saved(user_id: &str, state: TubeState) -> Result<(Self, Vec<RepairReport>)> {
        if state.user_id != user_id {
            log::warn!(
                "State loaded for {} belongs to {}",
                user_id,
                state.user_id
            );
            return Err(SchedulerError::CorruptState(format!(
                "state for user {} was loaded as {}",
                state.user_id, user_id
            )));
        }
        Self::from_state(state)
    }

    /// Rebuild a scheduler from persisted state.
    ///
    /// Out-of-domain skip numbers or distractor levels are a hard failure:
    /// continuing would silently break the repetition guarantee. Structural
    /// damage (duplicate or missing positions) is repaired and reported.
    pub fn from_state(mut state: TubeState) -> Result<(Self, Vec<RepairReport>)> {
        for (slot, tube) in state.tubes.iter().enumerate() {
            let expected = TubeIndex::ALL[slot];
            if tube.index != expected {
                return Err(SchedulerError::CorruptState(format!(
                    "tube in slot {} claims index {}",
                    slot + 1,
                    tube.index
                )));
            }

            for p in &tube.positions {
                if !is_valid_skip_number(p.skip_number) {
                    return Err(SchedulerError::CorruptState(format!(
                        "stitch {} in tube {} has skip number {}",
                        p.stitch_id, tube.index, p.skip_number
                    )));
                }
                if !is_valid_distractor_level(p.distractor_level) {
                    return Err(SchedulerError::CorruptState(format!(
                        "stitch {} in tube {} has distractor level {}",
                        p.stitch_id, tube.index, p.distractor_level
                    )));
                }
            }
        }

        let mut repairs = Vec::new();
        for tube in state.tubes.iter_mut() {
            if let Some(report) = repair_tube(tube) {
                repairs.push(report);
            }
        }

        for report in &repairs {
            log::warn!(
                "Repaired tube {} for user {}: {:?}",
                report.tube,
                state.user_id,
                report.problems
            );
        }

        Ok((Self { state }, repairs))
    }

    pub fn into_state(self) -> TubeState {
        self.state
    }

    pub fn user_id(&self) -> &str {
        &self.state.user_id
    }

    pub fn cycle_count(&self) -> u64 {
        self.state.cycle_count
    }

    /// Lazily create stitch positions from the manifest.
    ///
    /// An unseeded tube adopts the manifest's primary thread. Stitches of the
    /// tube's thread that have no position yet are appended after the
    /// existing ones, in canonical order, with default skip number and
    /// distractor level. Nothing is ever removed. Returns how many positions
    /// were created.
    pub fn seed_from_manifest(&mut self, manifest: &ContentManifest) -> usize {
        let mut added = 0;

        for index in TubeIndex::ALL {
            let tube = self.state.tube_mut(index);

            if tube.thread_id.is_none() {
                tube.thread_id = manifest.primary_thread(index).map(str::to_string);
            }
            let Some(thread_id) = tube.thread_id.clone() else {
                continue;
            };

            for reference in manifest.thread_stitches(index, &thread_id) {
                if tube.contains(&reference.id) {
                    continue;
                }
                let position = tube.positions.len() as u32;
                tube.positions
                    .push(StitchPosition::new(reference.id.clone(), position));
                added += 1;
            }

            sync_current(tube);
        }

        if added > 0 {
            log::info!(
                "Seeded {} stitch positions for user {} from manifest v{}",
                added,
                self.state.user_id,
                manifest.version
            );
        }
        self.state.manifest_version = manifest.version;
        self.state.updated_at = Utc::now();

        added
    }

    /// Repair every tube in place; used before each mutation
    fn repair_all(&mut self) -> Vec<RepairReport> {
        let mut repairs = Vec::new();
        for tube in self.state.tubes.iter_mut() {
            if let Some(report) = repair_tube(tube) {
                log::warn!("Repaired tube {}: {:?}", report.tube, report.problems);
                repairs.push(report);
            }
        }
        repairs
    }
}

impl Scheduler for TubeScheduler {
    fn active_tube(&self) -> TubeIndex {
        self.state.active_tube
    }

    fn select_tube(&mut self, tube: TubeIndex) {
        self.state.active_tube = tube;
        self.state.updated_at = Utc::now();
    }

    fn current_stitch(&self) -> Result<String> {
        let tube = self.state.tube(self.state.active_tube);
        // Positions are kept sorted; the minimum is position 0 on a sound tube
        tube.positions
            .iter()
            .min_by_key(|p| p.position)
            .map(|p| p.stitch_id.clone())
            .ok_or(SchedulerError::EmptyTube(tube.index))
    }

    fn record_completion(
        &mut self,
        tube_index: TubeIndex,
        stitch_id: &str,
        correct_count: u32,
        total_count: u32,
    ) -> Result<CompletionOutcome> {
        if !self.state.tube(tube_index).contains(stitch_id) {
            return Err(SchedulerError::UnknownStitch {
                tube: tube_index,
                stitch_id: stitch_id.to_string(),
            });
        }

        let repairs = self.repair_all();
        let perfect = is_perfect(correct_count, total_count);

        let tube = self.state.tube_mut(tube_index);
        if tube.current_stitch_id.as_deref() != Some(stitch_id) {
            log::debug!(
                "Completion for {} in tube {} which is not at position 0",
                stitch_id,
                tube_index
            );
        }

        let (new_skip_number, new_distractor_level) = {
            let stitch = tube
                .positions
                .iter_mut()
                .find(|p| p.stitch_id == stitch_id)
                .ok_or_else(|| SchedulerError::UnknownStitch {
                    tube: tube_index,
                    stitch_id: stitch_id.to_string(),
                })?;
            apply_completion(stitch, perfect);
            (stitch.skip_number, stitch.distractor_level)
        };

        let new_position = reslot(&mut tube.positions, stitch_id).ok_or_else(|| {
            SchedulerError::UnknownStitch {
                tube: tube_index,
                stitch_id: stitch_id.to_string(),
            }
        })?;
        sync_current(tube);

        let next_tube = tube_index.next();
        if tube_index == TubeIndex::Three {
            self.state.cycle_count += 1;
        }
        self.state.active_tube = next_tube;
        self.state.updated_at = Utc::now();

        let next_stitch_id = self.state.tube(next_tube).current_stitch_id.clone();

        log::debug!(
            "Completed {} in tube {} ({}/{}): skip {} level {} -> position {}; next tube {}",
            stitch_id,
            tube_index,
            correct_count,
            total_count,
            new_skip_number,
            new_distractor_level,
            new_position,
            next_tube
        );

        Ok(CompletionOutcome {
            completed_tube: tube_index,
            stitch_id: stitch_id.to_string(),
            perfect,
            new_skip_number,
            new_distractor_level,
            new_position,
            next_tube,
            next_stitch_id,
            cycle_count: self.state.cycle_count,
            repairs,
        })
    }

    fn get_tube_stitches(&self, tube: TubeIndex) -> Vec<StitchPosition> {
        let mut positions = self.state.tube(tube).positions.clone();
        positions.sort_by_key(|p| p.position);
        positions
    }

    fn state(&self) -> &TubeState {
        &self.state
    }
}

/// Keep `current_stitch_id` in step with the position-0 stitch
fn sync_current(tube: &mut Tube) {
    tube.current_stitch_id = tube.positions.first().map(|p| p.stitch_id.clone());
}

/// Normalise one tube; returns a report if anything had to change
fn repair_tube(tube: &mut Tube) -> Option<RepairReport> {
    let unsorted = tube.positions.windows(2).any(|w| w[0].position > w[1].position);
    let mut problems = if unsorted || !detect_corruption(&tube.positions).is_empty() {
        normalize_positions(&mut tube.positions)
    } else {
        Vec::new()
    };

    let head = tube.positions.first().map(|p| p.stitch_id.clone());
    if tube.current_stitch_id != head {
        // An unseeded tube with no current stitch is not damage
        if !(head.is_none() && tube.current_stitch_id.is_none()) {
            problems.push(Corruption::StaleCurrentStitch);
        }
        tube.current_stitch_id = head;
    }

    if problems.is_empty() {
        None
    } else {
        Some(RepairReport {
            tube: tube.index,
            problems,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_with(counts: [usize; 3]) -> ContentManifest {
        let mut tubes = serde_json::Map::new();
        for (i, count) in counts.iter().enumerate() {
            let stitches: Vec<serde_json::Value> = (0..*count)
                .map(|s| {
                    serde_json::json!({
                        "id": format!("t{}-s{}", i + 1, s),
                        "order": s + 1,
                        "title": format!("Stitch {}", s),
                    })
                })
                .collect();
            tubes.insert(
                (i + 1).to_string(),
                serde_json::json!({ "threads": { format!("thread-{}", i + 1): {
                    "title": "Thread", "stitches": stitches
                } } }),
            );
        }
        let json = serde_json::json!({ "version": 1, "tubes": tubes });
        ContentManifest::from_json(&json.to_string()).unwrap()
    }

    fn seeded(counts: [usize; 3]) -> TubeScheduler {
        let mut scheduler = TubeScheduler::new("learner");
        scheduler.seed_from_manifest(&manifest_with(counts));
        scheduler
    }

    fn positions_of(scheduler: &TubeScheduler, tube: TubeIndex) -> Vec<(String, u32)> {
        scheduler
            .get_tube_stitches(tube)
            .into_iter()
            .map(|p| (p.stitch_id, p.position))
            .collect()
    }

    fn assert_dense(scheduler: &TubeScheduler) {
        for tube in TubeIndex::ALL {
            let stitches = scheduler.get_tube_stitches(tube);
            let mut positions: Vec<u32> = stitches.iter().map(|p| p.position).collect();
            positions.sort();
            let expected: Vec<u32> = (0..stitches.len() as u32).collect();
            assert_eq!(positions, expected, "tube {} not dense", tube);
        }
    }

    #[test]
    fn test_current_stitch_requires_seeding() {
        let scheduler = TubeScheduler::new("learner");
        assert_eq!(
            scheduler.current_stitch(),
            Err(SchedulerError::EmptyTube(TubeIndex::One))
        );

        let scheduler = seeded([5, 5, 5]);
        assert_eq!(scheduler.current_stitch().unwrap(), "t1-s0");
    }

    #[test]
    fn test_example_scenario() {
        let mut scheduler = seeded([5, 5, 5]);

        let outcome = scheduler
            .record_completion(TubeIndex::One, "t1-s0", 20, 20)
            .unwrap();
        assert!(outcome.perfect);
        assert_eq!(outcome.new_skip_number, 3);
        assert_eq!(outcome.new_position, 3);
        assert_eq!(outcome.next_tube, TubeIndex::Two);
        assert_eq!(outcome.next_stitch_id.as_deref(), Some("t2-s0"));
        assert_eq!(
            positions_of(&scheduler, TubeIndex::One),
            vec![
                ("t1-s1".to_string(), 0),
                ("t1-s2".to_string(), 1),
                ("t1-s3".to_string(), 2),
                ("t1-s0".to_string(), 3),
                ("t1-s4".to_string(), 4),
            ]
        );

        // Work the stitch back to the front of tube 1
        scheduler.record_completion(TubeIndex::Two, "t2-s0", 5, 10).unwrap();
        scheduler.record_completion(TubeIndex::Three, "t3-s0", 5, 10).unwrap();
        for _ in 0..3 {
            let current = scheduler.current_stitch().unwrap();
            assert_ne!(current, "t1-s0");
            scheduler.record_completion(TubeIndex::One, &current, 5, 10).unwrap();
            let two = scheduler.current_stitch().unwrap();
            scheduler.record_completion(TubeIndex::Two, &two, 5, 10).unwrap();
            let three = scheduler.current_stitch().unwrap();
            scheduler.record_completion(TubeIndex::Three, &three, 5, 10).unwrap();
        }

        assert_eq!(scheduler.current_stitch().unwrap(), "t1-s0");
        let outcome = scheduler
            .record_completion(TubeIndex::One, "t1-s0", 20, 20)
            .unwrap();
        assert_eq!(outcome.new_skip_number, 5);
        assert_eq!(outcome.new_position, 4);
        assert_dense(&scheduler);
    }

    #[test]
    fn test_tube_rotation_and_cycle_count() {
        let mut scheduler = seeded([4, 4, 4]);
        let mut expected = TubeIndex::One;

        for call in 1..=12u64 {
            assert_eq!(scheduler.active_tube(), expected);
            let current = scheduler.current_stitch().unwrap();
            let outcome = scheduler
                .record_completion(expected, &current, (call % 2) as u32, 1)
                .unwrap();
            expected = expected.next();
            assert_eq!(outcome.next_tube, expected);
            assert_eq!(outcome.cycle_count, call / 3);
            assert_dense(&scheduler);
        }
        assert_eq!(scheduler.cycle_count(), 4);
    }

    #[test]
    fn test_miss_resets_skip_and_keeps_level() {
        let mut scheduler = seeded([6, 1, 1]);
        scheduler.record_completion(TubeIndex::One, "t1-s0", 10, 10).unwrap();
        scheduler.select_tube(TubeIndex::One);

        let outcome = scheduler
            .record_completion(TubeIndex::One, "t1-s0", 15, 20)
            .unwrap();
        assert!(!outcome.perfect);
        assert_eq!(outcome.new_skip_number, 3);
        assert_eq!(outcome.new_distractor_level, 2);
        assert_eq!(outcome.new_position, 3);
    }

    #[test]
    fn test_zero_question_completion_is_not_perfect() {
        let mut scheduler = seeded([3, 1, 1]);
        let outcome = scheduler
            .record_completion(TubeIndex::One, "t1-s0", 0, 0)
            .unwrap();
        assert!(!outcome.perfect);
        assert_eq!(outcome.new_distractor_level, 1);
    }

    #[test]
    fn test_unknown_stitch_leaves_state_untouched() {
        let mut scheduler = seeded([3, 3, 3]);
        let before = positions_of(&scheduler, TubeIndex::One);

        let err = scheduler
            .record_completion(TubeIndex::One, "t2-s0", 5, 5)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownStitch { .. }));
        assert_eq!(positions_of(&scheduler, TubeIndex::One), before);
        assert_eq!(scheduler.active_tube(), TubeIndex::One);
    }

    #[test]
    fn test_select_tube_does_not_move_positions() {
        let mut scheduler = seeded([3, 3, 3]);
        let before = positions_of(&scheduler, TubeIndex::Three);
        scheduler.select_tube(TubeIndex::Three);
        assert_eq!(scheduler.current_stitch().unwrap(), "t3-s0");
        assert_eq!(positions_of(&scheduler, TubeIndex::Three), before);
    }

    #[test]
    fn test_seed_appends_new_manifest_stitches() {
        let mut scheduler = seeded([3, 3, 3]);
        scheduler.record_completion(TubeIndex::One, "t1-s0", 1, 1).unwrap();

        let added = scheduler.seed_from_manifest(&manifest_with([5, 3, 3]));
        assert_eq!(added, 2);
        let tube = positions_of(&scheduler, TubeIndex::One);
        assert_eq!(tube.len(), 5);
        assert_eq!(tube[3], ("t1-s3".to_string(), 3));
        assert_eq!(tube[4], ("t1-s4".to_string(), 4));

        assert_eq!(scheduler.seed_from_manifest(&manifest_with([5, 3, 3])), 0);
    }

    #[test]
    fn test_from_state_repairs_structure() {
        let mut state = seeded([4, 2, 2]).into_state();
        state.tubes[0].positions[1].position = 0;
        state.tubes[0].current_stitch_id = Some("bogus".to_string());

        let (scheduler, repairs) = TubeScheduler::from_state(state).unwrap();
        assert_eq!(repairs.len(), 1);
        assert_eq!(repairs[0].tube, TubeIndex::One);
        assert!(repairs[0]
            .problems
            .contains(&Corruption::DuplicatePosition { position: 0 }));
        assert!(repairs[0].problems.contains(&Corruption::StaleCurrentStitch));
        assert_eq!(scheduler.current_stitch().unwrap(), "t1-s0");
        assert_dense(&scheduler);
    }

    #[test]
    fn test_record_completion_reports_repairs() {
        let mut scheduler = seeded([4, 2, 2]);
        scheduler.state.tubes[1].positions[0].position = 5;

        let outcome = scheduler
            .record_completion(TubeIndex::One, "t1-s0", 1, 1)
            .unwrap();
        assert_eq!(outcome.repairs.len(), 1);
        assert_eq!(outcome.repairs[0].tube, TubeIndex::Two);
        assert_dense(&scheduler);
    }

    #[test]
    fn test_from_state_rejects_out_of_domain_values() {
        let mut state = seeded([2, 2, 2]).into_state();
        state.tubes[2].positions[0].skip_number = 7;
        assert!(matches!(
            TubeScheduler::from_state(state),
            Err(SchedulerError::CorruptState(_))
        ));

        let mut state = seeded([2, 2, 2]).into_state();
        state.tubes[0].positions[1].distractor_level = 9;
        assert!(matches!(
            TubeScheduler::from_state(state),
            Err(SchedulerError::CorruptState(_))
        ));
    }

    #[test]
    fn test_from_saved_rejects_another_users_state() {
        let state = seeded([2, 2, 2]).into_state();
        let owner = state.user_id.clone();

        assert!(matches!(
            TubeScheduler::from_saved("someone-else", state.clone()),
            Err(SchedulerError::CorruptState(_))
        ));

        let (scheduler, repairs) = TubeScheduler::from_saved(&owner, state).unwrap();
        assert!(repairs.is_empty());
        assert_eq!(scheduler.user_id(), owner);
    }

    #[test]
    fn test_state_round_trip_preserves_schedule() {
        let mut scheduler = seeded([5, 5, 5]);
        for _ in 0..7 {
            let tube = scheduler.active_tube();
            let current = scheduler.current_stitch().unwrap();
            scheduler.record_completion(tube, &current, 3, 3).unwrap();
        }

        let json = serde_json::to_string(scheduler.state()).unwrap();
        let restored: TubeState = serde_json::from_str(&json).unwrap();
        let (restored, repairs) = TubeScheduler::from_state(restored).unwrap();

        assert!(repairs.is_empty());
        assert_eq!(restored.current_stitch(), scheduler.current_stitch());
        assert_eq!(restored.cycle_count(), scheduler.cycle_count());
        for tube in TubeIndex::ALL {
            assert_eq!(
                restored.get_tube_stitches(tube),
                scheduler.get_tube_stitches(tube)
            );
        }
    }
}

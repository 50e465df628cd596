//! Smooth interpolation of displayed stage progress.
//!
//! The underlying signal is a coarse "stage done / not done" boolean, so the
//! animator fakes continuity: each lane advances toward its target on a fixed
//! external cadence with a sub-linear step, closing large gaps quickly while
//! small gaps still visibly move. Displayed values never decrease and never
//! overshoot the target.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::stage::StageName;

/// Cadence at which [`ProgressAnimator::tick`] is expected to be driven.
pub const TICK_INTERVAL: Duration = Duration::from_millis(200);

/// Divisor for the sub-linear step.
const STEP_DIVISOR: f32 = 15.0;

/// Minimum advance per tick, in percentage points.
const MIN_STEP: f32 = 1.0;

#[derive(Debug, Clone, Copy, Default)]
struct Lane {
    displayed: f32,
    target: f32,
}

/// Per-stage progress interpolator.
#[derive(Debug)]
pub struct ProgressAnimator {
    lanes: BTreeMap<StageName, Lane>,
}

impl Default for ProgressAnimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressAnimator {
    pub fn new() -> Self {
        let lanes = StageName::ALL
            .into_iter()
            .map(|stage| (stage, Lane::default()))
            .collect();
        Self { lanes }
    }

    /// Aim a lane at a new target.
    ///
    /// The animator always aims at the most recent target that is at least
    /// the current displayed value; a stale target below what is already
    /// shown is ignored so the bar never has to move backwards.
    pub fn set_target(&mut self, stage: StageName, target: f32) {
        let lane = self.lanes.entry(stage).or_default();
        let target = target.clamp(0.0, 100.0);
        if target >= lane.displayed {
            lane.target = target;
        }
    }

    /// Snap a lane straight to 100 on confirmed completion.
    pub fn finish(&mut self, stage: StageName) {
        let lane = self.lanes.entry(stage).or_default();
        lane.displayed = 100.0;
        lane.target = 100.0;
    }

    pub fn displayed(&self, stage: StageName) -> f32 {
        self.lanes.get(&stage).map(|lane| lane.displayed).unwrap_or(0.0)
    }

    /// Advance every lane one step toward its target.
    ///
    /// Returns the lanes that moved, with their new displayed values, in
    /// stage order.
    pub fn tick(&mut self) -> Vec<(StageName, f32)> {
        let mut moved = Vec::new();
        for (stage, lane) in self.lanes.iter_mut() {
            let remaining = lane.target - lane.displayed;
            if remaining <= 0.0 {
                continue;
            }
            let step = (remaining / STEP_DIVISOR).max(MIN_STEP).min(remaining);
            lane.displayed += step;
            moved.push((*stage, lane.displayed));
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{DONE, INTERIM_TARGET};

    const STAGE: StageName = StageName::Cleaning;

    #[test]
    fn large_gap_closes_sublinearly() {
        let mut animator = ProgressAnimator::new();
        animator.set_target(STAGE, INTERIM_TARGET);
        let moved = animator.tick();
        // First step from 0 toward 85 is 85/15.
        assert_eq!(moved.len(), 1);
        let (stage, displayed) = moved[0];
        assert_eq!(stage, STAGE);
        assert!((displayed - 85.0 / 15.0).abs() < 1e-4);
    }

    #[test]
    fn small_gap_still_moves_at_least_one_point() {
        let mut animator = ProgressAnimator::new();
        animator.set_target(STAGE, 3.0);
        let (_, displayed) = animator.tick()[0];
        assert!((displayed - 1.0).abs() < 1e-4);
    }

    #[test]
    fn never_overshoots_the_target() {
        let mut animator = ProgressAnimator::new();
        animator.set_target(STAGE, 2.5);
        animator.tick();
        animator.tick();
        // Remaining 0.5 is below the minimum step; the step is clamped.
        animator.tick();
        assert!((animator.displayed(STAGE) - 2.5).abs() < 1e-4);
        assert!(animator.tick().is_empty());
    }

    #[test]
    fn converges_to_target_and_stops() {
        let mut animator = ProgressAnimator::new();
        animator.set_target(STAGE, DONE);
        let mut previous = 0.0;
        for _ in 0..200 {
            for (_, displayed) in animator.tick() {
                assert!(displayed > previous);
                assert!(displayed <= DONE);
                previous = displayed;
            }
        }
        assert!((animator.displayed(STAGE) - DONE).abs() < 1e-4);
        assert!(animator.tick().is_empty());
    }

    #[test]
    fn stale_lower_target_is_ignored() {
        let mut animator = ProgressAnimator::new();
        animator.set_target(STAGE, DONE);
        for _ in 0..40 {
            animator.tick();
        }
        let shown = animator.displayed(STAGE);
        assert!(shown > INTERIM_TARGET);
        animator.set_target(STAGE, INTERIM_TARGET);
        animator.tick();
        // Still aiming at 100, not pulled back to 85.
        assert!(animator.displayed(STAGE) > shown);
    }

    #[test]
    fn raised_target_resumes_from_current_value() {
        let mut animator = ProgressAnimator::new();
        animator.set_target(STAGE, INTERIM_TARGET);
        for _ in 0..200 {
            animator.tick();
        }
        assert!((animator.displayed(STAGE) - INTERIM_TARGET).abs() < 1e-4);
        animator.set_target(STAGE, DONE);
        let (_, displayed) = animator.tick()[0];
        assert!(displayed > INTERIM_TARGET);
        assert!(displayed < DONE);
    }

    #[test]
    fn finish_snaps_to_done() {
        let mut animator = ProgressAnimator::new();
        animator.set_target(STAGE, INTERIM_TARGET);
        animator.tick();
        animator.finish(STAGE);
        assert!((animator.displayed(STAGE) - DONE).abs() < f32::EPSILON);
        assert!(animator.tick().is_empty());
    }

    #[test]
    fn lanes_advance_independently() {
        let mut animator = ProgressAnimator::new();
        animator.set_target(StageName::Cleaning, DONE);
        animator.set_target(StageName::Extraction, INTERIM_TARGET);
        let moved = animator.tick();
        assert_eq!(moved.len(), 2);
        assert!(animator.displayed(StageName::Abstraction) < f32::EPSILON);
    }
}

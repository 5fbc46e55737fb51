//! Progression planning for weight suggestions within a block.
//!
//! This module implements the ramp a lifter follows through a block:
//! - With a %1RM target: linear interpolation from the block's start weight
//!   to the target, landing exactly on target at the last set
//! - Without intensity data: a fixed-increment ramp from the start weight
//! - Sets rated "hard" freeze the ramp so the same weight is suggested again
//!
//! Everything here is pure and total. Missing data degrades to fallbacks.

use crate::{Config, Feedback, LiftCategory, LocalSet, LoggedSet};
use serde::{Deserialize, Serialize};

/// Increment (weight units) for both the fallback ramp and block carry-over
pub const DEFAULT_INCREMENT: f64 = 2.0;

/// The parts of a performed set the planner cares about
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SetOutcome {
    pub weight: f64,
    pub feedback: Option<Feedback>,
}

impl From<&LoggedSet> for SetOutcome {
    fn from(set: &LoggedSet) -> Self {
        Self {
            weight: set.weight,
            feedback: set.feedback,
        }
    }
}

impl From<&LocalSet> for SetOutcome {
    fn from(set: &LocalSet) -> Self {
        Self {
            weight: set.weight,
            feedback: set.feedback,
        }
    }
}

/// One exercise's block as seen by the planner
#[derive(Clone, Debug, PartialEq)]
pub struct ExerciseProgress {
    pub category: LiftCategory,
    pub target_sets: u32,
    /// Target weight derived from %1RM, absent without intensity data
    pub target: Option<f64>,
    pub sets: Vec<SetOutcome>,
}

impl ExerciseProgress {
    pub fn last_set_weight(&self) -> Option<f64> {
        self.sets.last().map(|s| s.weight)
    }
}

/// Planner output for the next set of a block
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    pub block_start: f64,
    pub target: Option<f64>,
    /// 1-indexed ordinal of the next set, ignoring hard-rated sets
    pub position: u32,
    pub next_weight: f64,
    /// Planned weight for every set of the block
    pub planned: Vec<f64>,
}

/// Weight ramp parameters for one lifter
#[derive(Clone, Debug, PartialEq)]
pub struct Planner {
    pub bar_weight: f64,
    pub fallback_increment: f64,
    pub carry_over_increment: f64,
}

impl Default for Planner {
    fn default() -> Self {
        Self {
            bar_weight: 20.0,
            fallback_increment: DEFAULT_INCREMENT,
            carry_over_increment: DEFAULT_INCREMENT,
        }
    }
}

impl Planner {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bar_weight: config.lifter.bar_weight,
            fallback_increment: config.progression.fallback_increment,
            carry_over_increment: config.progression.carry_over_increment,
        }
    }

    /// Suggested weight for the `position`-th set of a block
    ///
    /// Rules:
    /// 1. No target: `block_start + (position - 1) * fallback_increment`
    /// 2. Target at or below the start: the target for every position
    /// 3. Otherwise interpolate over `max(1, total_sets - 1)` steps, clamped
    ///    so the last set lands on target, rounded to whole units
    pub fn planned_weight(
        &self,
        position: u32,
        block_start: f64,
        target: Option<f64>,
        total_sets: u32,
    ) -> f64 {
        let step = position.saturating_sub(1);

        let target = match target {
            None => return block_start + f64::from(step) * self.fallback_increment,
            Some(t) if t <= block_start => return t,
            Some(t) => t,
        };

        let steps = total_sets.saturating_sub(1).max(1);
        let clamped = step.min(steps);
        if clamped == 0 {
            return block_start;
        }

        let fraction = f64::from(clamped) / f64::from(steps);
        (block_start + (target - block_start) * fraction).round()
    }

    /// Starting weight for a block, given the block performed before it
    ///
    /// The first block starts on the empty bar. Later blocks carry over the
    /// previous block's last set plus an increment, unless the lifts are in
    /// different categories or the carried weight already reaches this
    /// block's target.
    pub fn block_start_weight(
        &self,
        previous: Option<&ExerciseProgress>,
        current: &ExerciseProgress,
    ) -> f64 {
        let Some(previous) = previous else {
            return self.bar_weight;
        };

        if previous.category != current.category {
            return self.bar_weight;
        }

        let Some(last) = previous.last_set_weight() else {
            return self.bar_weight;
        };

        let carried = last + self.carry_over_increment;
        match current.target {
            Some(target) if carried >= target => {
                tracing::debug!(
                    "Carry-over {} meets target {}, starting from bar",
                    carried,
                    target
                );
                self.bar_weight
            }
            _ => carried,
        }
    }

    /// Suggestion for the next set of `current`
    pub fn suggest(
        &self,
        previous: Option<&ExerciseProgress>,
        current: &ExerciseProgress,
    ) -> Suggestion {
        let block_start = self.block_start_weight(previous, current);
        let total_sets = current.target_sets.max(1);
        let position = effective_position(&current.sets);

        let next_weight = match current.sets.last() {
            // Hard sets repeat exactly what was just lifted
            Some(last) if last.feedback == Some(Feedback::Hard) => last.weight,
            _ => self.planned_weight(position, block_start, current.target, total_sets),
        };

        let planned = (1..=total_sets)
            .map(|p| self.planned_weight(p, block_start, current.target, total_sets))
            .collect();

        Suggestion {
            block_start,
            target: current.target,
            position,
            next_weight,
            planned,
        }
    }
}

/// Ordinal of the next set: every logged set advances it except hard ones
pub fn effective_position(sets: &[SetOutcome]) -> u32 {
    let advancing = sets
        .iter()
        .filter(|s| s.feedback != Some(Feedback::Hard))
        .count();
    advancing as u32 + 1
}

/// Target weight from a 1RM and percentage, when both are known
pub fn target_weight(one_rep_max: Option<f64>, up_to_percent: Option<f64>) -> Option<f64> {
    match (one_rep_max, up_to_percent) {
        (Some(max), Some(pct)) if max > 0.0 && pct > 0.0 => Some((max * pct / 100.0).round()),
        _ => None,
    }
}

//! Default catalog of lifts and sample programs.
//!
//! This module provides the built-in lifts and programs a fresh store is
//! seeded with, plus structural validation for any catalog.

use crate::types::*;
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashSet};

/// The complete catalog of lifts and program definitions
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    pub lifts: BTreeMap<String, Lift>,
    pub programs: BTreeMap<String, Program>,
}

/// Cached default catalog - built once and reused across all operations
static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(build_default_catalog);

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

/// Builds the default catalog with built-in lifts and programs
///
/// **Note**: For production use, prefer `get_default_catalog()` which returns a
/// cached reference.
pub fn build_default_catalog() -> Catalog {
    let mut lifts = BTreeMap::new();

    // ========================================================================
    // Lifts
    // ========================================================================

    let defs: &[(&str, &str, LiftCategory, Option<&str>)] = &[
        ("snatch", "Snatch", LiftCategory::Olympic, None),
        ("clean", "Clean", LiftCategory::Olympic, None),
        ("jerk", "Jerk", LiftCategory::Olympic, None),
        ("clean_and_jerk", "Clean & Jerk", LiftCategory::Olympic, None),
        ("power_snatch", "Power Snatch", LiftCategory::Olympic, Some("snatch")),
        ("hang_snatch", "Hang Snatch", LiftCategory::Olympic, Some("snatch")),
        ("power_clean", "Power Clean", LiftCategory::Olympic, Some("clean")),
        ("hang_clean", "Hang Clean", LiftCategory::Olympic, Some("clean")),
        ("split_jerk", "Split Jerk", LiftCategory::Olympic, Some("jerk")),
        ("back_squat", "Back Squat", LiftCategory::Powerlifting, None),
        ("front_squat", "Front Squat", LiftCategory::Powerlifting, None),
        ("bench_press", "Bench Press", LiftCategory::Powerlifting, None),
        ("deadlift", "Deadlift", LiftCategory::Powerlifting, None),
        ("pause_squat", "Pause Back Squat", LiftCategory::Powerlifting, Some("back_squat")),
        ("snatch_pull", "Snatch Pull", LiftCategory::PullVariation, Some("snatch")),
        ("clean_pull", "Clean Pull", LiftCategory::PullVariation, Some("clean")),
        ("overhead_squat", "Overhead Squat", LiftCategory::Accessory, None),
        ("romanian_deadlift", "Romanian Deadlift", LiftCategory::Accessory, Some("deadlift")),
        ("strict_press", "Strict Press", LiftCategory::Accessory, None),
        ("pull_up", "Pull-up", LiftCategory::Accessory, None),
        ("snatch_balance", "Snatch Balance", LiftCategory::Drill, Some("snatch")),
        ("tall_clean", "Tall Clean", LiftCategory::Drill, Some("clean")),
    ];

    for &(id, name, category, parent) in defs {
        lifts.insert(
            id.to_string(),
            Lift {
                id: id.into(),
                name: name.into(),
                category,
                parent_lift_id: parent.map(Into::into),
                is_core: true,
            },
        );
    }

    // ========================================================================
    // Programs
    // ========================================================================

    let mut programs = BTreeMap::new();
    let olympic = olympic_base_program();
    let strength = strength_program();
    programs.insert(olympic.id.clone(), olympic);
    programs.insert(strength.id.clone(), strength);

    Catalog { lifts, programs }
}

fn movement(lift_id: &str, reps: Option<u32>) -> BlockMovement {
    BlockMovement {
        lift_id: lift_id.into(),
        reps,
    }
}

fn up_to_block(id: String, sets: u32, reps: u32, percent: f64, movements: Vec<BlockMovement>) -> ProgramBlock {
    ProgramBlock {
        id,
        sets,
        reps,
        up_to: true,
        up_to_percent: Some(percent),
        up_to_rpe: None,
        notes: None,
        movements,
    }
}

fn straight_block(id: String, sets: u32, reps: u32, lift_id: &str, notes: &str) -> ProgramBlock {
    ProgramBlock {
        id,
        sets,
        reps,
        up_to: false,
        up_to_percent: None,
        up_to_rpe: None,
        notes: Some(notes.into()),
        movements: vec![movement(lift_id, None)],
    }
}

/// 3-week Olympic base: intensity climbs 75 → 80 → 85%
fn olympic_base_program() -> Program {
    let id = "oly_base";
    let weeks = (1..=3u32)
        .map(|w| {
            let pct = 70.0 + 5.0 * f64::from(w);
            let day = |d: u32| format!("{}_w{}_d{}", id, w, d);

            let snatch_day = ProgramDay {
                id: day(1),
                name: "Snatch + Squat".into(),
                blocks: vec![
                    // Complex: 2 power snatches + 1 overhead squat per set
                    up_to_block(
                        format!("{}_a", day(1)),
                        5,
                        2,
                        pct,
                        vec![movement("power_snatch", None), movement("overhead_squat", Some(1))],
                    ),
                    up_to_block(format!("{}_b", day(1)), 4, 3, pct + 15.0, vec![movement("snatch_pull", None)]),
                    up_to_block(format!("{}_c", day(1)), 5, 5, pct - 5.0, vec![movement("back_squat", None)]),
                    straight_block(format!("{}_d", day(1)), 3, 8, "pull_up", "Strict, full hang"),
                ],
            };

            let clean_day = ProgramDay {
                id: day(2),
                name: "Clean & Jerk + Squat".into(),
                blocks: vec![
                    up_to_block(format!("{}_a", day(2)), 5, 1, pct, vec![movement("clean_and_jerk", None)]),
                    up_to_block(format!("{}_b", day(2)), 4, 3, pct + 15.0, vec![movement("clean_pull", None)]),
                    up_to_block(format!("{}_c", day(2)), 5, 3, pct, vec![movement("front_squat", None)]),
                    straight_block(format!("{}_d", day(2)), 3, 8, "romanian_deadlift", "Controlled eccentric"),
                ],
            };

            ProgramWeek {
                week_number: w,
                days: vec![snatch_day, clean_day],
            }
        })
        .collect();

    Program {
        id: id.into(),
        name: "Olympic Base (3 weeks)".into(),
        duration_weeks: 3,
        weeks,
    }
}

/// 2-week 5x5 strength block
fn strength_program() -> Program {
    let id = "strength_5x5";
    let weeks = (1..=2u32)
        .map(|w| {
            let pct = 65.0 + 5.0 * f64::from(w);
            let day = |d: u32| format!("{}_w{}_d{}", id, w, d);

            ProgramWeek {
                week_number: w,
                days: vec![
                    ProgramDay {
                        id: day(1),
                        name: "Squat + Bench".into(),
                        blocks: vec![
                            up_to_block(format!("{}_a", day(1)), 5, 5, pct, vec![movement("back_squat", None)]),
                            up_to_block(format!("{}_b", day(1)), 5, 5, pct, vec![movement("bench_press", None)]),
                            straight_block(format!("{}_c", day(1)), 3, 8, "pull_up", "Add load when 3x8 is easy"),
                        ],
                    },
                    ProgramDay {
                        id: day(2),
                        name: "Squat + Deadlift".into(),
                        blocks: vec![
                            up_to_block(format!("{}_a", day(2)), 5, 5, pct, vec![movement("back_squat", None)]),
                            up_to_block(format!("{}_b", day(2)), 1, 5, pct + 5.0, vec![movement("deadlift", None)]),
                            straight_block(format!("{}_c", day(2)), 3, 5, "strict_press", "Strict, no leg drive"),
                        ],
                    },
                ],
            }
        })
        .collect();

    Program {
        id: id.into(),
        name: "Strength 5x5 (2 weeks)".into(),
        duration_weeks: 2,
        weeks,
    }
}

impl Catalog {
    /// Validates the catalog for structural consistency
    ///
    /// Returns a list of validation errors (empty if valid)
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for lift in self.lifts.values() {
            if let Some(parent_id) = &lift.parent_lift_id {
                match self.lifts.get(parent_id) {
                    None => errors.push(format!(
                        "Lift '{}' references unknown parent '{}'",
                        lift.id, parent_id
                    )),
                    Some(parent) if parent.parent_lift_id.is_some() => errors.push(format!(
                        "Lift '{}' has parent '{}' which is itself a variation",
                        lift.id, parent_id
                    )),
                    Some(_) => {}
                }
            }
        }

        let mut day_ids = HashSet::new();
        let mut block_ids = HashSet::new();

        for program in self.programs.values() {
            if program.duration_weeks == 0 {
                errors.push(format!("Program '{}' has zero duration", program.id));
            }

            let mut week_numbers = HashSet::new();
            for week in &program.weeks {
                if week.week_number == 0 || week.week_number > program.duration_weeks {
                    errors.push(format!(
                        "Program '{}' has week {} outside 1..={}",
                        program.id, week.week_number, program.duration_weeks
                    ));
                }
                if !week_numbers.insert(week.week_number) {
                    errors.push(format!(
                        "Program '{}' repeats week {}",
                        program.id, week.week_number
                    ));
                }

                for day in &week.days {
                    if !day_ids.insert(day.id.as_str()) {
                        errors.push(format!("Duplicate day id '{}'", day.id));
                    }
                    for block in &day.blocks {
                        self.validate_block(block, &mut errors);
                        if !block_ids.insert(block.id.as_str()) {
                            errors.push(format!("Duplicate block id '{}'", block.id));
                        }
                    }
                }
            }
        }

        errors
    }

    fn validate_block(&self, block: &ProgramBlock, errors: &mut Vec<String>) {
        if block.sets < 1 || block.reps < 1 {
            errors.push(format!(
                "Block '{}' needs at least 1 set and 1 rep",
                block.id
            ));
        }
        if block.movements.is_empty() {
            errors.push(format!("Block '{}' has no movements", block.id));
        }
        for m in &block.movements {
            if !self.lifts.contains_key(&m.lift_id) {
                errors.push(format!(
                    "Block '{}' references unknown lift '{}'",
                    block.id, m.lift_id
                ));
            }
            if m.reps == Some(0) {
                errors.push(format!(
                    "Block '{}' movement '{}' has zero reps",
                    block.id, m.lift_id
                ));
            }
        }
        if let Some(pct) = block.up_to_percent {
            if !(pct > 0.0 && pct <= 200.0) {
                errors.push(format!("Block '{}' has invalid percent {}", block.id, pct));
            }
        }
    }
}

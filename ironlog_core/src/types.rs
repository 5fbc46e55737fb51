//! Core domain types for the ironlog strength tracker.
//!
//! This module defines the fundamental types used throughout the system:
//! - Lifts and their categories
//! - Personal records and their provenance
//! - Programs (weeks, days, blocks, movements) and assignments
//! - Sessions, exercises and logged sets
//! - Annotated session views handed to clients

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Lift Types
// ============================================================================

/// Broad family a lift belongs to
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LiftCategory {
    Olympic,
    Powerlifting,
    Accessory,
    PullVariation,
    Drill,
}

/// A lift definition (e.g., "Power Snatch")
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Lift {
    pub id: String,
    pub name: String,
    pub category: LiftCategory,
    /// Canonical lift this one is a variation of
    pub parent_lift_id: Option<String>,
    /// Core lifts ship with the catalog, everything else is user-created
    pub is_core: bool,
}

impl Lift {
    /// Id used for 1RM lookups. Variations never carry their own max.
    pub fn canonical_id(&self) -> &str {
        self.parent_lift_id.as_deref().unwrap_or(&self.id)
    }
}

// ============================================================================
// Personal Records
// ============================================================================

/// Where a personal record came from
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Session,
    Manual,
    Competition,
}

impl FromStr for RecordSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "session" => Ok(RecordSource::Session),
            "manual" => Ok(RecordSource::Manual),
            "competition" | "comp" => Ok(RecordSource::Competition),
            other => Err(Error::Validation(format!("unknown record source '{}'", other))),
        }
    }
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecordSource::Session => "session",
            RecordSource::Manual => "manual",
            RecordSource::Competition => "competition",
        };
        f.pad(label)
    }
}

/// An append-only best-weight entry for (user, lift, reps)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PersonalRecord {
    pub id: Uuid,
    pub user_id: String,
    pub lift_id: String,
    pub weight: f64,
    pub reps: u32,
    pub estimated_one_rep_max: f64,
    pub date: DateTime<Utc>,
    pub source: RecordSource,
    pub session_set_id: Option<Uuid>,
}

// ============================================================================
// Program Types
// ============================================================================

/// One lift inside a block. Complex blocks carry several.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BlockMovement {
    pub lift_id: String,
    /// Overrides the block's default reps for this movement
    pub reps: Option<u32>,
}

/// One scheduled unit of work within a day (e.g., "5x2 Clean @ 80%")
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgramBlock {
    pub id: String,
    pub sets: u32,
    pub reps: u32,
    pub up_to: bool,
    pub up_to_percent: Option<f64>,
    pub up_to_rpe: Option<f32>,
    pub notes: Option<String>,
    pub movements: Vec<BlockMovement>,
}

impl ProgramBlock {
    /// Percentage target, only meaningful for "up to" blocks
    pub fn intensity_percent(&self) -> Option<f64> {
        if self.up_to {
            self.up_to_percent
        } else {
            None
        }
    }

    /// The lift an exercise seeded from this block is logged against
    pub fn primary_lift_id(&self) -> Option<&str> {
        self.movements.first().map(|m| m.lift_id.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgramDay {
    pub id: String,
    pub name: String,
    pub blocks: Vec<ProgramBlock>,
}

impl ProgramDay {
    /// Blocks paired with their position-derived labels
    pub fn labeled_blocks(&self) -> impl Iterator<Item = (String, &ProgramBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(idx, block)| (block_label(idx), block))
    }

    /// Remove a block; the remaining blocks relabel from their new positions
    pub fn remove_block(&mut self, block_id: &str) -> Option<ProgramBlock> {
        let idx = self.blocks.iter().position(|b| b.id == block_id)?;
        Some(self.blocks.remove(idx))
    }

    pub fn block_position(&self, block_id: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == block_id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgramWeek {
    pub week_number: u32,
    pub days: Vec<ProgramDay>,
}

/// A multi-week program definition
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Program {
    pub id: String,
    pub name: String,
    pub duration_weeks: u32,
    pub weeks: Vec<ProgramWeek>,
}

impl Program {
    pub fn week(&self, week_number: u32) -> Option<&ProgramWeek> {
        self.weeks.iter().find(|w| w.week_number == week_number)
    }

    /// Locate a day anywhere in the program
    pub fn find_day(&self, day_id: &str) -> Option<(&ProgramWeek, &ProgramDay)> {
        self.weeks.iter().find_map(|week| {
            week.days
                .iter()
                .find(|d| d.id == day_id)
                .map(|day| (week, day))
        })
    }

    /// Locate a block and its display position within its day
    pub fn find_block(&self, block_id: &str) -> Option<(usize, &ProgramBlock)> {
        self.weeks
            .iter()
            .flat_map(|w| w.days.iter())
            .find_map(|day| {
                day.block_position(block_id)
                    .map(|pos| (pos, &day.blocks[pos]))
            })
    }
}

/// Display label for a block position: A..Z, then AA, AB, ...
pub fn block_label(index: usize) -> String {
    let mut label = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        label.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    label.reverse();
    String::from_utf8_lossy(&label).into_owned()
}

// ============================================================================
// Assignment Types
// ============================================================================

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Active,
    Completed,
    Paused,
}

/// A lifter's enrolment in a program
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgramAssignment {
    pub id: Uuid,
    pub user_id: String,
    pub program_id: String,
    pub status: AssignmentStatus,
    pub current_week_number: u32,
    pub current_cycle: u32,
    pub current_week_started_at: DateTime<Utc>,
    pub start_date: NaiveDate,
}

// ============================================================================
// Session Types
// ============================================================================

/// Set classification. Only working and AMRAP sets are maximal efforts.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SetType {
    Warmup,
    Working,
    Amrap,
    Backoff,
    Dropset,
}

impl SetType {
    pub fn counts_toward_records(self) -> bool {
        matches!(self, SetType::Working | SetType::Amrap)
    }
}

impl FromStr for SetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "warmup" => Ok(SetType::Warmup),
            "working" => Ok(SetType::Working),
            "amrap" => Ok(SetType::Amrap),
            "backoff" => Ok(SetType::Backoff),
            "dropset" => Ok(SetType::Dropset),
            other => Err(Error::Validation(format!("unknown set type '{}'", other))),
        }
    }
}

impl fmt::Display for SetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SetType::Warmup => "warmup",
            SetType::Working => "working",
            SetType::Amrap => "amrap",
            SetType::Backoff => "backoff",
            SetType::Dropset => "dropset",
        };
        f.pad(label)
    }
}

/// How a set felt
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Hard,
    Normal,
    Easy,
}

impl FromStr for Feedback {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hard" => Ok(Feedback::Hard),
            "normal" => Ok(Feedback::Normal),
            "easy" => Ok(Feedback::Easy),
            other => Err(Error::Validation(format!("unknown feedback '{}'", other))),
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Feedback::Hard => "hard",
            Feedback::Normal => "normal",
            Feedback::Easy => "easy",
        };
        f.pad(label)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

/// A set as persisted on the server
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoggedSet {
    pub id: Uuid,
    pub set_number: u32,
    pub weight: f64,
    pub reps: u32,
    pub rpe: Option<f32>,
    pub set_type: SetType,
    pub feedback: Option<Feedback>,
    pub logged_at: DateTime<Utc>,
}

/// Input for logging a set, before the server assigns id and ordinal
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NewSet {
    pub weight: f64,
    pub reps: u32,
    pub rpe: Option<f32>,
    pub set_type: SetType,
    pub feedback: Option<Feedback>,
}

impl NewSet {
    pub fn working(weight: f64, reps: u32) -> Self {
        Self {
            weight,
            reps,
            rpe: None,
            set_type: SetType::Working,
            feedback: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_weight(self.weight)?;
        validate_reps(self.reps)?;
        if let Some(rpe) = self.rpe {
            if !(1.0..=10.0).contains(&rpe) {
                return Err(Error::Validation(format!("RPE {} outside 1-10", rpe)));
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_weight(weight: f64) -> Result<()> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(Error::Validation(format!("invalid weight {}", weight)));
    }
    Ok(())
}

pub(crate) fn validate_reps(reps: u32) -> Result<()> {
    if reps == 0 {
        return Err(Error::Validation("reps must be at least 1".into()));
    }
    Ok(())
}

/// One lift performed within a session, usually seeded from a program block
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionExercise {
    pub id: Uuid,
    pub lift_id: String,
    pub program_block_id: Option<String>,
    /// Position of the originating block within its day
    pub block_order: Option<u32>,
    pub sets: Vec<LoggedSet>,
}

impl SessionExercise {
    pub fn next_set_number(&self) -> u32 {
        self.sets.iter().map(|s| s.set_number).max().unwrap_or(0) + 1
    }
}

/// A training session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: String,
    pub program_day_id: Option<String>,
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub exercises: Vec<SessionExercise>,
}

impl Session {
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Order exercises by originating block (ad-hoc ones last, in insertion
    /// order) and sets by set number
    pub fn sort_for_display(&mut self) {
        self.exercises
            .sort_by_key(|e| (e.block_order.is_none(), e.block_order));
        for exercise in &mut self.exercises {
            exercise.sets.sort_by_key(|s| s.set_number);
        }
    }

    pub fn exercise(&self, exercise_id: Uuid) -> Option<&SessionExercise> {
        self.exercises.iter().find(|e| e.id == exercise_id)
    }
}

// ============================================================================
// Session Views
// ============================================================================

/// A movement of an exercise, resolved against the catalog
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MovementDetail {
    pub lift_id: String,
    pub lift_name: String,
    pub reps: Option<u32>,
}

/// An exercise annotated with everything a client needs to drive it
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseDetail {
    pub exercise: SessionExercise,
    pub lift_name: String,
    pub category: LiftCategory,
    pub target_sets: u32,
    pub target_reps: u32,
    pub up_to_percent: Option<f64>,
    /// Resolved through the lift's canonical parent
    pub one_rep_max: Option<f64>,
    pub movements: Vec<MovementDetail>,
}

/// The in-progress session with annotated exercises
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActiveSession {
    pub session_id: Uuid,
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub program_day_id: Option<String>,
    pub exercises: Vec<ExerciseDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_labels() {
        assert_eq!(block_label(0), "A");
        assert_eq!(block_label(2), "C");
        assert_eq!(block_label(25), "Z");
        assert_eq!(block_label(26), "AA");
        assert_eq!(block_label(27), "AB");
    }

    fn block(id: &str) -> ProgramBlock {
        ProgramBlock {
            id: id.into(),
            sets: 3,
            reps: 5,
            up_to: false,
            up_to_percent: None,
            up_to_rpe: None,
            notes: None,
            movements: vec![],
        }
    }

    #[test]
    fn test_labels_rederived_after_removal() {
        let mut day = ProgramDay {
            id: "d1".into(),
            name: "Day 1".into(),
            blocks: vec![block("x"), block("y"), block("z")],
        };

        assert!(day.remove_block("x").is_some());
        let labels: Vec<_> = day
            .labeled_blocks()
            .map(|(label, b)| (label, b.id.clone()))
            .collect();
        assert_eq!(
            labels,
            vec![("A".to_string(), "y".to_string()), ("B".to_string(), "z".to_string())]
        );
        assert!(day.remove_block("missing").is_none());
    }

    #[test]
    fn test_canonical_id() {
        let variation = Lift {
            id: "power_snatch".into(),
            name: "Power Snatch".into(),
            category: LiftCategory::Olympic,
            parent_lift_id: Some("snatch".into()),
            is_core: true,
        };
        assert_eq!(variation.canonical_id(), "snatch");

        let canonical = Lift {
            parent_lift_id: None,
            ..variation
        };
        assert_eq!(canonical.canonical_id(), "power_snatch");
    }

    #[test]
    fn test_only_working_and_amrap_count() {
        assert!(SetType::Working.counts_toward_records());
        assert!(SetType::Amrap.counts_toward_records());
        assert!(!SetType::Warmup.counts_toward_records());
        assert!(!SetType::Backoff.counts_toward_records());
        assert!(!SetType::Dropset.counts_toward_records());
    }

    #[test]
    fn test_enum_parsing_rejects_unknown() {
        assert_eq!("AMRAP".parse::<SetType>().unwrap(), SetType::Amrap);
        assert_eq!("hard".parse::<Feedback>().unwrap(), Feedback::Hard);
        assert!(matches!(
            "heavy".parse::<SetType>(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            "brutal".parse::<Feedback>(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_new_set_validation() {
        assert!(NewSet::working(100.0, 5).validate().is_ok());
        assert!(NewSet::working(0.0, 5).validate().is_ok());
        assert!(NewSet::working(-5.0, 5).validate().is_err());
        assert!(NewSet::working(f64::NAN, 5).validate().is_err());
        assert!(NewSet::working(100.0, 0).validate().is_err());

        let mut set = NewSet::working(100.0, 3);
        set.rpe = Some(11.0);
        assert!(set.validate().is_err());
    }
}

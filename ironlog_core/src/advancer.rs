//! Program assignment lifecycle and week/cycle advancement.
//!
//! The only automatic transition is `active -> active`: the current week
//! rolls forward once every day in it has been completed since the week
//! began, wrapping into a new cycle after the final week. Completing or
//! pausing an assignment always takes an explicit call.

use crate::store::Database;
use crate::{
    AssignmentStatus, Error, Program, ProgramAssignment, Result, Session, SessionStatus,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Result of an advancement attempt
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Advancement {
    pub advanced: bool,
    pub new_week_number: Option<u32>,
    pub new_cycle: Option<u32>,
}

/// Roll the assignment forward if its current week is fully complete
///
/// `completed_day_ids` holds days the lifter completed strictly after
/// `current_week_started_at`. Calling this with an incomplete week is a
/// no-op, so it is safe to invoke after every session.
pub fn advance_week_if_complete(
    assignment: &mut ProgramAssignment,
    program: &Program,
    completed_day_ids: &HashSet<String>,
    now: DateTime<Utc>,
) -> Advancement {
    let Some(week) = program.week(assignment.current_week_number) else {
        tracing::warn!(
            "Assignment {} points at missing week {} of {}",
            assignment.id,
            assignment.current_week_number,
            program.id
        );
        return Advancement::default();
    };

    let missing: Vec<&str> = week
        .days
        .iter()
        .map(|d| d.id.as_str())
        .filter(|id| !completed_day_ids.contains(*id))
        .collect();
    if !missing.is_empty() {
        tracing::debug!(
            "Week {} not complete, {} day(s) outstanding",
            week.week_number,
            missing.len()
        );
        return Advancement::default();
    }

    if assignment.current_week_number < program.duration_weeks {
        assignment.current_week_number += 1;
    } else {
        assignment.current_week_number = 1;
        assignment.current_cycle += 1;
    }
    assignment.current_week_started_at = now;

    tracing::info!(
        "Advanced {} on {} to week {} cycle {}",
        assignment.user_id,
        program.id,
        assignment.current_week_number,
        assignment.current_cycle
    );

    Advancement {
        advanced: true,
        new_week_number: Some(assignment.current_week_number),
        new_cycle: Some(assignment.current_cycle),
    }
}

/// Program days the lifter completed strictly after `since`
pub fn completed_day_ids(
    sessions: &[Session],
    user_id: &str,
    since: DateTime<Utc>,
) -> HashSet<String> {
    sessions
        .iter()
        .filter(|s| s.user_id == user_id && s.status == SessionStatus::Completed)
        .filter(|s| s.completed_at.is_some_and(|at| at > since))
        .filter_map(|s| s.program_day_id.clone())
        .collect()
}

pub fn active_assignment<'a>(db: &'a Database, user_id: &str) -> Option<&'a ProgramAssignment> {
    db.assignments
        .iter()
        .find(|a| a.user_id == user_id && a.status == AssignmentStatus::Active)
}

fn active_assignment_mut<'a>(
    db: &'a mut Database,
    user_id: &str,
) -> Result<&'a mut ProgramAssignment> {
    db.assignments
        .iter_mut()
        .find(|a| a.user_id == user_id && a.status == AssignmentStatus::Active)
        .ok_or_else(|| Error::NotFound(format!("no active program for {}", user_id)))
}

fn complete_active(db: &mut Database, user_id: &str) {
    for assignment in db
        .assignments
        .iter_mut()
        .filter(|a| a.user_id == user_id && a.status == AssignmentStatus::Active)
    {
        assignment.status = AssignmentStatus::Completed;
        tracing::info!("Completed assignment {} ({})", assignment.id, assignment.program_id);
    }
}

/// Enrol a lifter in a program, replacing whatever was active
///
/// Completes the active assignment, drops any stale row for the same
/// program, then inserts a fresh one at week 1 cycle 1.
pub fn assign_program(
    db: &mut Database,
    user_id: &str,
    program_id: &str,
    start_date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<ProgramAssignment> {
    db.program(program_id)?;

    complete_active(db, user_id);
    db.assignments
        .retain(|a| !(a.user_id == user_id && a.program_id == program_id));

    let assignment = ProgramAssignment {
        id: Uuid::new_v4(),
        user_id: user_id.into(),
        program_id: program_id.into(),
        status: AssignmentStatus::Active,
        current_week_number: 1,
        current_cycle: 1,
        current_week_started_at: now,
        start_date,
    };
    db.assignments.push(assignment.clone());

    tracing::info!("Assigned {} to {}", program_id, user_id);
    Ok(assignment)
}

/// active -> completed
pub fn unassign_program(db: &mut Database, user_id: &str) -> Result<ProgramAssignment> {
    let assignment = active_assignment_mut(db, user_id)?;
    assignment.status = AssignmentStatus::Completed;
    tracing::info!("Unassigned {} from {}", user_id, assignment.program_id);
    Ok(assignment.clone())
}

/// active -> paused
pub fn pause_assignment(db: &mut Database, user_id: &str) -> Result<ProgramAssignment> {
    let assignment = active_assignment_mut(db, user_id)?;
    assignment.status = AssignmentStatus::Paused;
    tracing::info!("Paused {} for {}", assignment.program_id, user_id);
    Ok(assignment.clone())
}

/// paused -> active, completing any other active assignment
pub fn resume_assignment(
    db: &mut Database,
    user_id: &str,
    program_id: &str,
) -> Result<ProgramAssignment> {
    let idx = db
        .assignments
        .iter()
        .position(|a| {
            a.user_id == user_id
                && a.program_id == program_id
                && a.status == AssignmentStatus::Paused
        })
        .ok_or_else(|| Error::NotFound(format!("no paused assignment for {}", program_id)))?;

    complete_active(db, user_id);
    let assignment = &mut db.assignments[idx];
    assignment.status = AssignmentStatus::Active;
    tracing::info!("Resumed {} for {}", program_id, user_id);
    Ok(assignment.clone())
}

/// Advance the lifter's active assignment after a session completes
///
/// Only sessions tied to a day of the active program count.
pub fn advance_after_completion(
    db: &mut Database,
    user_id: &str,
    program_day_id: &str,
    now: DateTime<Utc>,
) -> Result<Advancement> {
    let Some(program_id) = active_assignment(db, user_id).map(|a| a.program_id.clone()) else {
        tracing::debug!("No active assignment for {}, nothing to advance", user_id);
        return Ok(Advancement::default());
    };

    let program = db.program(&program_id)?.clone();
    if program.find_day(program_day_id).is_none() {
        tracing::debug!("Day {} is not part of {}", program_day_id, program_id);
        return Ok(Advancement::default());
    }

    let since = active_assignment_mut(db, user_id)?.current_week_started_at;
    let completed = completed_day_ids(&db.sessions, user_id, since);
    let assignment = active_assignment_mut(db, user_id)?;
    Ok(advance_week_if_complete(assignment, &program, &completed, now))
}

/// First day of the current week not yet completed since the week began
pub fn next_program_day(db: &Database, user_id: &str) -> Result<Option<String>> {
    let Some(assignment) = active_assignment(db, user_id) else {
        return Ok(None);
    };
    let program = db.program(&assignment.program_id)?;
    let completed = completed_day_ids(&db.sessions, user_id, assignment.current_week_started_at);

    Ok(program
        .week(assignment.current_week_number)
        .and_then(|week| week.days.iter().find(|d| !completed.contains(&d.id)))
        .map(|d| d.id.clone()))
}

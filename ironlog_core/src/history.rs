//! Completed-session history.
//!
//! Completed sessions are immutable. These queries present them the way a
//! lifter reviews them: newest first, exercises in block order, sets in
//! logging order.

use crate::{LoggedSet, Session};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the lifter did on a program block last time
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PreviousPerformance {
    pub session_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub sets: Vec<LoggedSet>,
}

/// A lifter's completed sessions, newest first, ordered for display
pub fn completed_sessions(sessions: &[Session], user_id: &str) -> Vec<Session> {
    let mut completed: Vec<Session> = sessions
        .iter()
        .filter(|s| s.user_id == user_id && s.is_completed())
        .cloned()
        .collect();

    for session in &mut completed {
        session.sort_for_display();
    }
    completed.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));

    tracing::debug!("Found {} completed sessions for {}", completed.len(), user_id);
    completed
}

/// Sets from the most recent completed session that trained `program_block_id`
///
/// Only sessions completed within `recent_days` of `now` are considered.
pub fn previous_performance(
    sessions: &[Session],
    user_id: &str,
    program_block_id: &str,
    exclude_session_id: Option<Uuid>,
    now: DateTime<Utc>,
    recent_days: i64,
) -> Option<PreviousPerformance> {
    let cutoff = now - Duration::days(recent_days);

    sessions
        .iter()
        .filter(|s| s.user_id == user_id && Some(s.id) != exclude_session_id)
        .filter_map(|s| s.completed_at.filter(|at| *at >= cutoff).map(|at| (s, at)))
        .filter_map(|(s, at)| {
            let exercise = s
                .exercises
                .iter()
                .find(|e| e.program_block_id.as_deref() == Some(program_block_id))?;
            Some((s.id, at, exercise))
        })
        .max_by_key(|(_, at, _)| *at)
        .map(|(session_id, completed_at, exercise)| {
            let mut sets = exercise.sets.clone();
            sets.sort_by_key(|s| s.set_number);
            PreviousPerformance {
                session_id,
                completed_at,
                sets,
            }
        })
}

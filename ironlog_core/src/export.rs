//! CSV export of completed training history.
//!
//! One row per logged set. The rows carry every id and ordinal needed to
//! rebuild the sessions they came from, so an export can be read back
//! without loss.

use crate::{Error, Feedback, LoggedSet, Result, Session, SessionExercise, SessionStatus, SetType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// A row in the history CSV
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HistoryRow {
    pub session_id: Uuid,
    pub user_id: String,
    pub title: String,
    pub program_day_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub exercise_id: Uuid,
    pub lift_id: String,
    pub program_block_id: Option<String>,
    pub block_order: Option<u32>,
    pub set_id: Uuid,
    pub set_number: u32,
    pub weight: f64,
    pub reps: u32,
    pub rpe: Option<f32>,
    pub set_type: SetType,
    pub feedback: Option<Feedback>,
    pub logged_at: DateTime<Utc>,
}

/// Flatten completed sessions into rows, in display order
pub fn history_rows(sessions: &[Session]) -> Vec<HistoryRow> {
    let mut rows = Vec::new();
    for session in sessions {
        let Some(completed_at) = session.completed_at.filter(|_| session.is_completed()) else {
            continue;
        };
        let mut session = session.clone();
        session.sort_for_display();

        for exercise in &session.exercises {
            for set in &exercise.sets {
                rows.push(HistoryRow {
                    session_id: session.id,
                    user_id: session.user_id.clone(),
                    title: session.title.clone(),
                    program_day_id: session.program_day_id.clone(),
                    started_at: session.started_at,
                    completed_at,
                    exercise_id: exercise.id,
                    lift_id: exercise.lift_id.clone(),
                    program_block_id: exercise.program_block_id.clone(),
                    block_order: exercise.block_order,
                    set_id: set.id,
                    set_number: set.set_number,
                    weight: set.weight,
                    reps: set.reps,
                    rpe: set.rpe,
                    set_type: set.set_type,
                    feedback: set.feedback,
                    logged_at: set.logged_at,
                });
            }
        }
    }
    rows
}

/// Write every set of the completed sessions to `path`, replacing it
///
/// Returns the number of rows written.
pub fn export_history_csv(sessions: &[Session], path: &Path) -> Result<usize> {
    let rows = history_rows(sessions);

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(temp.as_file());
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    drop(writer);

    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::info!("Exported {} sets to {:?}", rows.len(), path);
    Ok(rows.len())
}

/// Read an exported history file
pub fn read_history_csv(path: &Path) -> Result<Vec<HistoryRow>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: HistoryRow = result?;
        rows.push(row);
    }
    tracing::debug!("Read {} rows from {:?}", rows.len(), path);
    Ok(rows)
}

/// Rebuild completed sessions from exported rows, in first-seen order
pub fn sessions_from_rows(rows: Vec<HistoryRow>) -> Vec<Session> {
    let mut sessions: Vec<Session> = Vec::new();

    for row in rows {
        let idx = match sessions.iter().position(|s| s.id == row.session_id) {
            Some(idx) => idx,
            None => {
                sessions.push(Session {
                    id: row.session_id,
                    user_id: row.user_id.clone(),
                    program_day_id: row.program_day_id.clone(),
                    title: row.title.clone(),
                    started_at: row.started_at,
                    completed_at: Some(row.completed_at),
                    status: SessionStatus::Completed,
                    exercises: Vec::new(),
                });
                sessions.len() - 1
            }
        };
        let session = &mut sessions[idx];

        let exercise_idx = match session.exercises.iter().position(|e| e.id == row.exercise_id) {
            Some(i) => i,
            None => {
                session.exercises.push(SessionExercise {
                    id: row.exercise_id,
                    lift_id: row.lift_id.clone(),
                    program_block_id: row.program_block_id.clone(),
                    block_order: row.block_order,
                    sets: Vec::new(),
                });
                session.exercises.len() - 1
            }
        };

        session.exercises[exercise_idx].sets.push(LoggedSet {
            id: row.set_id,
            set_number: row.set_number,
            weight: row.weight,
            reps: row.reps,
            rpe: row.rpe,
            set_type: row.set_type,
            feedback: row.feedback,
            logged_at: row.logged_at,
        });
    }

    sessions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn logged(number: u32, weight: f64, feedback: Option<Feedback>) -> LoggedSet {
        LoggedSet {
            id: Uuid::new_v4(),
            set_number: number,
            weight,
            reps: 2,
            rpe: if number == 1 { None } else { Some(8.5) },
            set_type: if number == 1 { SetType::Warmup } else { SetType::Working },
            feedback,
            logged_at: Utc::now(),
        }
    }

    fn completed_session() -> Session {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4(),
            user_id: "alice".into(),
            program_day_id: Some("oly_base_w1_d1".into()),
            title: "Snatch, squat".into(),
            started_at: now - Duration::hours(1),
            completed_at: Some(now),
            status: SessionStatus::Completed,
            exercises: vec![
                SessionExercise {
                    id: Uuid::new_v4(),
                    lift_id: "power_snatch".into(),
                    program_block_id: Some("oly_base_w1_d1_a".into()),
                    block_order: Some(0),
                    sets: vec![
                        logged(1, 40.0, None),
                        logged(2, 55.5, Some(Feedback::Hard)),
                    ],
                },
                SessionExercise {
                    id: Uuid::new_v4(),
                    lift_id: "pull_up".into(),
                    program_block_id: None,
                    block_order: None,
                    sets: vec![logged(1, 0.0, Some(Feedback::Easy))],
                },
            ],
        }
    }

    #[test]
    fn test_export_and_read_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("history.csv");
        let session = completed_session();

        let mut open = completed_session();
        open.status = SessionStatus::InProgress;
        open.completed_at = None;

        let count = export_history_csv(&[session.clone(), open], &path).unwrap();
        assert_eq!(count, 3);

        let rows = read_history_csv(&path).unwrap();
        assert_eq!(rows, history_rows(&[session.clone()]));
        assert_eq!(sessions_from_rows(rows), vec![session]);
    }

    #[test]
    fn test_export_replaces_existing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("history.csv");
        std::fs::write(&path, "stale").unwrap();

        let count = export_history_csv(&[], &path).unwrap();
        assert_eq!(count, 0);
        assert!(read_history_csv(&path).unwrap().is_empty());
    }
}

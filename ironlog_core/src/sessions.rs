//! Session lifecycle: the operations a client drives a workout through.
//!
//! Every call is one store transaction, so it either applies completely or
//! not at all. Lookups are always scoped to the requesting lifter; another
//! lifter's session is indistinguishable from a missing one.

use crate::advancer::{self, Advancement};
use crate::draft::PendingSet;
use crate::history::{self, PreviousPerformance};
use crate::progression::{target_weight, ExerciseProgress, Planner, SetOutcome, Suggestion};
use crate::records::{self, PrCandidate, PrCheck, RecordStore};
use crate::store::{Database, Store};
use crate::{
    ActiveSession, Config, Error, ExerciseDetail, Lift, LoggedSet, MovementDetail, NewSet,
    PersonalRecord, Program, ProgramAssignment, RecordSource, Result, Session, SessionExercise,
    SessionStatus,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Result of logging a single set
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SetLogged {
    pub set: LoggedSet,
    pub is_pr: bool,
    pub previous_best: Option<f64>,
}

/// A PR struck during a batch upload
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PrNotice {
    pub lift_name: String,
    pub weight: f64,
    pub reps: u32,
    pub previous_best: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BatchUpload {
    pub uploaded: usize,
    /// In submission order, oldest set first
    pub prs: Vec<PrNotice>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Completion {
    pub session: Session,
    pub advanced: bool,
    pub new_week_number: Option<u32>,
    pub new_cycle: Option<u32>,
}

/// Planner output plus last time's numbers on the same block
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WeightSuggestions {
    pub exercise_id: Uuid,
    pub lift_name: String,
    pub suggestion: Suggestion,
    pub previous: Option<PreviousPerformance>,
}

/// Front door to the engine, bound to one store
#[derive(Clone, Debug)]
pub struct Engine {
    store: Store,
    planner: Planner,
    recent_days: i64,
}

impl Engine {
    pub fn new(store: Store, config: &Config) -> Self {
        Self {
            store,
            planner: Planner::from_config(config),
            recent_days: config.history.recent_days,
        }
    }

    /// Engine over the store in the configured data directory
    pub fn open(config: &Config) -> Self {
        Self::new(Store::open(&config.data.data_dir), config)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Open a new session, seeded with one exercise per block of the day
    ///
    /// Fails with `Conflict` while the lifter has another session open.
    pub fn start_session(
        &self,
        user_id: &str,
        program_day_id: Option<&str>,
        title: Option<&str>,
    ) -> Result<Session> {
        self.start_session_at(user_id, program_day_id, title, Utc::now())
    }

    pub fn start_session_at(
        &self,
        user_id: &str,
        program_day_id: Option<&str>,
        title: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        if title.is_some_and(|t| t.trim().is_empty()) {
            return Err(Error::Validation("title must not be blank".into()));
        }

        self.store.transaction(|db| {
            if let Some(active) = db.active_session(user_id) {
                return Err(Error::Conflict(format!(
                    "session {} is already in progress",
                    active.id
                )));
            }

            let (default_title, exercises) = match program_day_id {
                Some(day_id) => {
                    let (_, _, day) = db
                        .find_day(day_id)
                        .ok_or_else(|| Error::not_found("program day", day_id))?;
                    let mut exercises = Vec::with_capacity(day.blocks.len());
                    for (position, block) in day.blocks.iter().enumerate() {
                        let Some(lift_id) = block.primary_lift_id() else {
                            continue;
                        };
                        db.lift(lift_id)?;
                        exercises.push(SessionExercise {
                            id: Uuid::new_v4(),
                            lift_id: lift_id.into(),
                            program_block_id: Some(block.id.clone()),
                            block_order: Some(position as u32),
                            sets: Vec::new(),
                        });
                    }
                    (day.name.clone(), exercises)
                }
                None => ("Workout".to_string(), Vec::new()),
            };

            let session = Session {
                id: Uuid::new_v4(),
                user_id: user_id.into(),
                program_day_id: program_day_id.map(Into::into),
                title: title.map(|t| t.trim().to_string()).unwrap_or(default_title),
                started_at: now,
                completed_at: None,
                status: SessionStatus::InProgress,
                exercises,
            };
            db.sessions.push(session.clone());

            tracing::info!(
                "Started session {} for {} ({} exercises)",
                session.id,
                user_id,
                session.exercises.len()
            );
            Ok(session)
        })
    }

    /// The open session with every exercise annotated for display
    pub fn active_session(&self, user_id: &str) -> Result<Option<ActiveSession>> {
        self.store.read(|db| {
            db.active_session(user_id)
                .map(|session| annotate(db, session))
                .transpose()
        })
    }

    /// Add an exercise, optionally tied to a block of the session's program day
    pub fn add_exercise(
        &self,
        user_id: &str,
        session_id: Uuid,
        lift_id: &str,
        program_block_id: Option<&str>,
    ) -> Result<SessionExercise> {
        self.store.transaction(|db| {
            db.lift(lift_id)?;
            let block_order = match program_block_id {
                Some(block_id) => {
                    if db.find_block(block_id).is_none() {
                        return Err(Error::not_found("program block", block_id));
                    }
                    let session = db.session(user_id, session_id)?;
                    let position = session
                        .program_day_id
                        .as_deref()
                        .and_then(|day_id| db.find_day(day_id))
                        .and_then(|(_, _, day)| day.block_position(block_id))
                        .ok_or_else(|| {
                            Error::Validation(format!(
                                "block {} is not part of this session's program day",
                                block_id
                            ))
                        })?;
                    Some(position as u32)
                }
                None => None,
            };

            let session = db.open_session_mut(user_id, session_id)?;
            let exercise = SessionExercise {
                id: Uuid::new_v4(),
                lift_id: lift_id.into(),
                program_block_id: program_block_id.map(Into::into),
                block_order,
                sets: Vec::new(),
            };
            session.exercises.push(exercise.clone());

            tracing::info!("Added {} to session {}", lift_id, session_id);
            Ok(exercise)
        })
    }

    /// Persist one set and check it for a PR
    ///
    /// PR bookkeeping is best-effort: if it fails the set is still kept and
    /// the failure is logged.
    pub fn log_set(
        &self,
        user_id: &str,
        session_id: Uuid,
        exercise_id: Uuid,
        set: NewSet,
    ) -> Result<SetLogged> {
        set.validate()?;
        self.store.transaction(|db| {
            let (logged, lift_id) = insert_set(db, user_id, session_id, exercise_id, &set)?;
            let check = detect_pr(db, user_id, &lift_id, &logged);
            Ok(SetLogged {
                set: logged,
                is_pr: check.is_some_and(|c| c.is_pr),
                previous_best: check.and_then(|c| c.previous_best),
            })
        })
    }

    /// Persist a batch of locally logged sets in submission order
    ///
    /// The whole batch is validated before anything is written and is
    /// rejected as a unit if any set targets an unknown exercise.
    pub fn batch_upload_sets(
        &self,
        user_id: &str,
        session_id: Uuid,
        sets: &[PendingSet],
    ) -> Result<BatchUpload> {
        let inputs: Vec<(Uuid, NewSet)> = sets
            .iter()
            .map(|p| {
                let set = NewSet {
                    weight: p.weight,
                    reps: p.reps,
                    rpe: p.rpe,
                    set_type: p.set_type,
                    feedback: p.feedback,
                };
                set.validate().map(|_| (p.exercise_id, set))
            })
            .collect::<Result<_>>()?;

        self.store.transaction(|db| {
            let mut prs = Vec::new();
            for (exercise_id, set) in &inputs {
                let (logged, lift_id) = insert_set(db, user_id, session_id, *exercise_id, set)?;
                let Some(check) = detect_pr(db, user_id, &lift_id, &logged) else {
                    continue;
                };
                if check.is_pr {
                    prs.push(PrNotice {
                        lift_name: db.lift(&lift_id).map(|l| l.name.clone())?,
                        weight: logged.weight,
                        reps: logged.reps,
                        previous_best: check.previous_best,
                    });
                }
            }

            tracing::info!(
                "Uploaded {} sets to session {} ({} PRs)",
                inputs.len(),
                session_id,
                prs.len()
            );
            Ok(BatchUpload {
                uploaded: inputs.len(),
                prs,
            })
        })
    }

    /// Remove the highest-numbered set of an exercise, retracting any PR it set
    pub fn undo_last_set(
        &self,
        user_id: &str,
        session_id: Uuid,
        exercise_id: Uuid,
    ) -> Result<Option<LoggedSet>> {
        self.store.transaction(|db| {
            let session = db.open_session_mut(user_id, session_id)?;
            let exercise = session
                .exercises
                .iter_mut()
                .find(|e| e.id == exercise_id)
                .ok_or_else(|| Error::not_found("exercise", exercise_id))?;

            let Some(idx) = exercise
                .sets
                .iter()
                .enumerate()
                .max_by_key(|(_, s)| s.set_number)
                .map(|(i, _)| i)
            else {
                return Ok(None);
            };
            let removed = exercise.sets.remove(idx);

            records::retract_set_records(db, user_id, removed.id);
            tracing::info!(
                "Undid set {} ({} x {}) in session {}",
                removed.set_number,
                removed.weight,
                removed.reps,
                session_id
            );
            Ok(Some(removed))
        })
    }

    /// Close a session and advance the lifter's program if the week is done
    pub fn complete_session(&self, user_id: &str, session_id: Uuid) -> Result<Completion> {
        self.complete_session_at(user_id, session_id, Utc::now())
    }

    pub fn complete_session_at(
        &self,
        user_id: &str,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Completion> {
        self.store.transaction(|db| {
            let session = db.open_session_mut(user_id, session_id)?;
            session.status = SessionStatus::Completed;
            session.completed_at = Some(now);
            session.sort_for_display();
            let session = session.clone();

            tracing::info!("Completed session {} for {}", session_id, user_id);

            let advancement = match &session.program_day_id {
                Some(day_id) => advancer::advance_after_completion(db, user_id, day_id, now)?,
                None => Advancement::default(),
            };

            Ok(Completion {
                session,
                advanced: advancement.advanced,
                new_week_number: advancement.new_week_number,
                new_cycle: advancement.new_cycle,
            })
        })
    }

    /// Hard-delete an open session along with the records its sets produced
    ///
    /// Completed sessions are history and report `NotFound`.
    pub fn discard_session(&self, user_id: &str, session_id: Uuid) -> Result<Session> {
        self.store.transaction(|db| {
            let idx = db
                .sessions
                .iter()
                .position(|s| s.id == session_id && s.user_id == user_id && !s.is_completed())
                .ok_or_else(|| Error::not_found("open session", session_id))?;
            let session = db.sessions.remove(idx);

            let retracted: usize = session
                .exercises
                .iter()
                .flat_map(|e| e.sets.iter())
                .map(|s| records::retract_set_records(db, user_id, s.id))
                .sum();

            tracing::info!(
                "Discarded session {} for {} ({} records retracted)",
                session_id,
                user_id,
                retracted
            );
            Ok(session)
        })
    }

    /// Planner output for the next set of an exercise
    ///
    /// The block start carries over from the exercise before it in the
    /// session, in display order.
    pub fn weight_suggestions(
        &self,
        user_id: &str,
        session_id: Uuid,
        exercise_id: Uuid,
    ) -> Result<WeightSuggestions> {
        self.store.read(|db| {
            let session = db.session(user_id, session_id)?;
            let view = annotate(db, session)?;

            let idx = view
                .exercises
                .iter()
                .position(|e| e.exercise.id == exercise_id)
                .ok_or_else(|| Error::not_found("exercise", exercise_id))?;
            let current = &view.exercises[idx];
            let previous = idx
                .checked_sub(1)
                .map(|i| progress_of(&view.exercises[i]));

            let suggestion = self.planner.suggest(previous.as_ref(), &progress_of(current));
            let previous_performance = current.exercise.program_block_id.as_deref().and_then(|block_id| {
                history::previous_performance(
                    &db.sessions,
                    user_id,
                    block_id,
                    Some(session_id),
                    Utc::now(),
                    self.recent_days,
                )
            });

            Ok(WeightSuggestions {
                exercise_id,
                lift_name: current.lift_name.clone(),
                suggestion,
                previous: previous_performance,
            })
        })
    }

    pub fn completed_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        self.store
            .read(|db| Ok(history::completed_sessions(&db.sessions, user_id)))
    }

    /// Write the lifter's completed history to a CSV file
    pub fn export_history(&self, user_id: &str, path: &Path) -> Result<usize> {
        let sessions = self.completed_sessions(user_id)?;
        crate::export::export_history_csv(&sessions, path)
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    pub fn lifts(&self) -> Result<Vec<Lift>> {
        self.store.read(|db| Ok(db.lifts.values().cloned().collect()))
    }

    pub fn programs(&self) -> Result<Vec<Program>> {
        self.store.read(|db| Ok(db.programs.values().cloned().collect()))
    }

    // ------------------------------------------------------------------
    // Assignments
    // ------------------------------------------------------------------

    pub fn assign_program(
        &self,
        user_id: &str,
        program_id: &str,
        start_date: NaiveDate,
    ) -> Result<ProgramAssignment> {
        self.store.transaction(|db| {
            advancer::assign_program(db, user_id, program_id, start_date, Utc::now())
        })
    }

    pub fn unassign_program(&self, user_id: &str) -> Result<ProgramAssignment> {
        self.store
            .transaction(|db| advancer::unassign_program(db, user_id))
    }

    pub fn pause_assignment(&self, user_id: &str) -> Result<ProgramAssignment> {
        self.store
            .transaction(|db| advancer::pause_assignment(db, user_id))
    }

    pub fn resume_assignment(&self, user_id: &str, program_id: &str) -> Result<ProgramAssignment> {
        self.store
            .transaction(|db| advancer::resume_assignment(db, user_id, program_id))
    }

    pub fn active_assignment(&self, user_id: &str) -> Result<Option<ProgramAssignment>> {
        self.store
            .read(|db| Ok(advancer::active_assignment(db, user_id).cloned()))
    }

    pub fn next_program_day(&self, user_id: &str) -> Result<Option<String>> {
        self.store
            .read(|db| advancer::next_program_day(db, user_id))
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    pub fn record_manual(
        &self,
        user_id: &str,
        lift_id: &str,
        weight: f64,
        reps: u32,
        source: RecordSource,
        date: DateTime<Utc>,
    ) -> Result<PersonalRecord> {
        self.store.transaction(|db| {
            db.lift(lift_id)?;
            records::record_manual(db, user_id, lift_id, weight, reps, source, date)
        })
    }

    pub fn delete_manual_record(&self, user_id: &str, record_id: Uuid) -> Result<PersonalRecord> {
        self.store
            .transaction(|db| records::delete_manual_record(db, user_id, record_id))
    }

    pub fn current_best(&self, user_id: &str, lift_id: &str, reps: u32) -> Result<Option<PersonalRecord>> {
        self.store
            .read(|db| Ok(db.current_best(user_id, lift_id, reps).cloned()))
    }

    pub fn records_for(&self, user_id: &str, lift_id: &str) -> Result<Vec<PersonalRecord>> {
        self.store.read(|db| Ok(db.records_for(user_id, lift_id)))
    }

    pub fn bests_by_reps(&self, user_id: &str, lift_id: &str) -> Result<Vec<PersonalRecord>> {
        self.store.read(|db| Ok(db.bests_by_reps(user_id, lift_id)))
    }

    /// Every record the lifter owns, oldest first
    pub fn all_records(&self, user_id: &str) -> Result<Vec<PersonalRecord>> {
        self.store.read(|db| {
            let mut all: Vec<PersonalRecord> = db
                .records()
                .iter()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect();
            all.sort_by_key(|r| r.date);
            Ok(all)
        })
    }
}

/// Append a set with the next server-assigned ordinal
fn insert_set(
    db: &mut Database,
    user_id: &str,
    session_id: Uuid,
    exercise_id: Uuid,
    set: &NewSet,
) -> Result<(LoggedSet, String)> {
    let session = db.open_session_mut(user_id, session_id)?;
    let exercise = session
        .exercises
        .iter_mut()
        .find(|e| e.id == exercise_id)
        .ok_or_else(|| Error::not_found("exercise", exercise_id))?;

    let logged = LoggedSet {
        id: Uuid::new_v4(),
        set_number: exercise.next_set_number(),
        weight: set.weight,
        reps: set.reps,
        rpe: set.rpe,
        set_type: set.set_type,
        feedback: set.feedback,
        logged_at: Utc::now(),
    };
    exercise.sets.push(logged.clone());

    tracing::debug!(
        "Logged set {} on {}: {} x {} ({})",
        logged.set_number,
        exercise.lift_id,
        logged.weight,
        logged.reps,
        logged.set_type
    );
    Ok((logged, exercise.lift_id.clone()))
}

/// PR check for a freshly inserted set; failures are logged, never raised
fn detect_pr(db: &mut Database, user_id: &str, lift_id: &str, set: &LoggedSet) -> Option<PrCheck> {
    let candidate = PrCandidate {
        user_id,
        lift_id,
        weight: set.weight,
        reps: set.reps,
        session_set_id: Some(set.id),
        date: set.logged_at,
    };
    match records::check_set(db, set.set_type, &candidate) {
        Ok(check) => check,
        Err(e) => {
            tracing::warn!("PR check failed for set {}: {}", set.id, e);
            None
        }
    }
}

/// Resolve a session's exercises against the catalog and the lifter's 1RMs
fn annotate(db: &Database, session: &Session) -> Result<ActiveSession> {
    let mut session = session.clone();
    session.sort_for_display();

    let exercises = session
        .exercises
        .into_iter()
        .map(|exercise| {
            let lift = db.lift(&exercise.lift_id)?;
            let block = exercise
                .program_block_id
                .as_deref()
                .and_then(|id| db.find_block(id))
                .map(|(_, block)| block);

            let movements = match block {
                Some(block) => block
                    .movements
                    .iter()
                    .map(|m| {
                        Ok(MovementDetail {
                            lift_id: m.lift_id.clone(),
                            lift_name: db.lift(&m.lift_id)?.name.clone(),
                            reps: m.reps,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
                None => vec![MovementDetail {
                    lift_id: lift.id.clone(),
                    lift_name: lift.name.clone(),
                    reps: None,
                }],
            };

            Ok(ExerciseDetail {
                lift_name: lift.name.clone(),
                category: lift.category,
                target_sets: block.map_or(1, |b| b.sets),
                target_reps: block.map_or(1, |b| b.reps),
                up_to_percent: block.and_then(|b| b.intensity_percent()),
                one_rep_max: db.one_rep_max(&session.user_id, &exercise.lift_id),
                movements,
                exercise,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ActiveSession {
        session_id: session.id,
        title: session.title,
        started_at: session.started_at,
        program_day_id: session.program_day_id,
        exercises,
    })
}

fn progress_of(detail: &ExerciseDetail) -> ExerciseProgress {
    ExerciseProgress {
        category: detail.category,
        target_sets: detail.target_sets,
        target: target_weight(detail.one_rep_max, detail.up_to_percent),
        sets: detail.exercise.sets.iter().map(SetOutcome::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Feedback, SetType};
    use chrono::Duration;

    fn engine() -> (tempfile::TempDir, Engine) {
        let temp_dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(Store::open(temp_dir.path()), &Config::default());
        (temp_dir, engine)
    }

    fn set(weight: f64, reps: u32, set_type: SetType, feedback: Option<Feedback>) -> NewSet {
        NewSet {
            weight,
            reps,
            rpe: None,
            set_type,
            feedback,
        }
    }

    fn first_exercise(engine: &Engine, user: &str) -> Uuid {
        engine.active_session(user).unwrap().unwrap().exercises[0].exercise.id
    }

    #[test]
    fn test_start_session_seeds_blocks_in_order() {
        let (_dir, engine) = engine();
        let session = engine
            .start_session("alice", Some("oly_base_w1_d1"), None)
            .unwrap();

        assert_eq!(session.title, "Snatch + Squat");
        let lifts: Vec<_> = session.exercises.iter().map(|e| e.lift_id.as_str()).collect();
        assert_eq!(lifts, vec!["power_snatch", "snatch_pull", "back_squat", "pull_up"]);
        assert_eq!(session.exercises[2].block_order, Some(2));
    }

    #[test]
    fn test_single_active_session() {
        let (_dir, engine) = engine();
        engine.start_session("alice", None, Some("First")).unwrap();

        let second = engine.start_session("alice", None, Some("Second"));
        assert!(matches!(second, Err(Error::Conflict(_))));

        // Other lifters are unaffected
        engine.start_session("bob", None, None).unwrap();
    }

    #[test]
    fn test_unknown_day_is_not_found() {
        let (_dir, engine) = engine();
        let result = engine.start_session("alice", Some("no_such_day"), None);
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(engine.active_session("alice").unwrap().is_none());
    }

    #[test]
    fn test_active_session_resolves_one_rep_max_via_parent() {
        let (_dir, engine) = engine();
        engine
            .record_manual("alice", "snatch", 100.0, 1, RecordSource::Manual, Utc::now())
            .unwrap();
        engine
            .start_session("alice", Some("oly_base_w1_d1"), None)
            .unwrap();

        let active = engine.active_session("alice").unwrap().unwrap();
        let first = &active.exercises[0];
        assert_eq!(first.exercise.lift_id, "power_snatch");
        assert_eq!(first.one_rep_max, Some(100.0));
        assert_eq!(first.up_to_percent, Some(75.0));
        assert_eq!(first.movements.len(), 2);
        assert_eq!(first.movements[1].reps, Some(1));
    }

    #[test]
    fn test_log_set_detects_pr_and_numbers_sets() {
        let (_dir, engine) = engine();
        let session = engine.start_session("alice", Some("strength_5x5_w1_d1"), None).unwrap();
        let exercise = session.exercises[0].id;

        let first = engine
            .log_set("alice", session.id, exercise, set(100.0, 5, SetType::Working, None))
            .unwrap();
        assert!(first.is_pr);
        assert_eq!(first.previous_best, None);
        assert_eq!(first.set.set_number, 1);

        let second = engine
            .log_set("alice", session.id, exercise, set(100.0, 5, SetType::Working, None))
            .unwrap();
        assert!(!second.is_pr);
        assert_eq!(second.previous_best, Some(100.0));
        assert_eq!(second.set.set_number, 2);
    }

    #[test]
    fn test_warmups_never_set_records() {
        let (_dir, engine) = engine();
        let session = engine.start_session("alice", Some("strength_5x5_w1_d1"), None).unwrap();
        let exercise = session.exercises[0].id;

        let logged = engine
            .log_set("alice", session.id, exercise, set(300.0, 5, SetType::Warmup, None))
            .unwrap();
        assert!(!logged.is_pr);
        assert!(engine.all_records("alice").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_set_leaves_no_trace() {
        let (_dir, engine) = engine();
        let session = engine.start_session("alice", Some("strength_5x5_w1_d1"), None).unwrap();
        let exercise = session.exercises[0].id;

        let result = engine.log_set("alice", session.id, exercise, set(-5.0, 5, SetType::Working, None));
        assert!(matches!(result, Err(Error::Validation(_))));
        let result = engine.log_set("alice", session.id, exercise, set(50.0, 0, SetType::Working, None));
        assert!(matches!(result, Err(Error::Validation(_))));

        let active = engine.active_session("alice").unwrap().unwrap();
        assert!(active.exercises[0].exercise.sets.is_empty());
    }

    #[test]
    fn test_sessions_are_user_scoped() {
        let (_dir, engine) = engine();
        let session = engine.start_session("alice", Some("strength_5x5_w1_d1"), None).unwrap();
        let exercise = session.exercises[0].id;

        let result = engine.log_set("mallory", session.id, exercise, NewSet::working(50.0, 5));
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(matches!(
            engine.discard_session("mallory", session.id),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_batch_upload_reports_prs_in_order() {
        let (_dir, engine) = engine();
        let session = engine.start_session("alice", Some("strength_5x5_w1_d1"), None).unwrap();
        let squat = session.exercises[0].id;
        let bench = session.exercises[1].id;

        let pending = |exercise_id, weight, set_type| PendingSet {
            exercise_id,
            weight,
            reps: 5,
            rpe: None,
            set_type,
            feedback: None,
        };
        let result = engine
            .batch_upload_sets(
                "alice",
                session.id,
                &[
                    pending(squat, 60.0, SetType::Warmup),
                    pending(squat, 100.0, SetType::Working),
                    pending(squat, 105.0, SetType::Working),
                    pending(bench, 70.0, SetType::Working),
                ],
            )
            .unwrap();

        assert_eq!(result.uploaded, 4);
        let summary: Vec<_> = result
            .prs
            .iter()
            .map(|p| (p.lift_name.as_str(), p.weight, p.previous_best))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Back Squat", 100.0, None),
                ("Back Squat", 105.0, Some(100.0)),
                ("Bench Press", 70.0, None),
            ]
        );
    }

    #[test]
    fn test_batch_upload_is_all_or_nothing() {
        let (_dir, engine) = engine();
        let session = engine.start_session("alice", Some("strength_5x5_w1_d1"), None).unwrap();
        let squat = session.exercises[0].id;

        let sets = [
            PendingSet {
                exercise_id: squat,
                weight: 100.0,
                reps: 5,
                rpe: None,
                set_type: SetType::Working,
                feedback: None,
            },
            PendingSet {
                exercise_id: Uuid::new_v4(),
                weight: 100.0,
                reps: 5,
                rpe: None,
                set_type: SetType::Working,
                feedback: None,
            },
        ];
        let result = engine.batch_upload_sets("alice", session.id, &sets);
        assert!(matches!(result, Err(Error::NotFound(_))));

        let active = engine.active_session("alice").unwrap().unwrap();
        assert!(active.exercises[0].exercise.sets.is_empty());
        assert!(engine.all_records("alice").unwrap().is_empty());
    }

    #[test]
    fn test_undo_retracts_pr() {
        let (_dir, engine) = engine();
        let session = engine.start_session("alice", Some("strength_5x5_w1_d1"), None).unwrap();
        let exercise = session.exercises[0].id;

        engine
            .log_set("alice", session.id, exercise, NewSet::working(100.0, 5))
            .unwrap();
        let removed = engine.undo_last_set("alice", session.id, exercise).unwrap().unwrap();
        assert_eq!(removed.weight, 100.0);
        assert!(engine.current_best("alice", "back_squat", 5).unwrap().is_none());
        assert!(engine.undo_last_set("alice", session.id, exercise).unwrap().is_none());
    }

    #[test]
    fn test_completed_session_is_immutable() {
        let (_dir, engine) = engine();
        let session = engine.start_session("alice", Some("strength_5x5_w1_d1"), None).unwrap();
        let exercise = session.exercises[0].id;
        engine.complete_session("alice", session.id).unwrap();

        assert!(matches!(
            engine.log_set("alice", session.id, exercise, NewSet::working(50.0, 5)),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            engine.add_exercise("alice", session.id, "deadlift", None),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            engine.complete_session("alice", session.id),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            engine.discard_session("alice", session.id),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_discard_deletes_session_and_its_records() {
        let (_dir, engine) = engine();
        let session = engine.start_session("alice", Some("strength_5x5_w1_d1"), None).unwrap();
        let exercise = session.exercises[0].id;
        engine
            .log_set("alice", session.id, exercise, NewSet::working(100.0, 5))
            .unwrap();

        let discarded = engine.discard_session("alice", session.id).unwrap();
        assert_eq!(discarded.id, session.id);
        assert!(engine.active_session("alice").unwrap().is_none());
        assert!(engine.all_records("alice").unwrap().is_empty());
        // The slot is free again
        engine.start_session("alice", None, None).unwrap();
    }

    #[test]
    fn test_add_exercise_ad_hoc_sorts_last() {
        let (_dir, engine) = engine();
        let session = engine.start_session("alice", Some("strength_5x5_w1_d1"), None).unwrap();
        engine
            .add_exercise("alice", session.id, "strict_press", None)
            .unwrap();
        engine
            .add_exercise("alice", session.id, "front_squat", Some("strength_5x5_w1_d1_a"))
            .unwrap();

        assert!(matches!(
            engine.add_exercise("alice", session.id, "curl", None),
            Err(Error::NotFound(_))
        ));

        let active = engine.active_session("alice").unwrap().unwrap();
        let lifts: Vec<_> = active.exercises.iter().map(|e| e.exercise.lift_id.as_str()).collect();
        assert_eq!(
            lifts,
            vec!["back_squat", "front_squat", "bench_press", "pull_up", "strict_press"]
        );
        let ad_hoc = active.exercises.last().unwrap();
        assert_eq!((ad_hoc.target_sets, ad_hoc.target_reps), (1, 1));
    }

    #[test]
    fn test_add_exercise_rejects_blocks_from_other_days() {
        let (_dir, engine) = engine();
        let session = engine.start_session("alice", Some("strength_5x5_w1_d1"), None).unwrap();

        let other_day = engine.add_exercise("alice", session.id, "deadlift", Some("strength_5x5_w1_d2_b"));
        assert!(matches!(other_day, Err(Error::Validation(_))));
        assert!(matches!(
            engine.add_exercise("alice", session.id, "deadlift", Some("no_such_block")),
            Err(Error::NotFound(_))
        ));

        // Free sessions have no program day to attach blocks to
        engine.discard_session("alice", session.id).unwrap();
        let free = engine.start_session("alice", None, None).unwrap();
        assert!(matches!(
            engine.add_exercise("alice", free.id, "back_squat", Some("strength_5x5_w1_d1_a")),
            Err(Error::Validation(_))
        ));

        let active = engine.active_session("alice").unwrap().unwrap();
        assert!(active.exercises.is_empty());
    }

    #[test]
    fn test_weight_suggestions_hard_feedback_freezes() {
        let (_dir, engine) = engine();
        let session = engine.start_session("alice", Some("strength_5x5_w1_d1"), None).unwrap();
        let squat = first_exercise(&engine, "alice");

        let fresh = engine.weight_suggestions("alice", session.id, squat).unwrap();
        assert_eq!(fresh.suggestion.next_weight, 20.0);
        assert_eq!(fresh.suggestion.planned, vec![20.0, 22.0, 24.0, 26.0, 28.0]);

        engine
            .log_set("alice", session.id, squat, set(22.0, 5, SetType::Working, Some(Feedback::Hard)))
            .unwrap();
        let frozen = engine.weight_suggestions("alice", session.id, squat).unwrap();
        assert_eq!(frozen.suggestion.next_weight, 22.0);
    }

    #[test]
    fn test_weight_suggestions_interpolate_to_target() {
        let (_dir, engine) = engine();
        engine
            .record_manual("alice", "back_squat", 200.0, 1, RecordSource::Competition, Utc::now())
            .unwrap();
        let session = engine.start_session("alice", Some("strength_5x5_w1_d1"), None).unwrap();
        let squat = session.exercises[0].id;

        // 70% of 200 reached on the fifth set
        let suggestions = engine.weight_suggestions("alice", session.id, squat).unwrap();
        assert_eq!(suggestions.suggestion.target, Some(140.0));
        assert_eq!(suggestions.suggestion.planned.last(), Some(&140.0));
        assert_eq!(suggestions.suggestion.planned[0], 20.0);
    }

    #[test]
    fn test_weight_suggestions_include_previous_performance() {
        let (_dir, engine) = engine();
        let first = engine.start_session("alice", Some("strength_5x5_w1_d1"), None).unwrap();
        let squat = first.exercises[0].id;
        engine
            .log_set("alice", first.id, squat, NewSet::working(80.0, 5))
            .unwrap();
        engine.complete_session("alice", first.id).unwrap();

        let second = engine.start_session("alice", Some("strength_5x5_w1_d1"), None).unwrap();
        let suggestions = engine
            .weight_suggestions("alice", second.id, second.exercises[0].id)
            .unwrap();
        let previous = suggestions.previous.unwrap();
        assert_eq!(previous.session_id, first.id);
        assert_eq!(previous.sets[0].weight, 80.0);
    }

    #[test]
    fn test_completion_advances_week_then_cycle() {
        let (_dir, engine) = engine();
        engine
            .assign_program("alice", "strength_5x5", Utc::now().date_naive())
            .unwrap();

        let mut now = Utc::now() + Duration::minutes(1);
        let mut finish = |day: &str| {
            let session = engine.start_session_at("alice", Some(day), None, now).unwrap();
            now += Duration::minutes(10);
            let done = engine.complete_session_at("alice", session.id, now).unwrap();
            now += Duration::minutes(10);
            done
        };

        let partial = finish("strength_5x5_w1_d1");
        assert!(!partial.advanced);

        let week_done = finish("strength_5x5_w1_d2");
        assert!(week_done.advanced);
        assert_eq!(week_done.new_week_number, Some(2));
        assert_eq!(week_done.new_cycle, Some(1));
        assert_eq!(
            engine.next_program_day("alice").unwrap().as_deref(),
            Some("strength_5x5_w2_d1")
        );

        finish("strength_5x5_w2_d1");
        let wrapped = finish("strength_5x5_w2_d2");
        assert_eq!(wrapped.new_week_number, Some(1));
        assert_eq!(wrapped.new_cycle, Some(2));

        let assignment = engine.active_assignment("alice").unwrap().unwrap();
        assert_eq!((assignment.current_week_number, assignment.current_cycle), (1, 2));
    }

    #[test]
    fn test_completed_sessions_round_trip_through_csv() {
        let (dir, engine) = engine();
        let session = engine.start_session("alice", Some("strength_5x5_w1_d1"), None).unwrap();
        engine
            .log_set(
                "alice",
                session.id,
                session.exercises[0].id,
                NewSet {
                    weight: 100.0,
                    reps: 5,
                    rpe: Some(8.5),
                    set_type: SetType::Working,
                    feedback: Some(Feedback::Normal),
                },
            )
            .unwrap();
        engine.complete_session("alice", session.id).unwrap();

        let path = dir.path().join("export.csv");
        assert_eq!(engine.export_history("alice", &path).unwrap(), 1);

        let history = engine.completed_sessions("alice").unwrap();
        let rows = crate::export::read_history_csv(&path).unwrap();
        let rebuilt = crate::export::sessions_from_rows(rows);
        // Exercises without sets have no rows
        assert_eq!(rebuilt[0].exercises[0], history[0].exercises[0]);
    }
}

//! Client-held session drafts and their reconciliation with server state.
//!
//! A draft mirrors one in-progress session: its exercises in block order,
//! the sets logged so far (uploaded or not), per-movement rep overrides and
//! the exercise the lifter is on. It is a disposable cache: [`reconcile`]
//! rebuilds it from the server whenever it cannot be trusted, keeping only
//! what exists nowhere else (unsent sets and local overrides).

use crate::progression::{ExerciseProgress, Planner, SetOutcome, Suggestion};
use crate::types::{validate_reps, validate_weight};
use crate::{
    ActiveSession, Error, ExerciseDetail, Feedback, LiftCategory, Result, SetType,
};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// A set held in the draft
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LocalSet {
    pub weight: f64,
    pub reps: u32,
    pub set_type: SetType,
    pub feedback: Option<Feedback>,
    #[serde(default)]
    pub rpe: Option<f32>,
    /// Already persisted on the server
    #[serde(default)]
    pub uploaded: bool,
    /// Draft-wide log position; orders uploads across exercises
    #[serde(default)]
    pub seq: u64,
}

/// A movement of a (possibly complex) exercise
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LocalMovement {
    pub lift_id: String,
    pub lift_name: String,
    /// Movement reps, or the block default when the movement has none
    pub default_reps: u32,
    pub rep_override: Option<u32>,
}

impl LocalMovement {
    pub fn reps(&self) -> u32 {
        self.rep_override.unwrap_or(self.default_reps)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LocalExercise {
    pub exercise_id: Uuid,
    pub lift_id: String,
    pub lift_name: String,
    pub category: LiftCategory,
    pub program_block_id: Option<String>,
    pub target_sets: u32,
    pub target_reps: u32,
    pub up_to_percent: Option<f64>,
    /// Snapshot taken when the draft was built; never refreshed mid-session
    pub one_rep_max: Option<f64>,
    pub sets: Vec<LocalSet>,
    pub movements: Vec<LocalMovement>,
}

impl LocalExercise {
    fn from_detail(detail: &ExerciseDetail) -> Self {
        let movements = detail
            .movements
            .iter()
            .map(|m| LocalMovement {
                lift_id: m.lift_id.clone(),
                lift_name: m.lift_name.clone(),
                default_reps: m.reps.unwrap_or(detail.target_reps),
                rep_override: None,
            })
            .collect();

        let mut sets = detail.exercise.sets.clone();
        sets.sort_by_key(|s| s.set_number);

        Self {
            exercise_id: detail.exercise.id,
            lift_id: detail.exercise.lift_id.clone(),
            lift_name: detail.lift_name.clone(),
            category: detail.category,
            program_block_id: detail.exercise.program_block_id.clone(),
            target_sets: detail.target_sets,
            target_reps: detail.target_reps,
            up_to_percent: detail.up_to_percent,
            one_rep_max: detail.one_rep_max,
            sets: sets
                .into_iter()
                .map(|s| LocalSet {
                    weight: s.weight,
                    reps: s.reps,
                    set_type: s.set_type,
                    feedback: s.feedback,
                    rpe: s.rpe,
                    uploaded: true,
                    seq: 0,
                })
                .collect(),
            movements,
        }
    }

    pub fn progress(&self) -> ExerciseProgress {
        ExerciseProgress {
            category: self.category,
            target_sets: self.target_sets,
            target: crate::progression::target_weight(self.one_rep_max, self.up_to_percent),
            sets: self.sets.iter().map(SetOutcome::from).collect(),
        }
    }
}

/// A set waiting to be uploaded
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PendingSet {
    pub exercise_id: Uuid,
    pub weight: f64,
    pub reps: u32,
    pub rpe: Option<f32>,
    pub set_type: SetType,
    pub feedback: Option<Feedback>,
}

/// The working draft of one in-progress session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LocalSessionData {
    pub session_id: Uuid,
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub current_exercise_index: usize,
    pub exercises: Vec<LocalExercise>,
    #[serde(default)]
    pub next_seq: u64,
}

impl LocalSessionData {
    /// Fresh draft from the server's view, exercises in block order
    pub fn from_server(server: &ActiveSession) -> Self {
        let mut details: Vec<&ExerciseDetail> = server.exercises.iter().collect();
        details.sort_by_key(|d| (d.exercise.block_order.is_none(), d.exercise.block_order));

        Self {
            session_id: server.session_id,
            title: server.title.clone(),
            started_at: server.started_at,
            current_exercise_index: 0,
            exercises: details.into_iter().map(LocalExercise::from_detail).collect(),
            next_seq: 1,
        }
    }

    pub fn current_exercise(&self) -> Option<&LocalExercise> {
        self.exercises.get(self.current_exercise_index)
    }

    pub fn select_exercise(&mut self, index: usize) -> Result<()> {
        if index >= self.exercises.len() {
            return Err(Error::Validation(format!(
                "exercise {} out of range (session has {})",
                index + 1,
                self.exercises.len()
            )));
        }
        self.current_exercise_index = index;
        Ok(())
    }

    /// Append a not-yet-uploaded set to the current exercise
    pub fn log_set(
        &mut self,
        weight: f64,
        reps: u32,
        set_type: SetType,
        feedback: Option<Feedback>,
    ) -> Result<&LocalSet> {
        validate_weight(weight)?;
        validate_reps(reps)?;

        let index = self.current_exercise_index;
        let seq = self.next_seq;
        let exercise = self
            .exercises
            .get_mut(index)
            .ok_or_else(|| Error::Validation("session has no exercises".into()))?;

        exercise.sets.push(LocalSet {
            weight,
            reps,
            set_type,
            feedback,
            rpe: None,
            uploaded: false,
            seq,
        });
        self.next_seq += 1;
        tracing::debug!(
            "Draft {}: logged {} x {} on {}",
            self.session_id,
            weight,
            reps,
            exercise.lift_id
        );
        Ok(&exercise.sets[exercise.sets.len() - 1])
    }

    /// Remove the most recent set of the current exercise
    pub fn undo_last_set(&mut self) -> Option<LocalSet> {
        let index = self.current_exercise_index;
        let removed = self.exercises.get_mut(index)?.sets.pop();
        if let Some(set) = &removed {
            tracing::debug!("Draft {}: undid {} x {}", self.session_id, set.weight, set.reps);
        }
        removed
    }

    pub fn set_movement_reps(
        &mut self,
        exercise_index: usize,
        movement_index: usize,
        reps: u32,
    ) -> Result<()> {
        validate_reps(reps)?;
        let movement = self
            .exercises
            .get_mut(exercise_index)
            .and_then(|e| e.movements.get_mut(movement_index))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "no movement {} on exercise {}",
                    movement_index + 1,
                    exercise_index + 1
                ))
            })?;
        movement.rep_override = Some(reps);
        Ok(())
    }

    /// Sets not yet on the server, oldest logged first
    pub fn pending_sets(&self) -> Vec<PendingSet> {
        let mut pending: Vec<(u64, PendingSet)> = self
            .exercises
            .iter()
            .flat_map(|e| {
                e.sets.iter().filter(|s| !s.uploaded).map(move |s| {
                    let set = PendingSet {
                        exercise_id: e.exercise_id,
                        weight: s.weight,
                        reps: s.reps,
                        rpe: s.rpe,
                        set_type: s.set_type,
                        feedback: s.feedback,
                    };
                    (s.seq, set)
                })
            })
            .collect();
        pending.sort_by_key(|(seq, _)| *seq);
        pending.into_iter().map(|(_, set)| set).collect()
    }

    /// Flag every pending set as persisted. Call only after a successful upload.
    pub fn mark_uploaded(&mut self) -> usize {
        let mut count = 0;
        for set in self.exercises.iter_mut().flat_map(|e| e.sets.iter_mut()) {
            if !set.uploaded {
                set.uploaded = true;
                count += 1;
            }
        }
        count
    }

    /// Planner suggestion for the next set of an exercise
    pub fn suggest_next_weight(&self, exercise_index: usize, planner: &Planner) -> Option<Suggestion> {
        let current = self.exercises.get(exercise_index)?.progress();
        let previous = exercise_index
            .checked_sub(1)
            .and_then(|i| self.exercises.get(i))
            .map(LocalExercise::progress);
        Some(planner.suggest(previous.as_ref(), &current))
    }
}

/// Bring a local draft in line with the server's view of the session
///
/// - No draft: build fresh from the server.
/// - Same session with at least as many exercises: keep the draft as is.
/// - Otherwise rebuild. For the same session, carry over the current
///   exercise index plus each surviving exercise's local sets, rep
///   overrides and 1RM snapshot.
pub fn reconcile(server: &ActiveSession, local: Option<LocalSessionData>) -> LocalSessionData {
    let Some(local) = local else {
        tracing::debug!("No draft for session {}, building fresh", server.session_id);
        return LocalSessionData::from_server(server);
    };

    if local.session_id != server.session_id {
        tracing::info!(
            "Discarding draft for stale session {} (server has {})",
            local.session_id,
            server.session_id
        );
        return LocalSessionData::from_server(server);
    }

    if local.exercises.len() >= server.exercises.len() {
        tracing::debug!("Draft for {} is current, keeping it", server.session_id);
        return local;
    }

    tracing::info!(
        "Server has {} exercises, draft has {}; rebuilding",
        server.exercises.len(),
        local.exercises.len()
    );

    let mut fresh = LocalSessionData::from_server(server);
    let mut carried: HashMap<Uuid, LocalExercise> = local
        .exercises
        .into_iter()
        .map(|e| (e.exercise_id, e))
        .collect();

    for exercise in &mut fresh.exercises {
        let Some(old) = carried.remove(&exercise.exercise_id) else {
            continue;
        };
        exercise.one_rep_max = old.one_rep_max;
        if old.sets.len() >= exercise.sets.len() {
            exercise.sets = old.sets;
        }
        for movement in &mut exercise.movements {
            if let Some(prev) = old.movements.iter().find(|m| m.lift_id == movement.lift_id) {
                movement.rep_override = prev.rep_override;
            }
        }
    }

    fresh.next_seq = fresh.next_seq.max(local.next_seq);
    if !fresh.exercises.is_empty() {
        fresh.current_exercise_index = local.current_exercise_index.min(fresh.exercises.len() - 1);
    }
    fresh
}

// ============================================================================
// Draft persistence
// ============================================================================

/// Storage seam for drafts, one per lifter
pub trait DraftStore {
    fn load(&self, user_id: &str) -> Result<Option<LocalSessionData>>;
    fn save(&mut self, user_id: &str, draft: &LocalSessionData) -> Result<()>;
    fn clear(&mut self, user_id: &str) -> Result<()>;
}

/// Load, reconcile against the server, and store the result
pub fn load_reconciled<D: DraftStore + ?Sized>(
    drafts: &mut D,
    user_id: &str,
    server: &ActiveSession,
) -> Result<LocalSessionData> {
    let existing = drafts.load(user_id)?;
    let draft = reconcile(server, existing);
    drafts.save(user_id, &draft)?;
    Ok(draft)
}

/// Drafts kept in memory
#[derive(Clone, Debug, Default)]
pub struct MemoryDraftStore {
    drafts: HashMap<String, LocalSessionData>,
}

impl DraftStore for MemoryDraftStore {
    fn load(&self, user_id: &str) -> Result<Option<LocalSessionData>> {
        Ok(self.drafts.get(user_id).cloned())
    }

    fn save(&mut self, user_id: &str, draft: &LocalSessionData) -> Result<()> {
        self.drafts.insert(user_id.into(), draft.clone());
        Ok(())
    }

    fn clear(&mut self, user_id: &str) -> Result<()> {
        self.drafts.remove(user_id);
        Ok(())
    }
}

/// Drafts stored as `<dir>/<user>.json`
#[derive(Clone, Debug)]
pub struct JsonDraftStore {
    dir: PathBuf,
}

impl JsonDraftStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(user_id)))
    }

    /// Sidecar lock; the draft itself is replaced on every save
    fn lock_path_for(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", sanitize(user_id)))
    }

    fn lock_file(&self, user_id: &str) -> std::io::Result<File> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path_for(user_id))
    }

    fn read_locked(&self, user_id: &str, path: &Path) -> std::io::Result<String> {
        let lock = self.lock_file(user_id)?;
        lock.lock_shared()?;
        let mut contents = String::new();
        let read = File::open(path)
            .and_then(|file| std::io::BufReader::new(file).read_to_string(&mut contents));
        lock.unlock()?;
        read.map(|_| contents)
    }
}

fn sanitize(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

impl DraftStore for JsonDraftStore {
    /// A missing or unreadable draft is `None`; the server can always
    /// rebuild it.
    fn load(&self, user_id: &str) -> Result<Option<LocalSessionData>> {
        let path = self.path_for(user_id);
        if !path.exists() {
            return Ok(None);
        }

        let contents = match self.read_locked(user_id, &path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Unable to read draft {:?}: {}. Rebuilding.", path, e);
                return Ok(None);
            }
        };

        match serde_json::from_str::<LocalSessionData>(&contents) {
            Ok(draft) => Ok(Some(draft)),
            Err(e) => {
                tracing::warn!("Failed to parse draft {:?}: {}. Rebuilding.", path, e);
                Ok(None)
            }
        }
    }

    fn save(&mut self, user_id: &str, draft: &LocalSessionData) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(user_id);

        let lock = self.lock_file(user_id)?;
        lock.lock_exclusive()?;
        let written = write_atomic(&self.dir, &path, draft);
        lock.unlock()?;
        written?;

        tracing::debug!("Saved draft to {:?}", path);
        Ok(())
    }

    fn clear(&mut self, user_id: &str) -> Result<()> {
        let path = self.path_for(user_id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Cleared draft {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_atomic(dir: &Path, path: &Path, draft: &LocalSessionData) -> Result<()> {
    let temp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        serde_json::to_writer(&mut writer, draft)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

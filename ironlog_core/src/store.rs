//! Durable server-side state with transactional file persistence.
//!
//! All durable state lives in one JSON document. Every mutation runs inside
//! [`Store::transaction`]: an exclusive lock on a sidecar lock file is held
//! while the document is loaded, mutated and atomically written back. A
//! failed mutation is never written, so each call is all-or-nothing and
//! concurrent processes are serialized.

use crate::catalog::get_default_catalog;
use crate::records::RecordStore;
use crate::{
    Error, Lift, PersonalRecord, Program, ProgramAssignment, ProgramBlock, ProgramDay,
    ProgramWeek, Result, Session, SessionStatus,
};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Everything the server side persists
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Database {
    #[serde(default)]
    pub lifts: BTreeMap<String, Lift>,
    #[serde(default)]
    pub programs: BTreeMap<String, Program>,
    #[serde(default)]
    pub assignments: Vec<ProgramAssignment>,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub records: Vec<PersonalRecord>,
}

impl Database {
    /// A fresh database holding the built-in catalog
    pub fn seeded() -> Self {
        let catalog = get_default_catalog();
        Self {
            lifts: catalog.lifts.clone(),
            programs: catalog.programs.clone(),
            ..Self::default()
        }
    }

    pub fn lift(&self, lift_id: &str) -> Result<&Lift> {
        self.lifts
            .get(lift_id)
            .ok_or_else(|| Error::not_found("lift", lift_id))
    }

    pub fn program(&self, program_id: &str) -> Result<&Program> {
        self.programs
            .get(program_id)
            .ok_or_else(|| Error::not_found("program", program_id))
    }

    /// Block by id, with its position inside its day
    pub fn find_block(&self, block_id: &str) -> Option<(usize, &ProgramBlock)> {
        self.programs.values().find_map(|p| p.find_block(block_id))
    }

    pub fn find_day(&self, day_id: &str) -> Option<(&Program, &ProgramWeek, &ProgramDay)> {
        self.programs
            .values()
            .find_map(|p| p.find_day(day_id).map(|(week, day)| (p, week, day)))
    }

    /// Session lookup scoped to its owner
    pub fn session(&self, user_id: &str, session_id: Uuid) -> Result<&Session> {
        self.sessions
            .iter()
            .find(|s| s.id == session_id && s.user_id == user_id)
            .ok_or_else(|| Error::not_found("session", session_id))
    }

    pub fn session_mut(&mut self, user_id: &str, session_id: Uuid) -> Result<&mut Session> {
        self.sessions
            .iter_mut()
            .find(|s| s.id == session_id && s.user_id == user_id)
            .ok_or_else(|| Error::not_found("session", session_id))
    }

    /// Session that may still be modified
    pub fn open_session_mut(&mut self, user_id: &str, session_id: Uuid) -> Result<&mut Session> {
        let session = self.session_mut(user_id, session_id)?;
        if session.is_completed() {
            return Err(Error::Conflict(format!(
                "session {} is already completed",
                session_id
            )));
        }
        Ok(session)
    }

    pub fn active_session(&self, user_id: &str) -> Option<&Session> {
        self.sessions
            .iter()
            .find(|s| s.user_id == user_id && s.status == SessionStatus::InProgress)
    }

    /// Current 1RM for a lift, resolved through its canonical parent
    pub fn one_rep_max(&self, user_id: &str, lift_id: &str) -> Option<f64> {
        let canonical = self
            .lifts
            .get(lift_id)
            .map(|l| l.canonical_id())
            .unwrap_or(lift_id);
        self.current_best(user_id, canonical, 1).map(|r| r.weight)
    }
}

/// Releases the advisory lock when dropped
struct LockGuard(File);

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.unlock() {
            tracing::warn!("Failed to release store lock: {}", e);
        }
    }
}

/// File-backed transactional store
#[derive(Clone, Debug)]
pub struct Store {
    path: PathBuf,
    lock_path: PathBuf,
}

impl Store {
    pub const FILE_NAME: &'static str = "store.json";

    /// Store living in `data_dir/store.json`
    pub fn open(data_dir: &Path) -> Self {
        Self::at(data_dir.join(Self::FILE_NAME))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("lock");
        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a read-only query under a shared lock
    pub fn read<R>(&self, f: impl FnOnce(&Database) -> Result<R>) -> Result<R> {
        let lock = self.lock_file()?;
        lock.lock_shared()?;
        let _guard = LockGuard(lock);

        let db = self.load_unlocked()?;
        f(&db)
    }

    /// Run a mutation under an exclusive lock, persisting only on success
    pub fn transaction<R>(&self, f: impl FnOnce(&mut Database) -> Result<R>) -> Result<R> {
        let lock = self.lock_file()?;
        lock.lock_exclusive()?;
        let _guard = LockGuard(lock);

        let mut db = self.load_unlocked()?;
        match f(&mut db) {
            Ok(value) => {
                self.save_unlocked(&db)?;
                Ok(value)
            }
            Err(e) => {
                tracing::debug!("Transaction rolled back: {}", e);
                Err(e)
            }
        }
    }

    fn lock_file(&self) -> Result<File> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;
        Ok(file)
    }

    /// Load the document. A missing store is seeded; a corrupt one is an
    /// error, never silently replaced.
    fn load_unlocked(&self) -> Result<Database> {
        if !self.path.exists() {
            tracing::info!("No store at {:?}, seeding from default catalog", self.path);
            return Ok(Database::seeded());
        }

        let mut contents = String::new();
        File::open(&self.path)?.read_to_string(&mut contents)?;
        let db = serde_json::from_str::<Database>(&contents)?;
        tracing::debug!(
            "Loaded store from {:?} ({} sessions, {} records)",
            self.path,
            db.sessions.len(),
            db.records.len()
        );
        Ok(db)
    }

    /// Atomically replace the document: temp file, fsync, rename
    fn save_unlocked(&self, db: &Database) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "store path missing parent")
        })?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, db)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved store to {:?}", self.path);
        Ok(())
    }
}

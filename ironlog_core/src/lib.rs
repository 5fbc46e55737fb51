#![forbid(unsafe_code)]

//! Core domain model and business logic for the ironlog training log.
//!
//! This crate provides:
//! - Domain types (lifts, programs, assignments, sessions, records)
//! - Catalog management
//! - Progression planning and PR detection
//! - Program week/cycle advancement
//! - Local session drafts and their reconciliation
//! - Persistence (transactional JSON store, CSV export)

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod progression;
pub mod store;
pub mod records;
pub mod advancer;
pub mod draft;
pub mod history;
pub mod export;
pub mod sessions;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{build_default_catalog, get_default_catalog, Catalog};
pub use config::Config;
pub use progression::{Planner, Suggestion};
pub use store::{Database, Store};
pub use records::{check_and_record_pr, MemoryRecordStore, PrCandidate, PrCheck, RecordStore};
pub use advancer::{advance_week_if_complete, Advancement};
pub use draft::{
    reconcile, DraftStore, JsonDraftStore, LocalExercise, LocalMovement, LocalSessionData,
    LocalSet, MemoryDraftStore, PendingSet,
};
pub use sessions::{BatchUpload, Completion, Engine, PrNotice, SetLogged, WeightSuggestions};

//! Personal records: storage seam and PR detection.
//!
//! Records are append-only. The current PR for (user, lift, reps) is the
//! record with the highest weight; ties keep the earliest. Only manual
//! entries may ever be deleted, and only by their owner.

use crate::store::Database;
use crate::types::{validate_reps, validate_weight};
use crate::{Error, PersonalRecord, RecordSource, Result, SetType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Storage seam for personal records
pub trait RecordStore {
    /// Every stored record, in insertion order
    fn records(&self) -> &[PersonalRecord];

    fn append_record(&mut self, record: PersonalRecord) -> Result<()>;

    /// Remove a record by id; ownership is checked by the caller
    fn remove_record(&mut self, record_id: Uuid) -> Option<PersonalRecord>;

    /// Current best for an exact (lift, reps) pair
    fn current_best(&self, user_id: &str, lift_id: &str, reps: u32) -> Option<&PersonalRecord> {
        let mut best: Option<&PersonalRecord> = None;
        for record in self
            .records()
            .iter()
            .filter(|r| r.user_id == user_id && r.lift_id == lift_id && r.reps == reps)
        {
            best = match best {
                Some(b) if record.weight > b.weight => Some(record),
                Some(b) if record.weight == b.weight && record.date < b.date => Some(record),
                None => Some(record),
                keep => keep,
            };
        }
        best
    }

    /// Every record for a lift, oldest first
    fn records_for(&self, user_id: &str, lift_id: &str) -> Vec<PersonalRecord> {
        let mut records: Vec<_> = self
            .records()
            .iter()
            .filter(|r| r.user_id == user_id && r.lift_id == lift_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.date);
        records
    }

    /// The current PR at every rep count for a lift, ascending reps
    fn bests_by_reps(&self, user_id: &str, lift_id: &str) -> Vec<PersonalRecord> {
        let mut reps: Vec<u32> = self
            .records()
            .iter()
            .filter(|r| r.user_id == user_id && r.lift_id == lift_id)
            .map(|r| r.reps)
            .collect();
        reps.sort_unstable();
        reps.dedup();
        reps.into_iter()
            .filter_map(|n| self.current_best(user_id, lift_id, n).cloned())
            .collect()
    }
}

impl RecordStore for Database {
    fn records(&self) -> &[PersonalRecord] {
        &self.records
    }

    fn append_record(&mut self, record: PersonalRecord) -> Result<()> {
        validate_weight(record.weight)?;
        validate_reps(record.reps)?;
        self.records.push(record);
        Ok(())
    }

    fn remove_record(&mut self, record_id: Uuid) -> Option<PersonalRecord> {
        let idx = self.records.iter().position(|r| r.id == record_id)?;
        Some(self.records.remove(idx))
    }
}

/// In-memory record store, handy for embedding and tests
#[derive(Clone, Debug, Default)]
pub struct MemoryRecordStore {
    records: Vec<PersonalRecord>,
}

impl RecordStore for MemoryRecordStore {
    fn records(&self) -> &[PersonalRecord] {
        &self.records
    }

    fn append_record(&mut self, record: PersonalRecord) -> Result<()> {
        validate_weight(record.weight)?;
        validate_reps(record.reps)?;
        self.records.push(record);
        Ok(())
    }

    fn remove_record(&mut self, record_id: Uuid) -> Option<PersonalRecord> {
        let idx = self.records.iter().position(|r| r.id == record_id)?;
        Some(self.records.remove(idx))
    }
}

/// Epley estimate, rounded to one decimal; a single equals its weight
pub fn estimated_one_rep_max(weight: f64, reps: u32) -> f64 {
    if reps <= 1 {
        return weight;
    }
    let estimate = weight * (1.0 + f64::from(reps) / 30.0);
    (estimate * 10.0).round() / 10.0
}

/// A logged set offered to the PR detector
#[derive(Clone, Debug)]
pub struct PrCandidate<'a> {
    pub user_id: &'a str,
    pub lift_id: &'a str,
    pub weight: f64,
    pub reps: u32,
    pub session_set_id: Option<Uuid>,
    pub date: DateTime<Utc>,
}

/// Outcome of a PR check
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct PrCheck {
    pub is_pr: bool,
    pub previous_best: Option<f64>,
}

/// Compare a set against the current best and append a record if it wins
///
/// A PR needs no prior record for (lift, reps) or a strictly greater
/// weight. Call this inside the same transaction as the read so two
/// submissions cannot both see "no existing best".
pub fn check_and_record_pr<S: RecordStore + ?Sized>(
    store: &mut S,
    candidate: &PrCandidate<'_>,
) -> Result<PrCheck> {
    validate_weight(candidate.weight)?;
    validate_reps(candidate.reps)?;

    let previous_best = store
        .current_best(candidate.user_id, candidate.lift_id, candidate.reps)
        .map(|r| r.weight);

    let is_pr = match previous_best {
        None => true,
        Some(best) => candidate.weight > best,
    };

    if !is_pr {
        return Ok(PrCheck {
            is_pr,
            previous_best,
        });
    }

    store.append_record(PersonalRecord {
        id: Uuid::new_v4(),
        user_id: candidate.user_id.into(),
        lift_id: candidate.lift_id.into(),
        weight: candidate.weight,
        reps: candidate.reps,
        estimated_one_rep_max: estimated_one_rep_max(candidate.weight, candidate.reps),
        date: candidate.date,
        source: RecordSource::Session,
        session_set_id: candidate.session_set_id,
    })?;

    tracing::info!(
        "New PR for {} on {}: {} x {} (previous {:?})",
        candidate.user_id,
        candidate.lift_id,
        candidate.weight,
        candidate.reps,
        previous_best
    );

    Ok(PrCheck {
        is_pr,
        previous_best,
    })
}

/// PR check gated on set type; warmups, backoffs and dropsets yield `None`
pub fn check_set<S: RecordStore + ?Sized>(
    store: &mut S,
    set_type: SetType,
    candidate: &PrCandidate<'_>,
) -> Result<Option<PrCheck>> {
    if !set_type.counts_toward_records() {
        return Ok(None);
    }
    check_and_record_pr(store, candidate).map(Some)
}

/// Append a record entered by hand or from a competition result
pub fn record_manual<S: RecordStore + ?Sized>(
    store: &mut S,
    user_id: &str,
    lift_id: &str,
    weight: f64,
    reps: u32,
    source: RecordSource,
    date: DateTime<Utc>,
) -> Result<PersonalRecord> {
    if source == RecordSource::Session {
        return Err(Error::Validation(
            "session records are created by logging sets".into(),
        ));
    }
    let record = PersonalRecord {
        id: Uuid::new_v4(),
        user_id: user_id.into(),
        lift_id: lift_id.into(),
        weight,
        reps,
        estimated_one_rep_max: estimated_one_rep_max(weight, reps),
        date,
        source,
        session_set_id: None,
    };
    store.append_record(record.clone())?;
    tracing::info!(
        "Recorded {} entry for {} on {}: {} x {}",
        source,
        user_id,
        lift_id,
        weight,
        reps
    );
    Ok(record)
}

/// Delete a manual entry owned by the lifter
pub fn delete_manual_record<S: RecordStore + ?Sized>(
    store: &mut S,
    user_id: &str,
    record_id: Uuid,
) -> Result<PersonalRecord> {
    let source = store
        .records()
        .iter()
        .find(|r| r.id == record_id && r.user_id == user_id)
        .map(|r| r.source)
        .ok_or_else(|| Error::not_found("record", record_id))?;

    if source != RecordSource::Manual {
        return Err(Error::Validation(format!(
            "only manual records can be deleted, {} is a {} record",
            record_id, source
        )));
    }

    store
        .remove_record(record_id)
        .ok_or_else(|| Error::not_found("record", record_id))
}

/// Drop session records produced by a set that has since been undone
pub fn retract_set_records<S: RecordStore + ?Sized>(
    store: &mut S,
    user_id: &str,
    session_set_id: Uuid,
) -> usize {
    let ids: Vec<Uuid> = store
        .records()
        .iter()
        .filter(|r| {
            r.user_id == user_id
                && r.source == RecordSource::Session
                && r.session_set_id == Some(session_set_id)
        })
        .map(|r| r.id)
        .collect();
    for id in &ids {
        store.remove_record(*id);
    }
    if !ids.is_empty() {
        tracing::info!("Retracted {} record(s) for undone set {}", ids.len(), session_set_id);
    }
    ids.len()
}

/// Records grouped by provenance
pub fn classify_by_source<S: RecordStore + ?Sized>(
    store: &S,
    user_id: &str,
) -> BTreeMap<String, Vec<PersonalRecord>> {
    let mut groups: BTreeMap<String, Vec<PersonalRecord>> = BTreeMap::new();
    for record in store.records().iter().filter(|r| r.user_id == user_id) {
        groups
            .entry(record.source.to_string())
            .or_default()
            .push(record.clone());
    }
    groups
}

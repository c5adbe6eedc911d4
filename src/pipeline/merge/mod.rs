//! Per-subject, per-date merge of canonical categories into stored records.
//!
//! Mutations for one subject are serialized by a per-subject lock; different
//! subjects merge concurrently.

pub mod fold;
pub mod store;
pub mod types;

pub use fold::{consolidated_parameters, fold_chunk, merge_categories, merge_into_subject};
pub use store::{MemoryRecordStore, RecordStore, SqliteRecordStore, StoreError};
pub use types::{ReportRecord, SubjectRecord};

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use super::synonyms::SynonymTree;
use super::types::Category;

pub struct MergeStore {
    store: Arc<dyn RecordStore>,
    subject_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MergeStore {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            subject_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRecordStore::new()))
    }

    /// Merge one document's categories into the subject's record for
    /// `report_date`, persist it, and return the full updated record.
    pub fn merge_document(
        &self,
        subject_id: &str,
        report_date: NaiveDate,
        categories: &[Category],
        tree: &SynonymTree,
    ) -> Result<SubjectRecord, StoreError> {
        if subject_id.trim().is_empty() {
            return Err(StoreError::EmptySubjectId);
        }

        let lock = self.subject_lock(subject_id)?;
        let result = match lock.lock() {
            Ok(_guard) => self.merge_locked(subject_id, report_date, categories, tree),
            Err(_) => Err(StoreError::LockPoisoned),
        };
        drop(lock);
        self.release_subject_lock(subject_id);
        result
    }

    fn merge_locked(
        &self,
        subject_id: &str,
        report_date: NaiveDate,
        categories: &[Category],
        tree: &SynonymTree,
    ) -> Result<SubjectRecord, StoreError> {
        let mut record = self
            .store
            .load(subject_id)?
            .unwrap_or_else(|| SubjectRecord::new(subject_id));
        let added = merge_into_subject(&mut record, report_date, categories, tree);
        self.store.save(&record)?;

        tracing::info!(
            subject = %subject_id,
            date = %report_date,
            added,
            reports = record.reports.len(),
            "Document merged"
        );
        Ok(record)
    }

    pub fn record(&self, subject_id: &str) -> Result<Option<SubjectRecord>, StoreError> {
        self.store.load(subject_id)
    }

    /// All distinct values per parameter across every report of the subject.
    pub fn consolidated(&self, subject_id: &str) -> Result<BTreeMap<String, Vec<String>>, StoreError> {
        Ok(self
            .store
            .load(subject_id)?
            .map(|record| consolidated_parameters(&record))
            .unwrap_or_default())
    }

    pub fn subjects(&self) -> Result<Vec<String>, StoreError> {
        self.store.subjects()
    }

    fn subject_lock(&self, subject_id: &str) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut locks = self.subject_locks.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(locks.entry(subject_id.to_string()).or_default().clone())
    }

    /// Forget a subject's lock once no merge holds or waits on it.
    /// Clones are only taken under the map lock, so a count of one is final.
    fn release_subject_lock(&self, subject_id: &str) {
        let Ok(mut locks) = self.subject_locks.lock() else {
            return;
        };
        if locks.get(subject_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(subject_id);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.subject_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

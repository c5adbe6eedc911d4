//! Persistence backends for subject records.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use thiserror::Error;

use super::types::SubjectRecord;
use crate::db::{self, DatabaseError};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Stored record for subject {subject_id} is unreadable: {source}")]
    Corrupt {
        subject_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Subject id must not be empty")]
    EmptySubjectId,

    #[error("Internal lock poisoned")]
    LockPoisoned,
}

/// Key-value persistence of subject records, keyed by subject id.
pub trait RecordStore: Send + Sync {
    fn load(&self, subject_id: &str) -> Result<Option<SubjectRecord>, StoreError>;

    fn save(&self, record: &SubjectRecord) -> Result<(), StoreError>;

    /// All stored subject ids, sorted.
    fn subjects(&self) -> Result<Vec<String>, StoreError>;
}

// ═══════════════════════════════════════════
// SQLite
// ═══════════════════════════════════════════

/// One JSON document per subject in the `subject_records` table.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = db::open_database(path)?;
        tracing::info!(path = %path.display(), "Record store opened");
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_connection(db::open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

impl RecordStore for SqliteRecordStore {
    fn load(&self, subject_id: &str) -> Result<Option<SubjectRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let Some(document) = get_subject_document(&conn, subject_id)? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&document).map_err(|source| StoreError::Corrupt {
            subject_id: subject_id.to_string(),
            source,
        })?;
        Ok(Some(record))
    }

    fn save(&self, record: &SubjectRecord) -> Result<(), StoreError> {
        let document = serde_json::to_string(record)?;
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        upsert_subject_document(&conn, &record.subject_id, &document)?;
        Ok(())
    }

    fn subjects(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(list_subject_ids(&conn)?)
    }
}

fn get_subject_document(conn: &Connection, subject_id: &str) -> Result<Option<String>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT document FROM subject_records WHERE subject_id = ?1")?;
    match stmt.query_row([subject_id], |row| row.get::<_, String>(0)) {
        Ok(doc) => Ok(Some(doc)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DatabaseError::from(e)),
    }
}

fn upsert_subject_document(conn: &Connection, subject_id: &str, document: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO subject_records (subject_id, document, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(subject_id) DO UPDATE SET document = ?2, updated_at = datetime('now')",
        params![subject_id, document],
    )?;
    Ok(())
}

fn list_subject_ids(conn: &Connection) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT subject_id FROM subject_records ORDER BY subject_id")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

// ═══════════════════════════════════════════
// In-memory
// ═══════════════════════════════════════════

#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, SubjectRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn load(&self, subject_id: &str) -> Result<Option<SubjectRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.get(subject_id).cloned())
    }

    fn save(&self, record: &SubjectRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        records.insert(record.subject_id.clone(), record.clone());
        Ok(())
    }

    fn subjects(&self) -> Result<Vec<String>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut ids: Vec<String> = records.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample(subject: &str) -> SubjectRecord {
        let mut record = SubjectRecord::new(subject);
        record
            .report_mut(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
            .insert_value("Hemoglobin", "13.5");
        record
    }

    fn round_trip(store: &dyn RecordStore) {
        assert!(store.load("u1").unwrap().is_none());
        store.save(&sample("u1")).unwrap();
        store.save(&sample("u0")).unwrap();
        assert_eq!(store.load("u1").unwrap(), Some(sample("u1")));
        assert_eq!(store.subjects().unwrap(), vec!["u0".to_string(), "u1".to_string()]);
    }

    #[test]
    fn sqlite_store_saves_and_loads() {
        round_trip(&SqliteRecordStore::open_in_memory().unwrap());
    }

    #[test]
    fn memory_store_saves_and_loads() {
        round_trip(&MemoryRecordStore::new());
    }

    #[test]
    fn sqlite_save_overwrites_existing_document() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store.save(&sample("u1")).unwrap();
        let mut updated = sample("u1");
        updated
            .report_mut(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
            .insert_value("RBC", "4.5");
        store.save(&updated).unwrap();
        assert_eq!(store.load("u1").unwrap().unwrap().reports.len(), 2);
        assert_eq!(store.subjects().unwrap().len(), 1);
    }

    #[test]
    fn sqlite_store_persists_across_connections() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("records.db");
        SqliteRecordStore::open(&path).unwrap().save(&sample("u1")).unwrap();
        let reopened = SqliteRecordStore::open(&path).unwrap();
        assert_eq!(reopened.load("u1").unwrap(), Some(sample("u1")));
    }

    #[test]
    fn corrupt_document_is_reported() {
        let conn = db::open_memory_database().unwrap();
        upsert_subject_document(&conn, "u1", "{not json").unwrap();
        let store = SqliteRecordStore::from_connection(conn);
        assert!(matches!(store.load("u1"), Err(StoreError::Corrupt { .. })));
    }
}

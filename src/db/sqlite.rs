use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use super::DatabaseError;

/// Schema steps for the subject record store, oldest first.
const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    include_str!("../../resources/migrations/001_subject_records.sql"),
)];

/// Open the subject record database at `path`, creating the file and any
/// missing parent directories, and bring its schema up to date.
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| DatabaseError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    tracing::debug!(path = %path.display(), "Record database opened");
    Ok(conn)
}

/// A migrated record database that lives only as long as the connection.
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

// Separate CLI runs may write the same file; wait on a locked database
// instead of failing the merge.
fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;
         PRAGMA busy_timeout=5000;",
    )?;
    Ok(())
}

/// Apply every migration newer than the stored schema version. Each step
/// runs in its own transaction together with its version row.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current = schema_version(conn);

    for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        tracing::info!(version, "Applying record store migration");
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)
            .and_then(|()| tx.commit())
            .map_err(|e| DatabaseError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
    }

    Ok(())
}

/// Highest applied migration, 0 for a fresh file.
pub fn schema_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i64>>(0)
    })
    .optional()
    .ok()
    .flatten()
    .flatten()
    .unwrap_or(0)
}

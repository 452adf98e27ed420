use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing;

use super::DatabaseError;
use crate::config::DEFAULT_BUSY_TIMEOUT_MS;

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    open_database_with_timeout(path, Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
}

/// Open a SQLite connection with an explicit lock-wait budget.
///
/// `busy_timeout` bounds how long an issuance waits for another
/// transaction's write lock before failing with SQLITE_BUSY.
pub fn open_database_with_timeout(
    path: &Path,
    busy_timeout: Duration,
) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn, busy_timeout)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn, Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection, busy_timeout: Duration) -> Result<(), DatabaseError> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;"
    )?;
    Ok(())
}

/// Run all pending migrations
///
/// Safe to call from several connections opening the same fresh file at
/// once: the version is re-read under the write lock, so only the first
/// connection applies a migration and the rest see it committed.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let migrations: Vec<(i64, &str)> = vec![
        (1, include_str!("../../resources/migrations/001_initial.sql")),
    ];

    let latest = migrations.last().map(|(version, _)| *version).unwrap_or(0);
    if get_current_version(conn)? >= latest {
        return Ok(());
    }

    let tx = begin_immediate(conn)?;
    let current_version = get_current_version(&tx)?;

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            tx.execute_batch(sql).map_err(|e| DatabaseError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }

    tx.commit()?;
    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let version = conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get::<_, Option<i64>>(0),
    );
    match version {
        Ok(v) => Ok(v.unwrap_or(0)),
        Err(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.contains("no such table") => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Begin a write transaction, taking the database write lock up front.
///
/// Dropping the returned handle without committing rolls it back.
pub fn begin_immediate(conn: &Connection) -> Result<Transaction<'_>, DatabaseError> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

/// Run `f` inside an immediate transaction.
///
/// Commits when `f` returns `Ok`, rolls back when it returns `Err`.
/// A panic inside `f` unwinds through the transaction's drop, which also
/// rolls back.
pub fn with_immediate_transaction<T, E, F>(conn: &Connection, f: F) -> Result<T, E>
where
    E: From<DatabaseError>,
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
{
    let tx = begin_immediate(conn)?;
    match f(&tx) {
        Ok(value) => {
            tx.commit().map_err(DatabaseError::from)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback() {
                tracing::warn!(error = %rollback_err, "Rollback failed; connection drop will discard the transaction");
            }
            Err(e)
        }
    }
}

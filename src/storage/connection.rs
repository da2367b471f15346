//! Shared connection handling for the SQLite stores.
//!
//! Utilities for managing SQLite connections with proper mutex handling,
//! poison recovery, and pragmatic performance configuration.

use crate::{Error, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Acquires a mutex lock with poison recovery.
///
/// If the mutex is poisoned by a panic in a previous critical section, the
/// inner value is recovered and a warning logged so one failed operation
/// does not cascade into every later one.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("doctrine_sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a SQLite connection for concurrent access.
///
/// - WAL journal mode: concurrent readers with a single writer
/// - NORMAL synchronous: balances durability with performance
/// - `busy_timeout` 5 s: waits for locks instead of failing immediately
/// - foreign keys ON: document → section → claim cascades are enforced
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a value row; pragma_update tolerates that.
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    let _ = conn.pragma_update(None, "foreign_keys", "ON");
    Ok(())
}

/// Maps a rusqlite error into a persistence error for `operation`.
pub fn persistence_error(operation: &str, e: &rusqlite::Error) -> Error {
    Error::Persistence {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

/// Returns true for transient failures worth one retry (lock contention,
/// not constraint or logic errors).
pub fn is_transient(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if matches!(
                f.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_lock_success() {
        let mutex = Mutex::new(42);
        let guard = acquire_lock(&mutex);
        assert_eq!(*guard, 42);
    }

    #[test]
    fn test_acquire_lock_concurrent() {
        let mutex = Arc::new(Mutex::new(0));
        let mut handles = vec![];

        for _ in 0..8 {
            let mutex_clone = Arc::clone(&mutex);
            handles.push(thread::spawn(move || {
                let mut guard = acquire_lock(&mutex_clone);
                *guard += 1;
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*acquire_lock(&mutex), 8);
    }

    #[test]
    fn test_configure_connection() {
        let conn = Connection::open_in_memory().unwrap();
        configure_connection(&conn).unwrap();

        let busy_timeout: i32 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(busy_timeout, 5000);

        let fk: i32 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }
}

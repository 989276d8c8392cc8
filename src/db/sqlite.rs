use std::path::Path;

use rusqlite::Connection;
use tracing;

use super::DatabaseError;

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    // busy_timeout lets concurrent booking requests from separate
    // connections queue on the write lock instead of failing immediately.
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;
         PRAGMA busy_timeout=5000;",
    )?;
    Ok(())
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> =
        vec![(1, include_str!("../../resources/migrations/001_initial.sql"))];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql).map_err(|e| DatabaseError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}

/// Count tables in the database (for verification)
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_initializes_all_tables() {
        let conn = open_memory_database().unwrap();
        // doctors + procedures + appointments + attachments + schema_version
        let count = count_tables(&conn).unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn schema_version_is_current() {
        let conn = open_memory_database().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn migration_idempotent() {
        let conn = open_memory_database().unwrap();
        // Run migrations again — should not error
        let result = run_migrations(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn foreign_keys_enabled() {
        let conn = open_memory_database().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn slot_index_rejects_duplicate_live_rows() {
        let conn = open_memory_database().unwrap();
        conn.execute_batch(
            "INSERT INTO doctors (id, full_name, specialty, license_number)
             VALUES ('d1', 'Dr. Teste', 'general', 'CRM-1');
             INSERT INTO procedures (id, name, category, estimated_duration_minutes)
             VALUES ('p1', 'Hernia repair', 'surgical', 60);
             INSERT INTO appointments (id, hospital_id, scheduled_date, scheduled_time,
                 doctor_id, procedure_id, aih_stage_entered_at, created_at)
             VALUES ('a1', 'h1', '2025-10-01', '08:00:00', 'd1', 'p1',
                 '2025-09-01 09:00:00', '2025-09-01 09:00:00');",
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO appointments (id, hospital_id, scheduled_date, scheduled_time,
                 doctor_id, procedure_id, aih_stage_entered_at, created_at)
             VALUES ('a2', 'h1', '2025-10-01', '08:00:00', 'd1', 'p1',
                 '2025-09-01 09:05:00', '2025-09-01 09:05:00')",
            [],
        );
        assert!(dup.is_err());

        // Soft-deleting the first row frees the slot.
        conn.execute("UPDATE appointments SET deleted = 1 WHERE id = 'a1'", [])
            .unwrap();
        conn.execute(
            "INSERT INTO appointments (id, hospital_id, scheduled_date, scheduled_time,
                 doctor_id, procedure_id, aih_stage_entered_at, created_at)
             VALUES ('a3', 'h1', '2025-10-01', '08:00:00', 'd1', 'p1',
                 '2025-09-01 09:10:00', '2025-09-01 09:10:00')",
            [],
        )
        .unwrap();
    }
}

//! Database schema migrations

use crate::core::error::{ExportError, Result};
use rusqlite::Connection;
use tracing::info;

/// Migration version tracking table
const MIGRATION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
)
"#;

/// Initial schema migration (version 1)
///
/// Reference tables for the administrative hierarchy, the per-year school
/// registration table, and the daily student/staff attendance summaries the
/// export query aggregates over.
const MIGRATION_V1: &str = r#"
-- Administrative hierarchy reference tables
CREATE TABLE IF NOT EXISTS districts (
    district_id INTEGER PRIMARY KEY,
    district_name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS blocks (
    block_id INTEGER PRIMARY KEY,
    district_id INTEGER NOT NULL,
    block_name TEXT NOT NULL,
    FOREIGN KEY (district_id) REFERENCES districts(district_id)
);

CREATE TABLE IF NOT EXISTS clusters (
    cluster_id INTEGER PRIMARY KEY,
    block_id INTEGER NOT NULL,
    cluster_name TEXT NOT NULL,
    FOREIGN KEY (block_id) REFERENCES blocks(block_id)
);

CREATE TABLE IF NOT EXISTS school_managements (
    management_id INTEGER PRIMARY KEY,
    management_name TEXT NOT NULL UNIQUE
);

-- Daily school registration snapshot
CREATE TABLE IF NOT EXISTS school_registrations (
    udise_id TEXT NOT NULL,
    report_date TEXT NOT NULL,
    school_name TEXT NOT NULL,
    district_id INTEGER,
    block_id INTEGER,
    cluster_id INTEGER,
    management_id INTEGER,
    school_category_id INTEGER,
    geography TEXT,
    PRIMARY KEY (udise_id, report_date),
    FOREIGN KEY (district_id) REFERENCES districts(district_id),
    FOREIGN KEY (block_id) REFERENCES blocks(block_id),
    FOREIGN KEY (cluster_id) REFERENCES clusters(cluster_id),
    FOREIGN KEY (management_id) REFERENCES school_managements(management_id)
);

-- Daily student attendance summary, one row per school and class group
CREATE TABLE IF NOT EXISTS student_attendance (
    udise_id TEXT NOT NULL,
    report_date TEXT NOT NULL,
    registered_students INTEGER NOT NULL DEFAULT 0,
    present INTEGER NOT NULL DEFAULT 0
);

-- Daily staff attendance summary, one row per school and staff type
-- staff_type_id 1 is teaching staff, everything else is non-teaching
CREATE TABLE IF NOT EXISTS staff_attendance (
    udise_id TEXT NOT NULL,
    report_date TEXT NOT NULL,
    staff_type_id INTEGER NOT NULL,
    total_staff INTEGER NOT NULL DEFAULT 0,
    present INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_registrations_report_date
    ON school_registrations(report_date);
CREATE INDEX IF NOT EXISTS idx_student_attendance_date
    ON student_attendance(report_date, udise_id);
CREATE INDEX IF NOT EXISTS idx_staff_attendance_date
    ON staff_attendance(report_date, udise_id);
"#;

/// Run all pending database migrations
///
/// Applies schema migrations in order, tracking the applied set in the
/// schema_migrations table.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(MIGRATION_TABLE)
        .map_err(ExportError::DatabaseError)?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(ExportError::DatabaseError)?;

    if current_version < 1 {
        info!("Applying migration v1: Initial schema");
        apply_migration(conn, 1, MIGRATION_V1)?;
    }

    Ok(())
}

/// Apply a single migration inside a transaction
fn apply_migration(conn: &Connection, version: i64, sql: &str) -> Result<()> {
    conn.execute_batch("BEGIN")
        .map_err(ExportError::DatabaseError)?;

    let result = conn.execute_batch(sql).and_then(|_| {
        conn.execute(
            "INSERT INTO schema_migrations (version) VALUES (?)",
            [version],
        )
        .map(|_| ())
    });

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")
                .map_err(ExportError::DatabaseError)?;
            info!("Migration v{} applied successfully", version);
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(ExportError::DatabaseError(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_migrated() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn test_migrations_create_schema() {
        let conn = open_migrated();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();

        for expected in [
            "blocks",
            "clusters",
            "districts",
            "school_managements",
            "school_registrations",
            "schema_migrations",
            "staff_attendance",
            "student_attendance",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = open_migrated();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 1);
    }
}

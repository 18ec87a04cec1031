//! Numbered schema migrations, embedded with `include_str!`.
//!
//! Applied versions are recorded in `schema_version`. Each pending migration
//! runs inside its own transaction together with its version row, so a
//! failure leaves the database at the last good version.
//!
//! Version 1 uses `CREATE TABLE IF NOT EXISTS` with the legacy six-column
//! layout; an existing single-table escalations.db is adopted and upgraded
//! by version 2 without losing rows.

use rusqlite::Connection;

use crate::db::StoreError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "baseline",
        sql: include_str!("migrations/001_baseline.sql"),
    },
    Migration {
        version: 2,
        name: "lifecycle",
        sql: include_str!("migrations/002_lifecycle.sql"),
    },
];

fn latest_known() -> i64 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}

fn applied_version(conn: &Connection) -> Result<i64, StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Hot copy to `<db>.pre-migration.bak` before changing an on-disk schema.
fn snapshot(conn: &Connection) -> Result<(), StoreError> {
    let file: String = conn.query_row("PRAGMA database_list", [], |row| row.get(2))?;
    if file.is_empty() {
        return Ok(());
    }

    let target = format!("{file}.pre-migration.bak");
    let mut dest = Connection::open(&target)?;
    rusqlite::backup::Backup::new(conn, &mut dest)?.step(-1)?;
    log::info!("Schema snapshot written to {}", target);
    Ok(())
}

/// Bring the schema up to date. Returns how many migrations ran.
///
/// Refuses to touch a database stamped with a version newer than any
/// migration compiled into this binary.
pub fn run_migrations(conn: &Connection) -> Result<usize, StoreError> {
    let current = applied_version(conn)?;
    let latest = latest_known();
    if current > latest {
        return Err(StoreError::Migration(format!(
            "database is at schema v{current} but this build of escalateai only knows v{latest}; upgrade escalateai"
        )));
    }

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        return Ok(0);
    }

    snapshot(conn)?;

    for m in &pending {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = conn.execute_batch(m.sql).and_then(|_| {
            conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [m.version])
        });
        match result {
            Ok(_) => conn.execute_batch("COMMIT")?,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(StoreError::Migration(format!(
                    "v{} ({}) failed: {}",
                    m.version, m.name, e
                )));
            }
        }
        log::info!("Schema migrated to v{} ({})", m.version, m.name);
    }

    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_database_gets_every_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), MIGRATIONS.len());
        assert_eq!(applied_version(&conn).unwrap(), latest_known());

        conn.execute(
            "INSERT INTO escalations (subject, body, status, urgency, entities, created_at)
             VALUES ('s', 'b', 'Pending', 'High', '[]', '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO ingested_messages (message_id, escalation_id, ingested_at)
             VALUES ('AAMk-1', 1, '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn legacy_table_keeps_its_rows() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE escalations (id INTEGER PRIMARY KEY, subject TEXT, body TEXT,
                                       status TEXT, urgency TEXT, entities TEXT);
             INSERT INTO escalations (subject, body, status, urgency, entities)
             VALUES ('Outage', 'Site is down', 'Pending', 'High', '[(''Acme'', ''ORG'')]');",
        )
        .unwrap();

        assert_eq!(run_migrations(&conn).unwrap(), 2);

        let (subject, created_at, resolved_at): (String, String, Option<String>) = conn
            .query_row(
                "SELECT subject, created_at, resolved_at FROM escalations WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(subject, "Outage");
        assert_eq!(created_at, "");
        assert_eq!(resolved_at, None);
    }

    #[test]
    fn newer_schema_is_left_alone() {
        let conn = Connection::open_in_memory().unwrap();
        applied_version(&conn).unwrap();
        conn.execute("INSERT INTO schema_version (version) VALUES (42)", [])
            .unwrap();

        let err = run_migrations(&conn).unwrap_err();
        assert!(matches!(err, StoreError::Migration(_)));
        assert!(err.to_string().contains("v42"));
    }

    #[test]
    fn second_run_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 0);
    }

    #[test]
    fn on_disk_upgrade_writes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("escalations.db");
        let conn = Connection::open(&path).unwrap();

        run_migrations(&conn).unwrap();
        assert!(dir.path().join("escalations.db.pre-migration.bak").exists());
    }
}

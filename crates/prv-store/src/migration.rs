//! SQLite schema migrations.
//!
//! Migrations are a table of (version, SQL batch) pairs applied in order
//! inside one transaction. The `schema_migrations` table records what has
//! already run, so opening an existing database is a no-op.

use rusqlite::Connection;
use tracing::info;

use crate::error::{Result, StoreError};

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    // One row per (profile, chat, file). Status is stored as its stable
    // string form; permission flags are nullable 0/1 (absent = unspecified).
    "CREATE TABLE access_records (
        profile_id        TEXT NOT NULL,
        chat_id           TEXT NOT NULL,
        file_ref          TEXT NOT NULL,
        status            TEXT NOT NULL,
        status_code       INTEGER,
        expiry_time       INTEGER,
        allow_download    INTEGER,
        allow_forward     INTEGER,
        access_duration   INTEGER,
        last_applied_seq  INTEGER NOT NULL DEFAULT 0,
        version           INTEGER NOT NULL,
        updated_at        INTEGER NOT NULL,
        PRIMARY KEY (profile_id, chat_id, file_ref)
    );
    CREATE INDEX idx_records_chat ON access_records(profile_id, chat_id);
    CREATE INDEX idx_records_status ON access_records(status);",
)];

/// Latest schema version this build knows.
pub const CURRENT_VERSION: u32 = 1;

/// Bring the database up to [`CURRENT_VERSION`]. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if applied > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database is at schema version {applied}, this build only knows {CURRENT_VERSION}"
        )));
    }
    if applied == CURRENT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > applied) {
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, now_secs()],
        )?;
        info!(version, "schema migration applied");
    }
    tx.commit()?;

    Ok(())
}

fn now_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_fresh_database_gets_full_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables = table_names(&conn);
        assert!(tables.contains(&"access_records".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migrate_twice_is_a_noop() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let rows: u32 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_newer_database_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 0)",
            [],
        )
        .unwrap();

        assert!(matches!(
            migrate(&mut conn),
            Err(StoreError::Migration(_))
        ));
    }
}

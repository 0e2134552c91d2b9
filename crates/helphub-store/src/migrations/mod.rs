pub mod v001_initial;
pub mod v002_priority;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

const CURRENT_VERSION: u32 = 2;

/// Apply any outstanding migrations, bumping `user_version` after each.
///
/// Migrations are additive only; a partially-applied prior run is tolerated
/// (see [`v002_priority`]).
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::info!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking database migrations"
    );

    if current < 1 {
        tracing::info!("applying migration v001_initial");
        v001_initial::up(conn).map_err(|e| StoreError::Migration(e.to_string()))?;
        conn.pragma_update(None, "user_version", 1)?;
    }

    if current < 2 {
        tracing::info!("applying migration v002_priority");
        v002_priority::up(conn).map_err(|e| StoreError::Migration(e.to_string()))?;
        conn.pragma_update(None, "user_version", 2)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn rerunning_migrations_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
    }

    #[test]
    fn v001_database_is_upgraded_in_place() {
        let conn = Connection::open_in_memory().unwrap();
        v001_initial::up(&conn).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();
        conn.execute(
            "INSERT INTO messages (id, from_client, to_client, type, timestamp, body, status)
             VALUES ('m1', 'alpha', 'bravo', 'DIRECT', 1, 'old row', 'PENDING')",
            [],
        )
        .unwrap();

        run_migrations(&conn).unwrap();

        // The pre-existing row picked up the priority default.
        let priority: i64 = conn
            .query_row("SELECT priority FROM messages WHERE id = 'm1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(priority, 1);
    }

    #[test]
    fn duplicate_column_from_partial_run_is_tolerated() {
        let conn = Connection::open_in_memory().unwrap();
        v001_initial::up(&conn).unwrap();
        // Simulate a prior run that added the column but died before the
        // version bump.
        conn.execute(
            "ALTER TABLE messages ADD COLUMN priority INTEGER NOT NULL DEFAULT 1",
            [],
        )
        .unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();

        run_migrations(&conn).unwrap();
    }
}

//! v002 -- Message priority.
//!
//! Adds the `priority` column (default NORMAL) to `messages` so replay can
//! order urgent traffic first. Additive only.

use rusqlite::Connection;

/// Apply the priority migration.
///
/// A prior run may have added the column and crashed before bumping
/// `user_version`; SQLite reports that as "duplicate column name", which is
/// treated as success.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    let result = conn.execute(
        "ALTER TABLE messages ADD COLUMN priority INTEGER NOT NULL DEFAULT 1",
        [],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if e.to_string().contains("duplicate column name") => {
            tracing::debug!("priority column already present, continuing");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

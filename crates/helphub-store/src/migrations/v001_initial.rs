//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `clients` (the identity directory) and
//! `messages` (the durable queue).

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Clients: every identity ever seen, with its last activity stamp
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS clients (
    id        TEXT PRIMARY KEY NOT NULL,
    last_seen INTEGER NOT NULL              -- millisecond epoch
);

-- ----------------------------------------------------------------
-- Messages: one row per stored record, PENDING until acknowledged
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,
    from_client TEXT NOT NULL,
    to_client   TEXT,                       -- NULL for broadcasts
    type        TEXT NOT NULL,
    timestamp   INTEGER NOT NULL,           -- millisecond epoch
    body        TEXT NOT NULL,
    status      TEXT NOT NULL               -- 'PENDING' | 'DELIVERED'
);

CREATE INDEX IF NOT EXISTS idx_messages_to_status
    ON messages(to_client, status);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

//! Typed queries over the `clients` identity directory.

use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::ClientRow;

impl Database {
    /// Record activity for an identity, inserting it on first sight.
    pub fn upsert_last_seen(&self, identity: &str, now_millis: i64) -> Result<()> {
        self.conn().execute(
            "INSERT INTO clients (id, last_seen) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET last_seen = excluded.last_seen",
            params![identity, now_millis],
        )?;
        Ok(())
    }

    /// Look up a directory row. Used by tests and tooling.
    pub fn get_client(&self, identity: &str) -> Result<Option<ClientRow>> {
        use rusqlite::OptionalExtension;

        self.conn()
            .query_row(
                "SELECT id, last_seen FROM clients WHERE id = ?1",
                params![identity],
                |row| {
                    Ok(ClientRow {
                        id: row.get(0)?,
                        last_seen: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_inserts_then_updates() {
        let db = Database::open_in_memory().unwrap();

        db.upsert_last_seen("alpha", 1_000).unwrap();
        assert_eq!(
            db.get_client("alpha").unwrap().unwrap(),
            ClientRow { id: "alpha".into(), last_seen: 1_000 }
        );

        db.upsert_last_seen("alpha", 2_000).unwrap();
        assert_eq!(db.get_client("alpha").unwrap().unwrap().last_seen, 2_000);
    }

    #[test]
    fn unknown_client_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_client("ghost").unwrap().is_none());
    }
}

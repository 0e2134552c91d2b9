//! Typed queries over the `messages` table.

use rusqlite::params;

use helphub_proto::{Priority, Record, RecordKind};

use crate::database::Database;
use crate::error::Result;
use crate::models::{DeliveryStatus, StoredRecord};

impl Database {
    /// Insert a record as PENDING. Idempotent on `id`: re-inserting an
    /// already-stored record is a no-op.
    pub fn insert_record(&self, record: &Record) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO messages
                 (id, from_client, to_client, type, timestamp, body, priority, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.from,
                record.to,
                record.kind.as_str(),
                record.timestamp,
                record.body,
                record.priority.level(),
                DeliveryStatus::Pending.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Transition a row to DELIVERED. An unknown id is a silent no-op.
    pub fn set_delivered(&self, record_id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE messages SET status = ?1 WHERE id = ?2",
            params![DeliveryStatus::Delivered.as_str(), record_id],
        )?;
        Ok(())
    }

    /// All PENDING records owed to `identity`: direct records addressed to
    /// it, plus broadcasts it did not originate. Ordered by priority
    /// descending, then arrival time ascending.
    pub fn pending_for(&self, identity: &str) -> Result<Vec<Record>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, from_client, to_client, type, timestamp, body, priority
             FROM messages
             WHERE (to_client = ?1 AND status = 'PENDING')
                OR (type = 'BROADCAST' AND status = 'PENDING' AND from_client != ?1)
             ORDER BY priority DESC, timestamp ASC",
        )?;

        let rows = stmt.query_map(params![identity], row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Fetch one stored record with its delivery state. Used by tests and
    /// tooling; the relay itself only ever asks for pending batches.
    pub fn get_stored(&self, record_id: &str) -> Result<Option<StoredRecord>> {
        use rusqlite::OptionalExtension;

        self.conn()
            .query_row(
                "SELECT id, from_client, to_client, type, timestamp, body, priority, status
                 FROM messages WHERE id = ?1",
                params![record_id],
                |row| {
                    let record = row_to_record(row)?;
                    let status: String = row.get(7)?;
                    let status = if status == "DELIVERED" {
                        DeliveryStatus::Delivered
                    } else {
                        DeliveryStatus::Pending
                    };
                    Ok(StoredRecord { record, status })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn pending_count(&self) -> Result<i64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE status = 'PENDING'",
                [],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    pub fn total_count(&self) -> Result<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .map_err(Into::into)
    }

    /// Distinct identities with at least one PENDING direct record addressed
    /// to them.
    pub fn recipients_with_pending_direct(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT DISTINCT to_client FROM messages
             WHERE status = 'PENDING' AND to_client IS NOT NULL
             ORDER BY to_client",
        )?;

        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut identities = Vec::new();
        for row in rows {
            identities.push(row?);
        }
        Ok(identities)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    let kind_str: String = row.get(3)?;
    let kind = RecordKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown record kind: {kind_str}").into(),
        )
    })?;

    Ok(Record {
        id: row.get(0)?,
        from: row.get(1)?,
        to: row.get(2)?,
        kind,
        timestamp: row.get(4)?,
        body: row.get(5)?,
        priority: Priority::from_level(row.get(6)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn direct(from: &str, to: &str, body: &str, priority: Priority) -> Record {
        Record::new(RecordKind::Direct, from, Some(to.to_string()), body, priority)
    }

    #[test]
    fn store_and_retrieve_pending_direct() {
        let db = db();
        let msg = direct("alpha", "bravo", "Test", Priority::Normal);
        db.insert_record(&msg).unwrap();

        let pending = db.pending_for("bravo").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, msg.id);
        assert_eq!(pending[0], msg);
    }

    #[test]
    fn delivered_rows_stop_appearing_in_pending() {
        let db = db();
        let msg = direct("alpha", "bravo", "Test", Priority::Normal);
        db.insert_record(&msg).unwrap();
        db.set_delivered(&msg.id).unwrap();

        assert!(db.pending_for("bravo").unwrap().is_empty());
        let stored = db.get_stored(&msg.id).unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Delivered);
    }

    #[test]
    fn marking_an_unknown_id_is_a_silent_no_op() {
        let db = db();
        db.set_delivered("no-such-id").unwrap();
    }

    #[test]
    fn reinserting_the_same_id_is_a_no_op() {
        let db = db();
        let msg = direct("alpha", "bravo", "Test", Priority::Normal);
        db.insert_record(&msg).unwrap();
        db.insert_record(&msg).unwrap();
        assert_eq!(db.total_count().unwrap(), 1);
    }

    #[test]
    fn pending_ordered_by_priority_then_age() {
        let db = db();
        let mut normal = direct("alpha", "charlie", "n", Priority::Normal);
        let mut high = direct("alpha", "charlie", "h", Priority::High);
        let mut low = direct("alpha", "charlie", "l", Priority::Low);
        // Pin distinct arrival times in insertion order.
        normal.timestamp = 100;
        high.timestamp = 200;
        low.timestamp = 300;

        db.insert_record(&normal).unwrap();
        db.insert_record(&high).unwrap();
        db.insert_record(&low).unwrap();

        let pending = db.pending_for("charlie").unwrap();
        let bodies: Vec<&str> = pending.iter().map(|r| r.body.as_str()).collect();
        assert_eq!(bodies, ["h", "n", "l"]);
    }

    #[test]
    fn same_priority_ordered_oldest_first() {
        let db = db();
        let mut second = direct("alpha", "bravo", "second", Priority::Normal);
        let mut first = direct("alpha", "bravo", "first", Priority::Normal);
        second.timestamp = 2_000;
        first.timestamp = 1_000;

        db.insert_record(&second).unwrap();
        db.insert_record(&first).unwrap();

        let pending = db.pending_for("bravo").unwrap();
        let bodies: Vec<&str> = pending.iter().map(|r| r.body.as_str()).collect();
        assert_eq!(bodies, ["first", "second"]);
    }

    #[test]
    fn broadcasts_replay_to_everyone_but_the_originator() {
        let db = db();
        let bcast = Record::new(RecordKind::Broadcast, "alpha", None, "all hear", Priority::Normal);
        db.insert_record(&bcast).unwrap();

        assert_eq!(db.pending_for("bravo").unwrap().len(), 1);
        assert_eq!(db.pending_for("delta").unwrap().len(), 1);
        assert!(db.pending_for("alpha").unwrap().is_empty());
    }

    #[test]
    fn status_rows_are_stored_but_never_replayed() {
        let db = db();
        let status = Record::new(RecordKind::Status, "alpha", None, "online", Priority::Normal);
        db.insert_record(&status).unwrap();

        assert_eq!(db.total_count().unwrap(), 1);
        assert!(db.pending_for("bravo").unwrap().is_empty());
    }

    #[test]
    fn pending_rows_satisfy_the_recipient_predicate() {
        let db = db();
        db.insert_record(&direct("alpha", "bravo", "d1", Priority::Normal)).unwrap();
        db.insert_record(&direct("alpha", "charlie", "d2", Priority::Normal)).unwrap();
        db.insert_record(&Record::new(RecordKind::Broadcast, "bravo", None, "b", Priority::Low))
            .unwrap();

        for record in db.pending_for("bravo").unwrap() {
            let addressed = record.to.as_deref() == Some("bravo");
            let foreign_broadcast =
                record.kind == RecordKind::Broadcast && record.from != "bravo";
            assert!(addressed || foreign_broadcast);
        }
    }

    #[test]
    fn counts_track_pending_and_total() {
        let db = db();
        let a = direct("alpha", "bravo", "a", Priority::Normal);
        let b = direct("alpha", "bravo", "b", Priority::Normal);
        db.insert_record(&a).unwrap();
        db.insert_record(&b).unwrap();
        db.set_delivered(&a.id).unwrap();

        assert_eq!(db.pending_count().unwrap(), 1);
        assert_eq!(db.total_count().unwrap(), 2);
    }

    #[test]
    fn recipients_with_pending_direct_are_distinct_and_exclude_broadcasts() {
        let db = db();
        db.insert_record(&direct("alpha", "bravo", "1", Priority::Normal)).unwrap();
        db.insert_record(&direct("alpha", "bravo", "2", Priority::Normal)).unwrap();
        db.insert_record(&direct("alpha", "charlie", "3", Priority::Normal)).unwrap();
        db.insert_record(&Record::new(RecordKind::Broadcast, "alpha", None, "b", Priority::Normal))
            .unwrap();

        let recipients = db.recipients_with_pending_direct().unwrap();
        assert_eq!(recipients, ["bravo", "charlie"]);
    }
}

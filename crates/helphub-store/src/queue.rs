//! The durable queue: thread-safe facade over the database.
//!
//! The queue exclusively owns the storage handle. Every operation takes the
//! internal mutex for the duration of one synchronous SQLite call, which
//! gives the single-writer semantics the relay relies on; there is no await
//! point while the lock is held.

use std::path::Path;
use std::sync::Mutex;

use helphub_proto::{record::now_millis, Record};

use crate::database::Database;
use crate::error::Result;
use crate::models::StoredRecord;

pub struct Queue {
    db: Mutex<Database>,
}

impl Queue {
    /// Open the queue under a data directory (created if absent).
    pub fn open(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            db: Mutex::new(Database::open_in_dir(data_dir)?),
        })
    }

    /// In-memory queue for tests.
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            db: Mutex::new(Database::open_in_memory()?),
        })
    }

    /// Persist a record as PENDING. Must succeed before any delivery
    /// attempt; the relay aborts routing when this fails.
    pub fn store(&self, record: &Record) -> Result<()> {
        self.lock().insert_record(record)
    }

    /// Transition a stored record to DELIVERED. Unknown ids are ignored.
    pub fn mark_delivered(&self, record_id: &str) -> Result<()> {
        self.lock().set_delivered(record_id)
    }

    /// Ordered replay batch for an identity.
    pub fn pending_for(&self, identity: &str) -> Result<Vec<Record>> {
        self.lock().pending_for(identity)
    }

    /// Stamp current activity for an identity in the directory.
    pub fn upsert_last_seen(&self, identity: &str) -> Result<()> {
        self.lock().upsert_last_seen(identity, now_millis())
    }

    pub fn pending_count(&self) -> Result<i64> {
        self.lock().pending_count()
    }

    pub fn total_count(&self) -> Result<i64> {
        self.lock().total_count()
    }

    /// Distinct identities owed at least one PENDING direct record.
    pub fn identities_with_pending_direct(&self) -> Result<Vec<String>> {
        self.lock().recipients_with_pending_direct()
    }

    /// Fetch one stored record with its status. Test and tooling accessor.
    pub fn get_stored(&self, record_id: &str) -> Result<Option<StoredRecord>> {
        self.lock().get_stored(record_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Database> {
        // A poisoned lock means another thread panicked mid-call; the
        // connection itself is still usable.
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use helphub_proto::{Priority, RecordKind};

    use crate::models::DeliveryStatus;

    #[test]
    fn store_then_ack_then_empty() {
        let queue = Queue::in_memory().unwrap();
        let msg = Record::new(
            RecordKind::Direct,
            "alpha",
            Some("bravo".to_string()),
            "hold for you",
            Priority::Normal,
        );

        queue.store(&msg).unwrap();
        assert_eq!(queue.pending_count().unwrap(), 1);

        queue.mark_delivered(&msg.id).unwrap();
        assert!(queue.pending_for("bravo").unwrap().is_empty());
        assert_eq!(
            queue.get_stored(&msg.id).unwrap().unwrap().status,
            DeliveryStatus::Delivered
        );
    }

    #[test]
    fn queue_is_shareable_across_threads() {
        use std::sync::Arc;

        let queue = Arc::new(Queue::in_memory().unwrap());
        let mut handles = Vec::new();
        for i in 0..4 {
            let queue = queue.clone();
            handles.push(std::thread::spawn(move || {
                for j in 0..25 {
                    let msg = Record::new(
                        RecordKind::Direct,
                        "alpha",
                        Some("bravo".to_string()),
                        format!("{i}-{j}"),
                        Priority::Normal,
                    );
                    queue.store(&msg).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.total_count().unwrap(), 100);
    }

    #[test]
    fn last_seen_updates_through_the_queue() {
        let queue = Queue::in_memory().unwrap();
        queue.upsert_last_seen("alpha").unwrap();
        let row = queue.lock().get_client("alpha").unwrap().unwrap();
        assert!(row.last_seen > 0);
    }
}

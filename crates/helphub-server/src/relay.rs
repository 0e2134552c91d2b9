//! The routing core.
//!
//! Single authority over the live-identity tables. Both transports register
//! their sessions here; every routable record flows through [`Relay::route`].
//! The tables sit behind one mutex with short critical sections; delivery
//! writes always happen after the lock is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use helphub_proto::{Record, RecordKind};
use helphub_store::Queue;

use crate::error::ServerError;
use crate::msglog::MessageLog;
use crate::session::{SessionHandle, Transport};

/// Result of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Accepted,
    /// The identity is live on either transport.
    DuplicateId,
    /// Empty or whitespace-only identity.
    EmptyId,
}

#[derive(Default)]
struct Tables {
    framed: HashMap<String, Arc<SessionHandle>>,
    push: HashMap<String, Arc<SessionHandle>>,
}

impl Tables {
    fn table_mut(&mut self, transport: Transport) -> &mut HashMap<String, Arc<SessionHandle>> {
        match transport {
            Transport::Framed => &mut self.framed,
            Transport::Push => &mut self.push,
        }
    }

    fn lookup(&self, identity: &str) -> Option<&Arc<SessionHandle>> {
        self.framed.get(identity).or_else(|| self.push.get(identity))
    }

    fn contains(&self, identity: &str) -> bool {
        self.framed.contains_key(identity) || self.push.contains_key(identity)
    }
}

/// One live session as reported to the admin surfaces.
#[derive(Debug, Clone)]
pub struct OnlineSession {
    pub identity: String,
    pub transport: Transport,
    pub last_activity: i64,
}

pub struct Relay {
    queue: Arc<Queue>,
    msglog: Arc<MessageLog>,
    tables: Mutex<Tables>,
}

impl Relay {
    pub fn new(queue: Arc<Queue>, msglog: Arc<MessageLog>) -> Self {
        Self {
            queue,
            msglog,
            tables: Mutex::new(Tables::default()),
        }
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// Bind an identity to a session and replay its pending records.
    ///
    /// Uniqueness is checked and the table updated under one lock; the
    /// directory upsert and the replay flush run after the lock is dropped.
    pub fn register(&self, identity: &str, session: Arc<SessionHandle>) -> RegisterOutcome {
        if identity.trim().is_empty() {
            return RegisterOutcome::EmptyId;
        }

        {
            let mut tables = self.lock_tables();
            if tables.contains(identity) {
                return RegisterOutcome::DuplicateId;
            }
            tables
                .table_mut(session.transport())
                .insert(identity.to_string(), session.clone());
        }

        info!(
            client_id = %identity,
            transport = session.transport().label(),
            "client registered"
        );

        if let Err(e) = self.queue.upsert_last_seen(identity) {
            warn!(client_id = %identity, error = %e, "failed to update client directory");
        }
        self.flush_pending(identity);

        RegisterOutcome::Accepted
    }

    /// Remove an identity binding, but only if it still belongs to the given
    /// session. A late removal racing a re-registration must not evict the
    /// newcomer.
    pub fn unregister(&self, identity: &str, session_id: Uuid) {
        let mut tables = self.lock_tables();
        let Tables { framed, push } = &mut *tables;
        for table in [framed, push] {
            if table
                .get(identity)
                .is_some_and(|current| current.session_id() == session_id)
            {
                table.remove(identity);
            }
        }
    }

    /// Snapshot check across both transport tables.
    pub fn is_taken(&self, identity: &str) -> bool {
        self.lock_tables().contains(identity)
    }

    /// Persist a record, then fan it out to live recipients.
    ///
    /// The PENDING row is durable before any delivery attempt; a storage
    /// failure aborts routing so the record is never half-delivered.
    pub fn route(&self, record: &Record) -> Result<(), ServerError> {
        info!(
            from = %record.from,
            to = record.to.as_deref().unwrap_or("ALL"),
            kind = %record.kind,
            "routing record"
        );

        if let Err(e) = self.queue.store(record) {
            error!(record_id = %record.id, error = %e, "record not persisted, aborting route");
            return Err(e.into());
        }
        self.msglog.append(record);

        match record.kind {
            RecordKind::Direct => {
                let to = record.to.as_deref().unwrap_or_default();
                let target = self.lock_tables().lookup(to).cloned();
                match target {
                    Some(session) => {
                        session.send(record.to_wire());
                        debug!(client_id = %to, "delivered direct record to online client");
                    }
                    None => {
                        debug!(client_id = %to, "queued direct record for offline client");
                    }
                }
            }
            RecordKind::Broadcast => {
                let recipients: Vec<Arc<SessionHandle>> = {
                    let tables = self.lock_tables();
                    tables
                        .framed
                        .values()
                        .chain(tables.push.values())
                        .filter(|s| s.identity() != record.from)
                        .cloned()
                        .collect()
                };
                let line = record.to_wire();
                for session in &recipients {
                    session.send(line.clone());
                }
                debug!(recipients = recipients.len(), "broadcast fanned out");
            }
            // ACK, HEARTBEAT, and STATUS are handled by the per-session
            // inbound loops; nothing to fan out.
            _ => {}
        }

        Ok(())
    }

    /// Write the ordered pending batch to an identity's current session.
    pub fn flush_pending(&self, identity: &str) {
        let pending = match self.queue.pending_for(identity) {
            Ok(pending) => pending,
            Err(e) => {
                error!(client_id = %identity, error = %e, "failed to load pending records");
                return;
            }
        };
        if pending.is_empty() {
            return;
        }

        let Some(session) = self.lock_tables().lookup(identity).cloned() else {
            return;
        };

        info!(client_id = %identity, count = pending.len(), "replaying pending records");
        for record in &pending {
            session.send(record.to_wire());
        }
    }

    /// Terminate an identity's live session, if any. Returns whether a
    /// session was found.
    pub fn force_disconnect(&self, identity: &str) -> bool {
        let target = self.lock_tables().lookup(identity).cloned();
        match target {
            Some(session) => {
                info!(client_id = %identity, "operator disconnect");
                session.close();
                true
            }
            None => false,
        }
    }

    /// Framed sessions whose last activity is at or before `cutoff`.
    /// Gathered under the lock; the caller disconnects them outside it.
    pub fn framed_idle_since(&self, cutoff: i64) -> Vec<Arc<SessionHandle>> {
        self.lock_tables()
            .framed
            .values()
            .filter(|s| s.last_activity() <= cutoff)
            .cloned()
            .collect()
    }

    /// Snapshot of every live session, framed then push.
    pub fn online_sessions(&self) -> Vec<OnlineSession> {
        let tables = self.lock_tables();
        tables
            .framed
            .values()
            .chain(tables.push.values())
            .map(|s| OnlineSession {
                identity: s.identity().to_string(),
                transport: s.transport(),
                last_activity: s.last_activity(),
            })
            .collect()
    }

    pub fn online_count(&self) -> usize {
        let tables = self.lock_tables();
        tables.framed.len() + tables.push.len()
    }

    /// Cancel every live session. Used during shutdown.
    pub fn close_all_sessions(&self) {
        let sessions: Vec<Arc<SessionHandle>> = {
            let tables = self.lock_tables();
            tables.framed.values().chain(tables.push.values()).cloned().collect()
        };
        for session in sessions {
            session.close();
        }
    }

    fn lock_tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

//! Live session handles.
//!
//! A [`SessionHandle`] is the relay's view of one connected endpoint: its
//! identity, which transport it arrived on, an activity stamp, a send sink,
//! and a cancellation token. The transport task owns the real socket; the
//! handle only publishes to the sink and can request termination, so a
//! handle outliving its connection is harmless.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use helphub_proto::record::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Framed,
    Push,
}

impl Transport {
    /// Operator-facing label, as reported on the control plane.
    pub fn label(&self) -> &'static str {
        match self {
            Transport::Framed => "TCP",
            Transport::Push => "Web",
        }
    }
}

pub struct SessionHandle {
    session_id: Uuid,
    identity: String,
    transport: Transport,
    sink: mpsc::UnboundedSender<String>,
    last_activity: AtomicI64,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn new(
        identity: String,
        transport: Transport,
        sink: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            session_id: Uuid::new_v4(),
            identity,
            transport,
            sink,
            last_activity: AtomicI64::new(now_millis()),
            cancel,
        })
    }

    /// Unique per connection; distinguishes a stale handle from a fresh
    /// session that reused the same identity.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Best-effort enqueue onto the session's single-writer sink.
    /// Returns `false` once the writer has gone away.
    pub fn send(&self, line: String) -> bool {
        self.sink.send(line).is_ok()
    }

    /// Refresh the activity stamp. `fetch_max` keeps the stamp monotonic
    /// even if the clock steps backwards between concurrent touches.
    pub fn touch(&self) {
        self.last_activity.fetch_max(now_millis(), Ordering::Relaxed);
    }

    /// Millisecond epoch of the most recent inbound activity.
    pub fn last_activity(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    /// Request termination. The owning transport task observes the token,
    /// closes the socket, and runs disconnect cleanup.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (Arc<SessionHandle>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = SessionHandle::new(
            "alpha".to_string(),
            Transport::Framed,
            tx,
            CancellationToken::new(),
        );
        (session, rx)
    }

    #[test]
    fn send_enqueues_until_receiver_drops() {
        let (session, mut rx) = handle();
        assert!(session.send("one".to_string()));
        assert_eq!(rx.try_recv().unwrap(), "one");

        drop(rx);
        assert!(!session.send("two".to_string()));
    }

    #[test]
    fn touch_never_decreases_the_stamp() {
        let (session, _rx) = handle();
        let initial = session.last_activity();
        session.touch();
        assert!(session.last_activity() >= initial);
    }

    #[test]
    fn close_trips_the_token() {
        let (session, _rx) = handle();
        assert!(!session.is_closed());
        session.close();
        assert!(session.is_closed());
    }

    #[test]
    fn session_ids_are_unique_per_connection() {
        let (a, _rxa) = handle();
        let (b, _rxb) = handle();
        assert_ne!(a.session_id(), b.session_id());
    }
}

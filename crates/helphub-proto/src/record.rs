//! The record: the single unit of exchange and storage.
//!
//! A [`Record`] is immutable once constructed. Records arriving off the wire
//! without an id, timestamp, or priority are completed with server-assigned
//! defaults during parsing (see [`Record::from_wire`]).

use chrono::Utc;
use uuid::Uuid;

use crate::constants::HEARTBEAT_BODY;

/// What a record means to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Addressed to exactly one identity; queued if the recipient is offline.
    Direct,
    /// Fanned out to every live session except the originator.
    Broadcast,
    /// Carries presence only; used by the push transport to register.
    Status,
    /// Acknowledges delivery of the record whose id is in the body.
    Ack,
    /// Keep-alive; refreshes the sender's activity stamps.
    Heartbeat,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Direct => "DIRECT",
            RecordKind::Broadcast => "BROADCAST",
            RecordKind::Status => "STATUS",
            RecordKind::Ack => "ACK",
            RecordKind::Heartbeat => "HEARTBEAT",
        }
    }

    /// Strict parse; an unknown kind is a parse failure, not a default.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DIRECT" => Some(RecordKind::Direct),
            "BROADCAST" => Some(RecordKind::Broadcast),
            "STATUS" => Some(RecordKind::Status),
            "ACK" => Some(RecordKind::Ack),
            "HEARTBEAT" => Some(RecordKind::Heartbeat),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery priority. Replay order is priority descending, then age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    pub fn level(&self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
        }
    }

    /// Unknown levels fall back to [`Priority::Normal`].
    pub fn from_level(level: i64) -> Self {
        match level {
            0 => Priority::Low,
            2 => Priority::High,
            _ => Priority::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Normal => "NORMAL",
            Priority::High => "HIGH",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message as it travels the wire and rests in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Opaque unique id, fresh at creation.
    pub id: String,
    pub kind: RecordKind,
    /// Identity of the originator.
    pub from: String,
    /// Recipient identity; `None` for broadcasts and non-addressed kinds.
    pub to: Option<String>,
    /// Millisecond epoch timestamp at origination.
    pub timestamp: i64,
    /// Opaque UTF-8 payload. For an ACK this is the acknowledged record id.
    pub body: String,
    pub priority: Priority,
}

impl Record {
    /// Construct a fresh record with a new id and the current time.
    pub fn new(
        kind: RecordKind,
        from: impl Into<String>,
        to: Option<String>,
        body: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            from: from.into(),
            to,
            timestamp: now_millis(),
            body: body.into(),
            priority,
        }
    }

    /// Acknowledgment for a delivered record.
    pub fn ack(from: impl Into<String>, acknowledged_id: impl Into<String>) -> Self {
        Self::new(RecordKind::Ack, from, None, acknowledged_id, Priority::Normal)
    }

    /// Keep-alive record.
    pub fn heartbeat(from: impl Into<String>) -> Self {
        Self::new(RecordKind::Heartbeat, from, None, HEARTBEAT_BODY, Priority::Normal)
    }

    /// Whether the relay fans this record out (as opposed to handling it in
    /// the per-session inbound loop).
    pub fn is_routable(&self) -> bool {
        matches!(self.kind, RecordKind::Direct | RecordKind::Broadcast)
    }
}

/// Current wall-clock time as millisecond epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_carries_acknowledged_id_in_body() {
        let ack = Record::ack("alpha", "some-id");
        assert_eq!(ack.kind, RecordKind::Ack);
        assert_eq!(ack.from, "alpha");
        assert_eq!(ack.to, None);
        assert_eq!(ack.body, "some-id");
        assert_eq!(ack.priority, Priority::Normal);
    }

    #[test]
    fn heartbeat_uses_sentinel_body() {
        let hb = Record::heartbeat("bravo");
        assert_eq!(hb.kind, RecordKind::Heartbeat);
        assert_eq!(hb.body, HEARTBEAT_BODY);
        assert_eq!(hb.to, None);
    }

    #[test]
    fn fresh_records_get_unique_ids() {
        let a = Record::new(RecordKind::Direct, "a", Some("b".into()), "x", Priority::Normal);
        let b = Record::new(RecordKind::Direct, "a", Some("b".into()), "x", Priority::Normal);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn unknown_priority_level_falls_back_to_normal() {
        assert_eq!(Priority::from_level(0), Priority::Low);
        assert_eq!(Priority::from_level(1), Priority::Normal);
        assert_eq!(Priority::from_level(2), Priority::High);
        assert_eq!(Priority::from_level(7), Priority::Normal);
        assert_eq!(Priority::from_level(-1), Priority::Normal);
    }

    #[test]
    fn kind_parse_is_strict() {
        assert_eq!(RecordKind::parse("DIRECT"), Some(RecordKind::Direct));
        assert_eq!(RecordKind::parse("direct"), None);
        assert_eq!(RecordKind::parse("NOPE"), None);
    }
}

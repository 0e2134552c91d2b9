//! Line-delimited textual encoding used on every client-facing channel.
//!
//! A record is one line. Serialization is built by hand because the key
//! order and the quoted `"null"` recipient token are part of the wire
//! contract; parsing goes through serde_json and is deliberately tolerant:
//! `type`, `from`, and `body` are required, everything else is defaulted,
//! unknown keys are ignored, and any failure yields `None` so the caller can
//! discard the line and keep reading.

use serde::Deserialize;

use crate::record::{now_millis, Priority, Record, RecordKind};

/// All-optional shadow of the wire object; tolerance lives here.
#[derive(Debug, Deserialize)]
struct WireRecord {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    from: Option<String>,
    to: Option<String>,
    timestamp: Option<i64>,
    body: Option<String>,
    priority: Option<i64>,
}

impl Record {
    /// Emit the single-line wire form.
    ///
    /// Keys appear in the fixed order `id,type,from,to,timestamp,body,priority`
    /// and an absent recipient is emitted as the string `"null"`.
    pub fn to_wire(&self) -> String {
        format!(
            "{{\"id\":\"{}\",\"type\":\"{}\",\"from\":\"{}\",\"to\":\"{}\",\"timestamp\":{},\"body\":\"{}\",\"priority\":{}}}",
            escape(&self.id),
            self.kind,
            escape(&self.from),
            self.to.as_deref().map_or_else(|| "null".to_string(), escape),
            self.timestamp,
            escape(&self.body),
            self.priority.level(),
        )
    }

    /// Parse one wire line; `None` means the line should be discarded.
    pub fn from_wire(line: &str) -> Option<Self> {
        let wire: WireRecord = serde_json::from_str(line).ok()?;

        let kind = RecordKind::parse(&wire.kind?)?;
        let from = wire.from?;
        let body = wire.body?;

        let to = match wire.to {
            None => None,
            Some(t) if t == "null" => None,
            Some(t) => Some(t),
        };

        Some(Record {
            id: wire.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            kind,
            from,
            to,
            timestamp: wire.timestamp.unwrap_or_else(now_millis),
            body,
            priority: wire.priority.map_or(Priority::Normal, Priority::from_level),
        })
    }
}

/// Single error frame sent to a session that failed registration.
pub fn error_frame(reason: &str) -> String {
    format!("{{\"type\":\"ERROR\",\"body\":\"{}\"}}", escape(reason))
}

// Backslash and double quote per the wire contract; control characters are
// additionally escaped so the emitted line is always one valid JSON object.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_all_fields() {
        let original = Record::new(
            RecordKind::Direct,
            "alpha",
            Some("bravo".to_string()),
            "hold for you",
            Priority::Normal,
        );
        let parsed = Record::from_wire(&original.to_wire()).expect("should parse");
        assert_eq!(parsed, original);
    }

    #[test]
    fn round_trip_with_quotes_and_backslashes() {
        let body = r#"He said, "C:\temp is \"safe\"""#;
        let original = Record::new(RecordKind::Broadcast, "charlie", None, body, Priority::Normal);
        let parsed = Record::from_wire(&original.to_wire()).expect("should parse");
        assert_eq!(parsed.body, body);
        assert_eq!(parsed.to, None);
    }

    #[test]
    fn round_trip_with_non_ascii_body() {
        let body = "Überschwemmung an der Brücke — 救援已到 🚑";
        let original = Record::new(RecordKind::Direct, "alpha", Some("bravo".into()), body, Priority::High);
        let parsed = Record::from_wire(&original.to_wire()).expect("should parse");
        assert_eq!(parsed.body, body);
    }

    #[test]
    fn wire_form_has_expected_shape() {
        let record = Record::new(RecordKind::Broadcast, "admin", None, "SOS", Priority::High);
        let wire = record.to_wire();
        assert!(wire.starts_with(&format!("{{\"id\":\"{}\",\"type\":\"BROADCAST\"", record.id)));
        assert!(wire.contains("\"to\":\"null\""));
        assert!(wire.contains("\"priority\":2"));
        assert!(!wire.contains('\n'));
    }

    #[test]
    fn missing_optional_fields_get_server_defaults() {
        let before = now_millis();
        let parsed = Record::from_wire(r#"{"type":"DIRECT","from":"alpha","to":"bravo","body":"hi"}"#)
            .expect("should parse");
        assert!(!parsed.id.is_empty());
        assert!(parsed.timestamp >= before);
        assert_eq!(parsed.priority, Priority::Normal);
        assert_eq!(parsed.to.as_deref(), Some("bravo"));
    }

    #[test]
    fn missing_required_fields_yield_none() {
        // no type
        assert!(Record::from_wire(r#"{"from":"alpha","body":"hi"}"#).is_none());
        // no from
        assert!(Record::from_wire(r#"{"type":"DIRECT","body":"hi"}"#).is_none());
        // no body
        assert!(Record::from_wire(r#"{"type":"DIRECT","from":"alpha"}"#).is_none());
    }

    #[test]
    fn unknown_kind_yields_none() {
        assert!(Record::from_wire(r#"{"type":"SIDEWAYS","from":"alpha","body":"hi"}"#).is_none());
    }

    #[test]
    fn malformed_line_yields_none() {
        assert!(Record::from_wire(r#"{"id":"123", "type":"DIRECT" "from":"alpha"}"#).is_none());
        assert!(Record::from_wire("not json at all").is_none());
        assert!(Record::from_wire("").is_none());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let parsed = Record::from_wire(
            r#"{"type":"DIRECT","from":"a","to":"b","body":"x","deliveredTimestamp":12345,"hops":3}"#,
        )
        .expect("should parse");
        assert_eq!(parsed.from, "a");
    }

    #[test]
    fn null_token_recipient_is_absent() {
        let parsed = Record::from_wire(r#"{"type":"BROADCAST","from":"a","to":"null","body":"x"}"#)
            .expect("should parse");
        assert_eq!(parsed.to, None);
    }

    #[test]
    fn error_frame_is_single_json_object() {
        assert_eq!(
            error_frame("ID_TAKEN"),
            r#"{"type":"ERROR","body":"ID_TAKEN"}"#
        );
    }
}

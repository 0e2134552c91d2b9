use helphub_proto::Record;

/// Delivery state of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Delivered => "DELIVERED",
        }
    }
}

/// A record as it rests in the queue, together with its delivery state.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub record: Record,
    pub status: DeliveryStatus,
}

/// One row of the identity directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRow {
    pub id: String,
    /// Millisecond epoch of the last inbound activity.
    pub last_seen: i64,
}

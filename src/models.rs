use serde::{Deserialize, Serialize};

// ============================================================================
// Domain Models
// ============================================================================

/// A library event as carried on the wire.
///
/// `id` is absent until the repository assigns one (NEW events); UPDATE
/// events must reference an existing entity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    pub id: Option<i32>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub book: Book,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Book {
    pub id: i32,
    pub name: String,
}

/// Event discriminator. Producers may evolve ahead of this consumer, so an
/// unrecognized value deserializes to `Unknown` instead of failing.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    New,
    Update,
    #[serde(other)]
    Unknown,
}

// ============================================================================
// Consumer Record
// ============================================================================

/// Broker-independent identity of a consumed message.
///
/// Built from a live Kafka message by the consumers, or reconstructed from a
/// stored `FailureRecord` by the recovery scheduler.
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<i32>,
    pub payload: String,
}

impl EventRecord {
    /// Integer keys travel as 4-byte big-endian, matching the producer.
    pub fn decode_key(raw: Option<&[u8]>) -> Option<i32> {
        raw.and_then(|bytes| bytes.try_into().ok()).map(i32::from_be_bytes)
    }

    pub fn encode_key(key: i32) -> [u8; 4] {
        key.to_be_bytes()
    }
}

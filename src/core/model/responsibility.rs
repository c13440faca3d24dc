use std::fmt;
use std::fmt::{Debug, Formatter};

/// Responsibility is a named opaque payload owned by the ring node whose id follows the hash of the
/// identifier, and replicated to the owner's successors.
///
/// The timestamp is the watermark used by replicas to pull only newer versions from the owner.
/// An entry without a timestamp is always treated as older than any timestamped one.
#[derive(Clone, PartialEq, Eq)]
pub struct Responsibility {
    identifier: String,
    payload: Vec<u8>,
    timestamp: Option<u64>,
}

impl Responsibility {
    pub fn new(identifier: impl Into<String>, payload: Vec<u8>, timestamp: Option<u64>) -> Self {
        Responsibility {
            identifier: identifier.into(),
            payload,
            timestamp,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.timestamp
    }

    /// Returns a copy carrying the given watermark.
    pub fn with_timestamp(&self, timestamp: u64) -> Self {
        Responsibility {
            identifier: self.identifier.clone(),
            payload: self.payload.clone(),
            timestamp: Some(timestamp),
        }
    }

    /// Returns true if this entry is strictly newer than the given watermark.
    pub fn is_newer_than(&self, watermark: Option<u64>) -> bool {
        match (self.timestamp, watermark) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(mine), Some(theirs)) => mine > theirs,
        }
    }
}

// Payloads are opaque bytes; show them as hex rather than a decimal byte list.
impl Debug for Responsibility {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responsibility")
            .field("identifier", &self.identifier)
            .field("payload", &hex::encode(&self.payload))
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

//! Error taxonomy of the ring.

use crate::core::Address;

/// Result alias used by every ring operation.
pub type ChordResult<T> = Result<T, ChordError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChordError {
    /// Malformed input, rejected before any ring arithmetic takes place.
    #[error("validation failure: {0}")]
    Validation(String),

    /// The peer did not answer in time or the transport failed. Both are treated as peer death.
    #[error("peer {address} unreachable: {reason}")]
    PeerUnreachable { address: Address, reason: String },

    /// Business-rule refusal, e.g. leaving while the predecessor is unknown.
    #[error("operation rejected: {0}")]
    OperationRejected(String),

    /// A peer answered with something the protocol does not expect at this point.
    #[error("protocol inconsistency: {0}")]
    ProtocolInconsistency(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChordError {
    pub fn unreachable(address: Address, reason: impl ToString) -> Self {
        ChordError::PeerUnreachable {
            address,
            reason: reason.to_string(),
        }
    }

    /// Returns true if the error means the peer must be considered dead.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ChordError::PeerUnreachable { .. })
    }
}

impl From<anyhow::Error> for ChordError {
    fn from(err: anyhow::Error) -> Self {
        ChordError::Internal(format!("{err:#}"))
    }
}

use crate::core::ring;
use crate::core::{Address, Identifier};
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

/// PeerRef is an immutable (address, id) pair naming one ring member.
/// Two PeerRefs are equal iff their addresses are equal; the id is derived from the address.
#[derive(Copy)]
pub struct PeerRef {
    address: Address,
    id: Identifier,
}

#[allow(useless_deprecated)]
impl Clone for PeerRef {
    #[deprecated(note = "This type is Copy; prefer implicit copying instead of .clone()")]
    fn clone(&self) -> Self {
        *self
    }
}

impl PeerRef {
    /// Create a PeerRef for the given address on a ring of `2^bits` positions.
    pub fn new(address: Address, bits: u32) -> PeerRef {
        PeerRef {
            address,
            id: ring::hash(&address.to_string(), bits),
        }
    }

    /// Get the address of the peer
    pub fn address(&self) -> Address {
        self.address
    }

    /// Get the ring identifier of the peer
    pub fn id(&self) -> Identifier {
        self.id
    }
}

impl PartialEq for PeerRef {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for PeerRef {}

impl Hash for PeerRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl Display for PeerRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.address, self.id)
    }
}

impl Debug for PeerRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

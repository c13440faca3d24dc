use std::fmt;
use std::fmt::{Debug, Display, Formatter};

/// Identifier is a position on the ring: either a node id or a key.
/// Values are kept reduced into `[0, 2^M)` by the ring arithmetic that creates them; the identifier
/// itself does not carry the bit-width.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Identifier(u64);

impl Identifier {
    pub const fn new(value: u64) -> Identifier {
        Identifier(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the identifier reduced into a ring of `2^bits` positions.
    pub const fn reduce(&self, bits: u32) -> Identifier {
        Identifier(self.0 & mask(bits))
    }
}

/// All-ones mask for the low `bits` bits.
pub(crate) const fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

impl From<u64> for Identifier {
    fn from(value: u64) -> Self {
        Identifier(value)
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Same rendering for {:?} so spans and log lines stay compact.
impl Debug for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

//! Ring arithmetic: hashing into the identifier space and circular interval predicates.
//!
//! Every function here is pure. Interval predicates are total over their inputs; callers reduce keys
//! into the ring before calling them.

use crate::core::error::ChordError;
use crate::core::model::identifier::mask;
use crate::core::Identifier;
use sha1::{Digest, Sha1};

/// Hashes an address (or any responsibility identifier) into a ring of `2^bits` positions.
/// The SHA-1 digest is truncated to its first eight bytes, read big-endian, then reduced.
pub fn hash(address: &str, bits: u32) -> Identifier {
    let mut hasher = Sha1::new();
    hasher.update(address.as_bytes());
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    Identifier::new(u64::from_be_bytes(head)).reduce(bits)
}

/// Returns `key` reduced into a ring of `2^bits` positions.
pub fn reduce(key: u64, bits: u32) -> Identifier {
    Identifier::new(key).reduce(bits)
}

/// Number of positions on a ring of `bits` bits. Only meaningful up to 63 bits.
pub fn ring_size(bits: u32) -> u64 {
    mask(bits).wrapping_add(1)
}

/// Start of the i-th finger interval: `(id + 2^i) mod 2^bits`.
pub fn finger_start(id: Identifier, i: usize, bits: u32) -> Identifier {
    let offset = 1u64.checked_shl(i as u32).unwrap_or(0);
    Identifier::new(id.value().wrapping_add(offset) & mask(bits))
}

/// Parses a textual key, rejecting non-numeric input before any ring arithmetic takes place.
pub fn parse_key(key: &str, bits: u32) -> Result<Identifier, ChordError> {
    key.trim()
        .parse::<u64>()
        .map(|k| reduce(k, bits))
        .map_err(|e| ChordError::Validation(format!("invalid ring key {key:?}: {e}")))
}

/// True iff `key` lies strictly between `lo` and `hi` walking clockwise.
/// When `lo >= hi` the interval wraps through zero.
pub fn in_range_exclusive(key: Identifier, lo: Identifier, hi: Identifier) -> bool {
    if lo < hi {
        lo < key && key < hi
    } else {
        lo < key || key < hi
    }
}

/// Same as [`in_range_exclusive`] with `hi` included.
pub fn in_range_inclusive(key: Identifier, lo: Identifier, hi: Identifier) -> bool {
    if lo < hi {
        lo < key && key <= hi
    } else {
        lo < key || key <= hi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(v: u64) -> Identifier {
        Identifier::new(v)
    }

    #[test]
    fn test_in_range_exclusive_wraparound() {
        // 250 -> 255 -> 0 -> 5 contains 2 but not 6.
        assert!(in_range_exclusive(id(2), id(250), id(5)));
        assert!(!in_range_exclusive(id(6), id(250), id(5)));
        assert!(in_range_exclusive(id(255), id(250), id(5)));
        assert!(in_range_exclusive(id(0), id(250), id(5)));
        assert!(!in_range_exclusive(id(250), id(250), id(5)));
        assert!(!in_range_exclusive(id(5), id(250), id(5)));
    }

    #[test]
    fn test_in_range_exclusive_plain() {
        assert!(in_range_exclusive(id(11), id(10), id(20)));
        assert!(in_range_exclusive(id(19), id(10), id(20)));
        assert!(!in_range_exclusive(id(10), id(10), id(20)));
        assert!(!in_range_exclusive(id(20), id(10), id(20)));
        assert!(!in_range_exclusive(id(200), id(10), id(20)));
    }

    /// With lo == hi the interval is the whole ring minus that single point.
    #[test]
    fn test_in_range_degenerate() {
        for k in 0..256 {
            assert_eq!(in_range_exclusive(id(k), id(40), id(40)), k != 40);
            assert!(in_range_inclusive(id(k), id(40), id(40)));
        }
    }

    #[test]
    fn test_in_range_inclusive() {
        assert!(in_range_inclusive(id(20), id(10), id(20)));
        assert!(!in_range_inclusive(id(10), id(10), id(20)));
        assert!(in_range_inclusive(id(5), id(250), id(5)));
        assert!(!in_range_inclusive(id(250), id(250), id(5)));
        assert!(!in_range_inclusive(id(6), id(250), id(5)));
    }

    #[test]
    fn test_hash_is_deterministic_and_reduced() {
        for port in 0..200 {
            let address = format!("127.0.0.1:{}", 7000 + port);
            let narrow = hash(&address, 8);
            assert!(narrow.value() < 256);
            assert_eq!(narrow, hash(&address, 8));
            // Narrow ids are the low bits of the wide id.
            assert_eq!(narrow, hash(&address, 32).reduce(8));
        }
    }

    #[test]
    fn test_finger_start() {
        assert_eq!(finger_start(id(10), 0, 8), id(11));
        assert_eq!(finger_start(id(10), 3, 8), id(18));
        assert_eq!(finger_start(id(200), 7, 8), id(72));
        assert_eq!(finger_start(id(255), 0, 8), id(0));
    }

    #[test]
    fn test_ring_size() {
        assert_eq!(ring_size(1), 2);
        assert_eq!(ring_size(8), 256);
        assert_eq!(ring_size(63), 1 << 63);
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("17", 8).unwrap(), id(17));
        assert_eq!(parse_key(" 300 ", 8).unwrap(), id(44));
        assert!(matches!(parse_key("weather", 8), Err(ChordError::Validation(_))));
        assert!(matches!(parse_key("", 8), Err(ChordError::Validation(_))));
        assert!(matches!(parse_key("-1", 8), Err(ChordError::Validation(_))));
    }
}

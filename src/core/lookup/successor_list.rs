use crate::core::error::{ChordError, ChordResult};
use crate::core::PeerRef;
use std::fmt::{Debug, Formatter};
use tracing::{Level, Span};

/// SuccessorList keeps the next R successors of a node.
/// Entry 0 is the canonical successor; entry i approximates the successor of entry i - 1 and is
/// only used as a fallback when the entries before it have died.
pub struct SuccessorList {
    entries: Vec<PeerRef>,
    span: Span,
}

impl SuccessorList {
    /// Create a list of `size` entries all pointing to `owner` (a one-node ring).
    pub fn new(parent_span: &Span, owner: PeerRef, size: usize) -> SuccessorList {
        let span = tracing::span!(parent: parent_span, Level::INFO, "successor_list");
        SuccessorList {
            entries: vec![owner; size],
            span,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The canonical successor.
    pub fn first(&self) -> PeerRef {
        self.entries[0]
    }

    pub fn get(&self, index: usize) -> ChordResult<PeerRef> {
        self.entries.get(index).copied().ok_or_else(|| {
            ChordError::Validation(format!(
                "successor index {} is out of bounds, list has {} entries",
                index,
                self.entries.len()
            ))
        })
    }

    pub fn set(&mut self, index: usize, peer: PeerRef) -> ChordResult<()> {
        let len = self.entries.len();
        let slot = self.entries.get_mut(index).ok_or_else(|| {
            ChordError::Validation(format!(
                "successor index {index} is out of bounds, list has {len} entries"
            ))
        })?;
        let previous = std::mem::replace(slot, peer);

        let _enter = self.span.enter();
        if previous != peer {
            tracing::trace!("successor {} moved from {} to {}", index, previous, peer);
        }
        Ok(())
    }

    /// Points every entry at `peer`.
    pub fn fill(&mut self, peer: PeerRef) {
        self.entries.iter_mut().for_each(|entry| *entry = peer);
    }

    /// Makes the entry at `index` the canonical successor, dropping the entries before it.
    /// The vacated tail repeats the last surviving entry until maintenance refills it.
    pub fn promote(&mut self, index: usize) -> ChordResult<PeerRef> {
        let promoted = self.get(index)?;
        let len = self.entries.len();
        self.entries.drain(..index);
        let tail = self.entries[self.entries.len() - 1];
        self.entries.resize(len, tail);

        let _enter = self.span.enter();
        tracing::trace!("promoted successor {} at index {}", promoted, index);
        Ok(promoted)
    }

    /// Inserts a closer successor at the front, shifting the others back by one.
    pub fn push_front(&mut self, peer: PeerRef) {
        let len = self.entries.len();
        self.entries.insert(0, peer);
        self.entries.truncate(len);

        let _enter = self.span.enter();
        tracing::trace!("adopted closer successor {}", peer);
    }

    /// Distinct entries in list order, excluding `owner`.
    pub fn distinct_excluding(&self, owner: &PeerRef) -> Vec<PeerRef> {
        let mut peers: Vec<PeerRef> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if entry != owner && !peers.contains(entry) {
                peers.push(*entry);
            }
        }
        peers
    }

    pub fn entries(&self) -> &[PeerRef] {
        &self.entries
    }
}

impl Debug for SuccessorList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testutil::fixtures::{random_peer, span_fixture};

    #[test]
    fn test_successor_list_initial() {
        let owner = random_peer(8);
        let list = SuccessorList::new(&span_fixture(), owner, 3);
        assert_eq!(list.len(), 3);
        assert_eq!(list.first(), owner);
        assert!(list.distinct_excluding(&owner).is_empty());
    }

    #[test]
    fn test_successor_list_out_of_bound() {
        let owner = random_peer(8);
        let mut list = SuccessorList::new(&span_fixture(), owner, 3);
        assert!(matches!(list.get(3), Err(ChordError::Validation(_))));
        assert!(matches!(
            list.set(3, random_peer(8)),
            Err(ChordError::Validation(_))
        ));
    }

    /// Promoting index 2 out of [a, b, c] yields [c, c, c].
    #[test]
    fn test_successor_list_promote() {
        let owner = random_peer(8);
        let (a, b, c) = (random_peer(8), random_peer(8), random_peer(8));
        let mut list = SuccessorList::new(&span_fixture(), owner, 3);
        list.set(0, a).unwrap();
        list.set(1, b).unwrap();
        list.set(2, c).unwrap();

        assert_eq!(list.promote(1).unwrap(), b);
        assert_eq!(list.entries(), &[b, c, c]);

        assert_eq!(list.promote(2).unwrap(), c);
        assert_eq!(list.entries(), &[c, c, c]);

        assert!(list.promote(3).is_err());
    }

    #[test]
    fn test_successor_list_push_front() {
        let owner = random_peer(8);
        let (a, b) = (random_peer(8), random_peer(8));
        let mut list = SuccessorList::new(&span_fixture(), owner, 3);
        list.set(0, a).unwrap();

        list.push_front(b);
        assert_eq!(list.entries(), &[b, a, owner]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_successor_list_distinct_excluding() {
        let owner = random_peer(8);
        let other = random_peer(8);
        let mut list = SuccessorList::new(&span_fixture(), owner, 3);
        list.set(0, other).unwrap();
        list.set(2, other).unwrap();

        assert_eq!(list.distinct_excluding(&owner), vec![other]);
    }
}

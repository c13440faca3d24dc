use crate::core::error::{ChordError, ChordResult};
use crate::core::PeerRef;
use std::fmt::{Debug, Formatter};
use tracing::{Level, Span};

/// FingerTableLevel is the index of a finger; finger `i` approximates `successor(id + 2^i)`.
pub type FingerTableLevel = usize;

/// FingerTable holds one shortcut pointer per ring bit.
/// Entries are never empty: a fresh table points every finger back at its owner, and a finger whose
/// refresh fails falls back to the current successor. Entries may be stale, never missing.
pub struct FingerTable {
    entries: Vec<PeerRef>,
    span: Span,
}

impl FingerTable {
    /// Create a table of `size` fingers all pointing to `owner`.
    pub fn new(parent_span: &Span, owner: PeerRef, size: usize) -> FingerTable {
        let span = tracing::span!(parent: parent_span, Level::INFO, "finger_table");
        FingerTable {
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

    /// Get the finger at the given level.
    /// Returns an error if the level is out of bounds.
    pub fn get(&self, level: FingerTableLevel) -> ChordResult<PeerRef> {
        self.entries.get(level).copied().ok_or_else(|| {
            ChordError::Validation(format!(
                "finger level {} is out of bounds, table has {} levels",
                level,
                self.entries.len()
            ))
        })
    }

    /// Update the finger at the given level.
    pub fn set(&mut self, level: FingerTableLevel, peer: PeerRef) -> ChordResult<()> {
        let len = self.entries.len();
        let slot = self.entries.get_mut(level).ok_or_else(|| {
            ChordError::Validation(format!(
                "finger level {level} is out of bounds, table has {len} levels"
            ))
        })?;
        let previous = std::mem::replace(slot, peer);

        let _enter = self.span.enter();
        if previous != peer {
            tracing::trace!("finger {} moved from {} to {}", level, previous, peer);
        }
        Ok(())
    }

    /// Points every finger at `peer`.
    pub fn fill(&mut self, peer: PeerRef) {
        self.entries.iter_mut().for_each(|entry| *entry = peer);
    }

    /// Replaces every finger pointing at `dead` with `replacement`, returning how many were replaced.
    pub fn replace(&mut self, dead: &PeerRef, replacement: PeerRef) -> usize {
        let mut replaced = 0;
        for entry in self.entries.iter_mut().filter(|entry| **entry == *dead) {
            *entry = replacement;
            replaced += 1;
        }

        let _enter = self.span.enter();
        if replaced > 0 {
            tracing::trace!(
                "replaced {} fingers pointing at {} with {}",
                replaced,
                dead,
                replacement
            );
        }
        replaced
    }

    /// Fingers from the highest level down to level 0, the order used to pick the closest
    /// preceding node.
    pub fn descending(&self) -> impl Iterator<Item = (FingerTableLevel, PeerRef)> + '_ {
        self.entries.iter().copied().enumerate().rev()
    }

    pub fn entries(&self) -> &[PeerRef] {
        &self.entries
    }
}

impl Debug for FingerTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "FingerTable: {{")?;
        for (i, entry) in self.entries.iter().enumerate() {
            writeln!(f, "Level: {i}, Finger: {entry:?}")?;
        }
        write!(f, "}}")
    }
}

//! Per-node responsibility store.
//!
//! A node holds every responsibility either as primary (the ring says this node owns it) or as
//! replica (a backup pushed by the owner). The two maps are updated under one lock so an identifier
//! is never present in both at once.

use crate::core::clock::Clock;
use crate::core::error::{ChordError, ChordResult};
use crate::core::Responsibility;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tracing::{Level, Span};

/// Outcome of a read conditioned on a watermark.
#[derive(Debug, Clone, PartialEq)]
pub enum Versioned {
    /// Nothing is held under the identifier.
    Absent,
    /// An entry is held but it is not newer than the watermark.
    Unchanged,
    Newer(Responsibility),
}

impl Versioned {
    fn of(held: Option<&Responsibility>, since: Option<u64>) -> Versioned {
        match held {
            None => Versioned::Absent,
            Some(entry) if entry.is_newer_than(since) => Versioned::Newer(entry.clone()),
            Some(_) => Versioned::Unchanged,
        }
    }

    /// The entry, if it was newer than the watermark.
    pub fn newer(self) -> Option<Responsibility> {
        match self {
            Versioned::Newer(entry) => Some(entry),
            _ => None,
        }
    }
}

/// Uses Arc for shallow cloning; cloned instances share the same underlying maps.
#[derive(Clone)]
pub struct ResponsibilityStore {
    inner: Arc<RwLock<InnerStore>>,
    clock: Arc<dyn Clock>,
    span: Span,
}

#[derive(Default)]
struct InnerStore {
    primary: HashMap<String, Responsibility>,
    replica: HashMap<String, Responsibility>,
}

impl InnerStore {
    /// Next watermark for `identifier`: the clock, bumped past any version already held so that
    /// successive writes within one millisecond still order.
    fn next_timestamp(&self, identifier: &str, now: u64) -> u64 {
        let held = self
            .primary
            .get(identifier)
            .or_else(|| self.replica.get(identifier))
            .and_then(Responsibility::timestamp);
        match held {
            Some(last) if last >= now => last + 1,
            _ => now,
        }
    }
}

impl ResponsibilityStore {
    pub fn new(parent_span: &Span, clock: Arc<dyn Clock>) -> ResponsibilityStore {
        let span = tracing::span!(parent: parent_span, Level::INFO, "responsibility_store");
        ResponsibilityStore {
            inner: Arc::new(RwLock::new(InnerStore::default())),
            clock,
            span,
        }
    }

    /// Claims `identifier` as primary with a fresh watermark, overwriting any existing entry.
    /// Returns the stored entry.
    pub fn register(&self, identifier: &str, payload: Vec<u8>) -> Responsibility {
        let now = self.clock.now_millis();
        let mut inner = self.inner.write();
        let timestamp = inner.next_timestamp(identifier, now);
        let entry = Responsibility::new(identifier, payload, Some(timestamp));
        inner.replica.remove(identifier);
        inner.primary.insert(identifier.to_string(), entry.clone());

        let _enter = self.span.enter();
        tracing::trace!("registered primary {:?}", entry);
        entry
    }

    /// Overwrites the primary entry. Entries without a watermark are stamped on the way in.
    pub fn put(&self, responsibility: Responsibility) -> Responsibility {
        let now = self.clock.now_millis();
        let mut inner = self.inner.write();
        let entry = match responsibility.timestamp() {
            Some(_) => responsibility,
            None => {
                let timestamp = inner.next_timestamp(responsibility.identifier(), now);
                responsibility.with_timestamp(timestamp)
            }
        };
        inner.replica.remove(entry.identifier());
        inner
            .primary
            .insert(entry.identifier().to_string(), entry.clone());

        let _enter = self.span.enter();
        tracing::trace!("put primary {:?}", entry);
        entry
    }

    /// Merges a primary entry pushed by another node (migration). A duplicate or older version is
    /// ignored, so replaying the same move is harmless. Returns true if the store changed.
    pub fn post(&self, responsibility: Responsibility) -> bool {
        let mut inner = self.inner.write();
        let identifier = responsibility.identifier().to_string();
        let newest_held = inner
            .primary
            .get(&identifier)
            .or_else(|| inner.replica.get(&identifier))
            .and_then(Responsibility::timestamp);
        let held = inner.primary.contains_key(&identifier);
        if held && !responsibility.is_newer_than(newest_held) {
            return false;
        }
        // A replica older than the posted entry is superseded; a newer replica wins the payload.
        let entry = match inner.replica.remove(&identifier) {
            Some(replica) if !responsibility.is_newer_than(replica.timestamp()) => replica,
            _ => responsibility,
        };
        inner.primary.insert(identifier, entry.clone());

        let _enter = self.span.enter();
        tracing::trace!("posted primary {:?}", entry);
        true
    }

    /// Returns the primary entry if it is newer than `since`.
    pub fn get(&self, identifier: &str, since: Option<u64>) -> Option<Responsibility> {
        self.read(identifier, since).newer()
    }

    /// Like [`ResponsibilityStore::get`], but tells a missing primary apart from one that is
    /// not newer than `since`.
    pub fn read(&self, identifier: &str, since: Option<u64>) -> Versioned {
        Versioned::of(self.inner.read().primary.get(identifier), since)
    }

    pub fn get_all(&self) -> Vec<Responsibility> {
        let inner = self.inner.read();
        let mut entries: Vec<_> = inner.primary.values().cloned().collect();
        entries.sort_by(|a, b| a.identifier().cmp(b.identifier()));
        entries
    }

    /// Removes the primary entry. The removed entry is returned so the caller that moved it knows
    /// the migration completed.
    pub fn delete(&self, identifier: &str) -> Option<Responsibility> {
        let removed = self.inner.write().primary.remove(identifier);

        let _enter = self.span.enter();
        tracing::trace!("deleted primary {}: {:?}", identifier, removed);
        removed
    }

    /// Removes the primary entry only if it still equals `expected`, so a registration that raced
    /// with a migration is not lost. Returns true if the entry was removed.
    pub fn delete_if_unchanged(&self, expected: &Responsibility) -> bool {
        let mut inner = self.inner.write();
        if inner.primary.get(expected.identifier()) != Some(expected) {
            return false;
        }
        inner.primary.remove(expected.identifier());

        let _enter = self.span.enter();
        tracing::trace!("deleted migrated primary {}", expected.identifier());
        true
    }

    /// Records a replica pushed by the owner. Rejected if this node holds the identifier as
    /// primary. An older or duplicate version is ignored. Returns true if the store changed.
    pub fn register_replication(&self, responsibility: Responsibility) -> ChordResult<bool> {
        let mut inner = self.inner.write();
        let identifier = responsibility.identifier().to_string();
        if inner.primary.contains_key(&identifier) {
            return Err(ChordError::OperationRejected(format!(
                "{identifier} is held as primary, refusing replica"
            )));
        }
        if let Some(existing) = inner.replica.get(&identifier) {
            if !responsibility.is_newer_than(existing.timestamp()) {
                return Ok(false);
            }
        }
        inner.replica.insert(identifier, responsibility.clone());

        let _enter = self.span.enter();
        tracing::trace!("registered replica {:?}", responsibility);
        Ok(true)
    }

    /// Overwrites a replica regardless of its watermark. Rejected if held as primary.
    pub fn put_replication(&self, responsibility: Responsibility) -> ChordResult<()> {
        let mut inner = self.inner.write();
        let identifier = responsibility.identifier().to_string();
        if inner.primary.contains_key(&identifier) {
            return Err(ChordError::OperationRejected(format!(
                "{identifier} is held as primary, refusing replica"
            )));
        }
        inner.replica.insert(identifier, responsibility);
        Ok(())
    }

    pub fn get_replication(&self, identifier: &str, since: Option<u64>) -> Option<Responsibility> {
        self.read_replication(identifier, since).newer()
    }

    pub fn read_replication(&self, identifier: &str, since: Option<u64>) -> Versioned {
        Versioned::of(self.inner.read().replica.get(identifier), since)
    }

    pub fn get_all_replication(&self) -> Vec<Responsibility> {
        let inner = self.inner.read();
        let mut entries: Vec<_> = inner.replica.values().cloned().collect();
        entries.sort_by(|a, b| a.identifier().cmp(b.identifier()));
        entries
    }

    pub fn delete_replication(&self, identifier: &str) -> Option<Responsibility> {
        let removed = self.inner.write().replica.remove(identifier);

        let _enter = self.span.enter();
        tracing::trace!("deleted replica {}: {:?}", identifier, removed);
        removed
    }

    /// Moves a replica to the primary map. Returns the promoted entry, or None if no replica was
    /// held under that identifier.
    pub fn promote(&self, identifier: &str) -> Option<Responsibility> {
        let mut inner = self.inner.write();
        let entry = inner.replica.remove(identifier)?;
        inner.primary.insert(identifier.to_string(), entry.clone());

        let _enter = self.span.enter();
        tracing::debug!("promoted replica {} to primary", identifier);
        Some(entry)
    }

    /// Watermark of the replica held under `identifier`; `None` if no replica is held and
    /// `Some(None)` for a replica without a watermark.
    pub fn replica_watermark(&self, identifier: &str) -> Option<Option<u64>> {
        self.inner
            .read()
            .replica
            .get(identifier)
            .map(Responsibility::timestamp)
    }

    pub fn primary_identifiers(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.inner.read().primary.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn replica_identifiers(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.inner.read().replica.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_primary(&self, identifier: &str) -> bool {
        self.inner.read().primary.contains_key(identifier)
    }

    pub fn is_replica(&self, identifier: &str) -> bool {
        self.inner.read().replica.contains_key(identifier)
    }

    /// Drops every replica; primaries are kept.
    pub fn clear_replicas(&self) {
        let dropped = {
            let mut inner = self.inner.write();
            let dropped = inner.replica.len();
            inner.replica.clear();
            dropped
        };

        let _enter = self.span.enter();
        tracing::trace!("dropped {} replicas", dropped);
    }
}

impl Debug for ResponsibilityStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ResponsibilityStore")
            .field("primary", &inner.primary.keys().collect::<Vec<_>>())
            .field("replica", &inner.replica.keys().collect::<Vec<_>>())
            .finish()
    }
}

//! Responsibilities: application entries owned by the node whose id follows their hash.
//!
//! The owner keeps the primary copy and pushes replicas to its first R - 1 successors. When the
//! ring changes, primaries move to their new owner and replicas whose owner died are promoted.

use crate::core::ring;
use crate::core::{Address, ChordError, ChordResult, PeerRef, Responsibility, Versioned};
use crate::network::StoreKind;
use crate::node::chord_node::ChordNode;
use crate::node::peer::Peer;
use std::collections::HashMap;

/// Rejects identifiers that cannot name a responsibility.
pub(crate) fn validate_identifier(identifier: &str) -> ChordResult<()> {
    if identifier.trim().is_empty() {
        return Err(ChordError::Validation(
            "responsibility identifier must not be empty".to_string(),
        ));
    }
    Ok(())
}

impl ChordNode {
    /// Stores `payload` as a primary responsibility of this node and pushes replicas to the
    /// successors in the background. Must be called from within a tokio runtime.
    pub fn register_responsibility(
        &self,
        identifier: &str,
        payload: Vec<u8>,
    ) -> ChordResult<Responsibility> {
        validate_identifier(identifier)?;
        let entry = self.store().register(identifier, payload);
        tracing::debug!(parent: self.span(), "registered responsibility {:?}", entry);

        for target in self.replica_targets() {
            let node = self.clone();
            let entry = entry.clone();
            tokio::spawn(async move {
                if let Err(e) = node
                    .peer(&target.address())
                    .post_responsibility(StoreKind::Replica, entry)
                    .await
                {
                    tracing::debug!(parent: node.span(), "could not replicate to {}: {}", target, e);
                }
            });
        }
        Ok(entry)
    }

    /// Deletes a primary responsibility and its replicas at the successors, in the background.
    pub fn remove_responsibility(&self, identifier: &str) -> ChordResult<Option<Responsibility>> {
        validate_identifier(identifier)?;
        let removed = self.store().delete(identifier);
        if removed.is_none() {
            return Ok(None);
        }

        for target in self.replica_targets() {
            let node = self.clone();
            let identifier = identifier.to_string();
            tokio::spawn(async move {
                if let Err(e) = node
                    .peer(&target.address())
                    .delete_responsibility(StoreKind::Replica, &identifier)
                    .await
                {
                    tracing::debug!(parent: node.span(), "could not drop replica at {}: {}", target, e);
                }
            });
        }
        Ok(removed)
    }

    /// Resolves the node that owns `identifier`.
    pub async fn lookup_responsible(&self, identifier: &str) -> ChordResult<Address> {
        validate_identifier(identifier)?;
        self.lookup_id(ring::hash(identifier, self.config().bits))
            .await
    }

    /// Hands every primary whose owner is now another node over to that owner. An entry is only
    /// dropped locally once the owner acknowledged it.
    pub async fn move_responsibilities(&self) {
        let _guard = self.inner.guards.responsibilities.lock().await;
        for entry in self.store().get_all() {
            let owner = match self.lookup_responsible(entry.identifier()).await {
                Ok(owner) => owner,
                Err(e) => {
                    tracing::debug!(parent: self.span(), "could not resolve owner of {}: {}", entry.identifier(), e);
                    continue;
                }
            };
            if owner == self.address() {
                continue;
            }

            let peer = self.peer(&owner);
            if let Err(e) = peer.ping().await {
                tracing::debug!(parent: self.span(), "owner {} of {} unreachable: {}", owner, entry.identifier(), e);
                continue;
            }
            match peer
                .post_responsibility(StoreKind::Primary, entry.clone())
                .await
            {
                Ok(()) => {
                    if self.store().delete_if_unchanged(&entry) {
                        tracing::info!(parent: self.span(), "moved {} to {}", entry.identifier(), owner);
                    }
                }
                Err(e) => {
                    tracing::warn!(parent: self.span(), "could not move {} to {}: {}", entry.identifier(), owner, e);
                }
            }
        }
    }

    /// Brings replicas up to date. For every replica held, the owner is resolved: if this node is
    /// now the owner the replica is promoted. A replica is dropped when the owner no longer keeps
    /// this node among its replica holders, or no longer holds the entry at all. Otherwise changes
    /// since the replica's watermark are pulled from the owner. Every primary is then pushed again
    /// to the current replica targets.
    pub async fn refresh_replication(&self) {
        let _guard = self.inner.guards.responsibilities.lock().await;
        let me = self.address();
        let mut holders: HashMap<Address, Option<Vec<Address>>> = HashMap::new();

        for identifier in self.store().replica_identifiers() {
            let owner = match self.lookup_responsible(&identifier).await {
                Ok(owner) => owner,
                Err(e) => {
                    tracing::debug!(parent: self.span(), "could not resolve owner of replica {}: {}", identifier, e);
                    continue;
                }
            };
            if owner == me {
                if let Some(entry) = self.store().promote(&identifier) {
                    tracing::info!(parent: self.span(), "promoted replica {:?}", entry);
                }
                continue;
            }

            let peer = self.peer(&owner);
            if !holders.contains_key(&owner) {
                let fetched = self.replica_holders(peer.as_ref()).await;
                holders.insert(owner, fetched);
            }
            // an unreadable successor list keeps the replica
            let is_holder = holders
                .get(&owner)
                .and_then(Option::as_ref)
                .is_none_or(|h| h.contains(&me));
            if !is_holder {
                self.store().delete_replication(&identifier);
                tracing::debug!(parent: self.span(), "dropped replica {}, {} replicates elsewhere", identifier, owner);
                continue;
            }

            let since = self.store().replica_watermark(&identifier).flatten();
            match peer
                .get_responsibility(StoreKind::Primary, &identifier, since)
                .await
            {
                Ok(Versioned::Newer(update)) => {
                    if let Err(e) = self.store().register_replication(update) {
                        tracing::debug!(parent: self.span(), "could not apply update of {}: {}", identifier, e);
                    }
                }
                Ok(Versioned::Unchanged) => {}
                Ok(Versioned::Absent) => {
                    self.store().delete_replication(&identifier);
                    tracing::info!(parent: self.span(), "dropped replica {}, {} no longer holds it", identifier, owner);
                }
                Err(e) => {
                    tracing::debug!(parent: self.span(), "could not pull {} from {}: {}", identifier, owner, e);
                }
            }
        }

        let targets = self.replica_targets();
        for entry in self.store().get_all() {
            for target in &targets {
                if let Err(e) = self
                    .peer(&target.address())
                    .post_responsibility(StoreKind::Replica, entry.clone())
                    .await
                {
                    tracing::debug!(parent: self.span(), "could not replicate {} to {}: {}", entry.identifier(), target, e);
                }
            }
        }
    }

    /// Where `owner` keeps its replicas: the first R - 1 distinct entries of its successor list
    /// other than itself, matching [`ChordNode::replica_targets`]. None if the list could not be
    /// read in full.
    async fn replica_holders(&self, owner: &dyn Peer) -> Option<Vec<Address>> {
        let size = self.config().successor_list_size;
        let mut holders = Vec::with_capacity(size);
        for index in 0..size {
            match owner.get_successor(index).await {
                Ok(address) => {
                    if address != owner.address() && !holders.contains(&address) {
                        holders.push(address);
                    }
                }
                Err(e) => {
                    tracing::debug!(parent: self.span(), "could not read successor {} of {}: {}", index, owner.address(), e);
                    return None;
                }
            }
        }
        holders.truncate(size.saturating_sub(1));
        Some(holders)
    }

    /// Posts every primary to `target` and drops the ones it acknowledged. Returns the first
    /// failure; entries that failed stay in the store.
    pub(crate) async fn migrate_all(&self, target: &dyn Peer) -> ChordResult<()> {
        let mut first_error = None;
        for entry in self.store().get_all() {
            match target
                .post_responsibility(StoreKind::Primary, entry.clone())
                .await
            {
                Ok(()) => {
                    self.store().delete_if_unchanged(&entry);
                }
                Err(e) => {
                    tracing::warn!(parent: self.span(), "could not migrate {} to {}: {}", entry.identifier(), target.address(), e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Counts down stabilize ticks and runs a responsibility round when the cooldown expires.
    pub(crate) async fn tick_responsibilities(&self) {
        let due = {
            let mut state = self.inner.state.write();
            state.responsibility_countdown = state.responsibility_countdown.saturating_sub(1);
            if state.responsibility_countdown == 0 {
                state.responsibility_countdown = self.config().responsibility_cooldown;
                true
            } else {
                false
            }
        };
        if due {
            self.move_responsibilities().await;
            self.refresh_replication().await;
        }
    }

    /// The first R - 1 distinct successors other than this node.
    pub(crate) fn replica_targets(&self) -> Vec<PeerRef> {
        let me = self.peer_ref();
        let replicas = self.config().successor_list_size.saturating_sub(1);
        let state = self.inner.state.read();
        let mut targets = state.successors.distinct_excluding(&me);
        targets.truncate(replicas);
        targets
    }
}

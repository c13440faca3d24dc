//! Periodic repair of ring state.
//!
//! Every routine here catches its own failures: an unreachable peer is logged and turned into a
//! corrective mutation, never returned.

use crate::core::ring;
use crate::core::PeerRef;
use crate::node::chord_node::{ChordNode, NodeInner};
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Routine {
    Stabilize,
    CheckPredecessor,
    FixFingers,
    FixSuccessors,
}

impl Routine {
    const ALL: [Routine; 4] = [
        Routine::Stabilize,
        Routine::CheckPredecessor,
        Routine::FixFingers,
        Routine::FixSuccessors,
    ];

    /// Offset of the routine within one stabilize interval, so the routines do not fire together.
    fn phase(self, period: Duration) -> Duration {
        match self {
            Routine::Stabilize => Duration::ZERO,
            Routine::CheckPredecessor => period / 4,
            Routine::FixFingers => period / 2,
            Routine::FixSuccessors => period * 3 / 4,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Routine::Stabilize => "stabilize",
            Routine::CheckPredecessor => "check_predecessor",
            Routine::FixFingers => "fix_fingers",
            Routine::FixSuccessors => "fix_successor_list",
        }
    }
}

/// MaintenanceTasks owns the periodic routines of one node.
/// The tasks hold only a weak reference to the node and stop on cancellation, on drop, or once
/// the node itself is gone.
pub(crate) struct MaintenanceTasks {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl MaintenanceTasks {
    pub(crate) fn start(node: &ChordNode) -> MaintenanceTasks {
        let token = CancellationToken::new();
        let period = node.config().stabilize_interval;
        let handles = Routine::ALL
            .iter()
            .map(|routine| {
                let span = tracing::span!(
                    parent: node.span(),
                    tracing::Level::DEBUG,
                    "maintenance",
                    routine = routine.name()
                );
                tokio::spawn(
                    run_periodically(
                        std::sync::Arc::downgrade(&node.inner),
                        *routine,
                        period,
                        token.clone(),
                    )
                    .instrument(span),
                )
            })
            .collect();

        tracing::debug!(parent: node.span(), "started maintenance every {:?}", period);
        MaintenanceTasks { token, handles }
    }

    pub(crate) fn stop(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        self.token.cancel();
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for MaintenanceTasks {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_periodically(
    node: Weak<NodeInner>,
    routine: Routine,
    period: Duration,
    token: CancellationToken,
) {
    let start = Instant::now() + period + routine.phase(period);
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }
        let Some(inner) = node.upgrade() else {
            break;
        };
        let strong = ChordNode { inner };
        tokio::select! {
            _ = token.cancelled() => break,
            _ = strong.run_routine(routine) => {}
        }
    }
    tracing::trace!("{} stopped", routine.name());
}

impl ChordNode {
    async fn run_routine(&self, routine: Routine) {
        match routine {
            Routine::Stabilize => {
                self.stabilize().await;
                self.tick_responsibilities().await;
            }
            Routine::CheckPredecessor => self.check_predecessor().await,
            Routine::FixFingers => self.fix_fingers().await,
            Routine::FixSuccessors => self.fix_successor_list().await,
        }
    }

    /// Verifies the successor and adopts a closer one if the successor learned of it, then
    /// notifies the successor about this node.
    pub async fn stabilize(&self) {
        let Ok(_guard) = self.inner.guards.stabilize.try_lock() else {
            tracing::trace!(parent: self.span(), "stabilize already running, skipping tick");
            return;
        };
        let me = self.peer_ref();

        let mut successor = self.successor();
        if successor != me {
            if let Err(e) = self.peer(&successor.address()).ping().await {
                tracing::warn!(parent: self.span(), "successor {} unreachable: {}", successor, e);
                successor = self.recover_successor(successor).await;
            }
        }

        match self.peer(&successor.address()).get_predecessor().await {
            Ok(Some(candidate)) => {
                let candidate = self.peer_of(candidate);
                if ring::in_range_exclusive(candidate.id(), me.id(), successor.id())
                    && self.is_alive(candidate).await
                {
                    let mut state = self.inner.state.write();
                    if state.successors.first() == successor {
                        state.successors.push_front(candidate);
                        tracing::debug!(parent: self.span(), "adopted closer successor {}", candidate);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(parent: self.span(), "could not read predecessor of {}: {}", successor, e);
            }
        }

        let successor = self.successor();
        if let Err(e) = self.peer(&successor.address()).notify(me.address()).await {
            tracing::debug!(parent: self.span(), "could not notify {}: {}", successor, e);
        }
    }

    /// Clears the predecessor if it no longer answers, so the next notify can replace it.
    pub async fn check_predecessor(&self) {
        let Some(predecessor) = self.predecessor() else {
            return;
        };
        if predecessor == self.peer_ref() {
            return;
        }
        if let Err(e) = self.peer(&predecessor.address()).ping().await {
            let mut state = self.inner.state.write();
            if state.predecessor == Some(predecessor) {
                state.predecessor = None;
                tracing::info!(parent: self.span(), "cleared unreachable predecessor {}: {}", predecessor, e);
            }
        }
    }

    /// Refreshes one finger per call, cycling through the levels.
    pub async fn fix_fingers(&self) {
        let Ok(_guard) = self.inner.guards.fingers.try_lock() else {
            tracing::trace!(parent: self.span(), "fix_fingers already running, skipping tick");
            return;
        };
        let level = self.inner.state.read().finger_cursor;
        self.fix_finger(level).await;
        let mut state = self.inner.state.write();
        state.finger_cursor = (level + 1) % state.fingers.len();
    }

    /// Recomputes every finger. Waits for a running fix_fingers to finish first.
    pub async fn refresh_fingers(&self) {
        let _guard = self.inner.guards.fingers.lock().await;
        for level in 0..self.config().finger_count() {
            self.fix_finger(level).await;
        }
    }

    async fn fix_finger(&self, level: usize) {
        let bits = self.config().bits;
        let start = ring::finger_start(self.id(), level, bits);
        let finger = match self.lookup_id(start).await {
            Ok(owner) => self.peer_of(owner),
            Err(e) => {
                let successor = self.successor();
                tracing::debug!(
                    parent: self.span(),
                    "lookup for finger {} failed, falling back to successor {}: {}",
                    level,
                    successor,
                    e
                );
                successor
            }
        };
        if let Err(e) = self.inner.state.write().fingers.set(level, finger) {
            tracing::warn!(parent: self.span(), "could not set finger {}: {}", level, e);
        }
    }

    /// Refreshes one successor-list entry per call. A failure mid-chain restarts the round at 0.
    pub async fn fix_successor_list(&self) {
        let Ok(_guard) = self.inner.guards.successors.try_lock() else {
            tracing::trace!(parent: self.span(), "fix_successor_list already running, skipping tick");
            return;
        };
        let index = self.inner.state.read().successor_cursor;
        let fixed = self.fix_successor(index).await;
        let mut state = self.inner.state.write();
        state.successor_cursor = if fixed {
            (index + 1) % state.successors.len()
        } else {
            0
        };
    }

    /// Recomputes the whole successor list, stopping at the first failure.
    pub async fn refresh_successor_list(&self) {
        let _guard = self.inner.guards.successors.lock().await;
        for index in 0..self.config().successor_list_size {
            if !self.fix_successor(index).await {
                break;
            }
        }
    }

    /// Entry 0 is verified by a ping; entry i is set to the successor of entry i - 1.
    async fn fix_successor(&self, index: usize) -> bool {
        let me = self.peer_ref();
        if index == 0 {
            let successor = self.successor();
            if successor != me && self.peer(&successor.address()).ping().await.is_err() {
                self.recover_successor(successor).await;
            }
            return true;
        }

        let previous = match self.successor_at(index - 1) {
            Ok(previous) => previous,
            Err(e) => {
                tracing::warn!(parent: self.span(), "successor list shorter than expected: {}", e);
                return false;
            }
        };
        let entry = if previous == me {
            self.successor()
        } else {
            match self.peer(&previous.address()).get_successor(0).await {
                Ok(address) => self.peer_of(address),
                Err(e) => {
                    tracing::debug!(
                        parent: self.span(),
                        "could not read successor of {}: {}",
                        previous,
                        e
                    );
                    return false;
                }
            }
        };
        match self.inner.state.write().successors.set(index, entry) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(parent: self.span(), "could not set successor {}: {}", index, e);
                false
            }
        }
    }

    /// Replaces a dead successor with the first live entry of the successor list and repoints
    /// the fingers that referenced it. Falls back to this node when no entry answers.
    pub(crate) async fn recover_successor(&self, dead: PeerRef) -> PeerRef {
        let me = self.peer_ref();
        let candidates: Vec<(usize, PeerRef)> = self
            .successors()
            .into_iter()
            .enumerate()
            .skip(1)
            .filter(|(_, candidate)| *candidate != dead)
            .collect();

        for (index, candidate) in candidates {
            if !self.is_alive(candidate).await {
                continue;
            }
            let mut state = self.inner.state.write();
            let promoted = if state.successors.get(index).ok() == Some(candidate) {
                state.successors.promote(index).map(|_| ())
            } else {
                state.successors.set(0, candidate)
            };
            if let Err(e) = promoted {
                tracing::warn!(parent: self.span(), "could not promote successor {}: {}", candidate, e);
            }
            state.fingers.replace(&dead, candidate);
            tracing::info!(parent: self.span(), "replaced dead successor {} with {}", dead, candidate);
            return candidate;
        }

        let mut state = self.inner.state.write();
        state.successors.fill(me);
        state.fingers.replace(&dead, me);
        tracing::warn!(parent: self.span(), "no live successor left after {}, falling back to self", dead);
        me
    }

    async fn is_alive(&self, peer: PeerRef) -> bool {
        peer == self.peer_ref() || self.peer(&peer.address()).ping().await.is_ok()
    }
}

use crate::core::ring;
use crate::core::{
    Address, ChordError, ChordResult, Clock, FingerTable, Identifier, PeerRef, ResponsibilityStore,
    RingConfig, SuccessorList, SystemClock,
};
use crate::network::{
    MessageProcessor, MessageProcessorCore, Network, Request, Response, StoreKind, StoreRequest,
};
use crate::node::maintenance::MaintenanceTasks;
use crate::node::peer::{LocalPeer, Peer, RemotePeer};
use crate::node::responsibility::validate_identifier;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::fmt::Formatter;
use std::sync::{Arc, Weak};
use tracing::{Level, Span};

/// Membership phase of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not part of any ring; maintenance is not running.
    Standalone,
    /// Part of a ring with maintenance running.
    Member,
    /// Handing off to its neighbours; maintenance is already stopped.
    Leaving,
}

/// ActionHandler receives application-level actions sent to this node by other nodes.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle_action(
        &self,
        origin: Address,
        name: &str,
        payload: Vec<u8>,
    ) -> anyhow::Result<Vec<u8>>;
}

/// Mutable ring state of one node. Always accessed under the node's lock and never across an await.
pub(crate) struct RingState {
    pub(crate) phase: Phase,
    pub(crate) predecessor: Option<PeerRef>,
    pub(crate) successors: SuccessorList,
    pub(crate) fingers: FingerTable,
    /// Next finger level refreshed by fix_fingers.
    pub(crate) finger_cursor: usize,
    /// Next successor-list index refreshed by fix_successor_list.
    pub(crate) successor_cursor: usize,
    /// Stabilize ticks left until the next responsibility round.
    pub(crate) responsibility_countdown: u32,
}

impl RingState {
    fn new(span: &Span, me: PeerRef, config: &RingConfig) -> RingState {
        RingState {
            phase: Phase::Standalone,
            predecessor: None,
            successors: SuccessorList::new(span, me, config.successor_list_size),
            fingers: FingerTable::new(span, me, config.finger_count()),
            finger_cursor: 0,
            successor_cursor: 0,
            responsibility_countdown: config.responsibility_cooldown,
        }
    }

    /// Points everything back at `me`, the state of a one-node ring.
    fn reset(&mut self, me: PeerRef, config: &RingConfig) {
        self.predecessor = None;
        self.successors.fill(me);
        self.fingers.fill(me);
        self.finger_cursor = 0;
        self.successor_cursor = 0;
        self.responsibility_countdown = config.responsibility_cooldown;
    }
}

/// Single-slot guards serializing the maintenance routines. A routine that cannot take its guard
/// is already running and the tick is skipped.
#[derive(Default)]
pub(crate) struct RoutineGuards {
    pub(crate) stabilize: tokio::sync::Mutex<()>,
    pub(crate) fingers: tokio::sync::Mutex<()>,
    pub(crate) successors: tokio::sync::Mutex<()>,
    pub(crate) responsibilities: tokio::sync::Mutex<()>,
}

pub(crate) struct NodeInner {
    pub(crate) config: RingConfig,
    pub(crate) me: PeerRef,
    pub(crate) net: Arc<dyn Network>,
    pub(crate) state: RwLock<RingState>,
    pub(crate) store: ResponsibilityStore,
    pub(crate) tasks: Mutex<Option<MaintenanceTasks>>,
    pub(crate) action_handler: RwLock<Option<Arc<dyn ActionHandler>>>,
    pub(crate) guards: RoutineGuards,
    pub(crate) span: Span,
}

/// ChordNode is one participant of the ring.
/// Uses Arc for shallow cloning; cloned instances share the same state.
#[derive(Clone)]
pub struct ChordNode {
    pub(crate) inner: Arc<NodeInner>,
}

/// Answers requests from the network on behalf of a node without keeping it alive.
struct NodeProcessor {
    node: Weak<NodeInner>,
}

#[async_trait]
impl MessageProcessorCore for NodeProcessor {
    async fn process_incoming_request(&self, origin: Address, request: Request) -> Response {
        match self.node.upgrade() {
            Some(inner) => ChordNode { inner }.handle_request(origin, request).await,
            None => Response::Failure(ChordError::Internal("node has shut down".to_string())),
        }
    }
}

impl ChordNode {
    /// Creates a standalone node reachable at the network's local address and registers it as the
    /// network's request processor.
    pub fn new(
        parent_span: &Span,
        config: RingConfig,
        net: Arc<dyn Network>,
    ) -> ChordResult<ChordNode> {
        Self::with_clock(parent_span, config, net, Arc::new(SystemClock))
    }

    /// Same as [`ChordNode::new`] with the clock that stamps responsibility watermarks.
    pub fn with_clock(
        parent_span: &Span,
        config: RingConfig,
        net: Arc<dyn Network>,
        clock: Arc<dyn Clock>,
    ) -> ChordResult<ChordNode> {
        config.validate()?;
        let address = net.local_address();
        let me = PeerRef::new(address, config.bits);
        let span = tracing::span!(
            parent: parent_span,
            Level::INFO,
            "chord_node",
            address = %address,
            id = %me.id()
        );

        let state = RingState::new(&span, me, &config);
        let store = ResponsibilityStore::new(&span, clock);
        let node = ChordNode {
            inner: Arc::new(NodeInner {
                config,
                me,
                net: net.clone(),
                state: RwLock::new(state),
                store,
                tasks: Mutex::new(None),
                action_handler: RwLock::new(None),
                guards: RoutineGuards::default(),
                span,
            }),
        };

        let processor = MessageProcessor::new(Arc::new(NodeProcessor {
            node: Arc::downgrade(&node.inner),
        }));
        net.register_processor(processor).map_err(|e| {
            ChordError::Internal(format!("could not register node in network: {e:#}"))
        })?;

        tracing::debug!(parent: &node.inner.span, "created node {}", me);
        Ok(node)
    }

    pub fn address(&self) -> Address {
        self.inner.me.address()
    }

    pub fn id(&self) -> Identifier {
        self.inner.me.id()
    }

    pub fn peer_ref(&self) -> PeerRef {
        self.inner.me
    }

    pub fn config(&self) -> &RingConfig {
        &self.inner.config
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.read().phase
    }

    pub fn is_member(&self) -> bool {
        self.phase() == Phase::Member
    }

    pub fn predecessor(&self) -> Option<PeerRef> {
        self.inner.state.read().predecessor
    }

    /// The canonical successor, `successors[0]`.
    pub fn successor(&self) -> PeerRef {
        self.inner.state.read().successors.first()
    }

    pub fn successors(&self) -> Vec<PeerRef> {
        self.inner.state.read().successors.entries().to_vec()
    }

    pub fn fingers(&self) -> Vec<PeerRef> {
        self.inner.state.read().fingers.entries().to_vec()
    }

    pub fn store(&self) -> &ResponsibilityStore {
        &self.inner.store
    }

    pub(crate) fn span(&self) -> &Span {
        &self.inner.span
    }

    pub(crate) fn peer_of(&self, address: Address) -> PeerRef {
        PeerRef::new(address, self.inner.config.bits)
    }

    /// Resolves a handle to the node at `address`: the node itself is answered in-process, any
    /// other address over the network.
    pub fn peer(&self, address: &Address) -> Box<dyn Peer> {
        if *address == self.address() {
            Box::new(LocalPeer::new(self.clone()))
        } else {
            Box::new(RemotePeer::new(
                self.address(),
                *address,
                self.inner.net.clone(),
                self.inner.config.rpc_timeout,
            ))
        }
    }

    pub fn set_predecessor(&self, predecessor: Option<Address>) {
        let predecessor = predecessor.map(|address| self.peer_of(address));
        self.inner.state.write().predecessor = predecessor;
        tracing::trace!(parent: self.span(), "predecessor set to {:?}", predecessor);
    }

    pub fn successor_at(&self, index: usize) -> ChordResult<PeerRef> {
        self.inner.state.read().successors.get(index)
    }

    pub fn set_successor(&self, index: usize, successor: Address) -> ChordResult<()> {
        let successor = self.peer_of(successor);
        self.inner.state.write().successors.set(index, successor)
    }

    pub fn finger_at(&self, level: usize) -> ChordResult<PeerRef> {
        self.inner.state.read().fingers.get(level)
    }

    pub fn set_finger(&self, level: usize, finger: Address) -> ChordResult<()> {
        let finger = self.peer_of(finger);
        self.inner.state.write().fingers.set(level, finger)
    }

    /// Resolves the node responsible for `key`, reduced into the ring first.
    pub async fn lookup(&self, key: u64) -> ChordResult<Address> {
        self.lookup_id(Identifier::new(key)).await
    }

    /// Resolves the node responsible for a textual key. Non-numeric keys are rejected.
    pub async fn lookup_key(&self, key: &str) -> ChordResult<Address> {
        let key = ring::parse_key(key, self.inner.config.bits)?;
        self.lookup_id(key).await
    }

    /// Owner rules, in order: `(pred, self]` is answered by this node, `(self, succ]` by the
    /// successor; otherwise the request is delegated to the highest live finger strictly between
    /// this node and the key. A finger that is down or refuses is skipped. With no such finger
    /// this node answers.
    pub async fn lookup_id(&self, key: Identifier) -> ChordResult<Address> {
        let key = key.reduce(self.inner.config.bits);
        let me = self.inner.me;
        let (predecessor, successor, candidates) = {
            let state = self.inner.state.read();
            let candidates: Vec<PeerRef> = state
                .fingers
                .descending()
                .map(|(_, finger)| finger)
                .filter(|finger| ring::in_range_exclusive(finger.id(), me.id(), key))
                .collect();
            (state.predecessor, state.successors.first(), candidates)
        };

        if let Some(predecessor) = predecessor {
            if ring::in_range_inclusive(key, predecessor.id(), me.id()) {
                return Ok(me.address());
            }
        }
        if ring::in_range_inclusive(key, me.id(), successor.id()) {
            return Ok(successor.address());
        }

        let mut tried = HashSet::new();
        for candidate in candidates {
            if !tried.insert(candidate) {
                continue;
            }
            let peer = self.peer(&candidate.address());
            if let Err(e) = peer.ping().await {
                tracing::debug!(parent: self.span(), "skipping dead finger {}: {}", candidate, e);
                continue;
            }
            tracing::trace!(
                parent: self.span(),
                "delegating lookup of {} to finger {}",
                key,
                candidate
            );
            match peer.lookup(key).await {
                Ok(owner) => return Ok(owner),
                Err(e) => {
                    tracing::debug!(parent: self.span(), "finger {} could not resolve {}: {}", candidate, key, e);
                }
            }
        }
        Ok(me.address())
    }

    /// Adopts `candidate` as predecessor if none is known or it lies between the current
    /// predecessor and this node.
    pub fn notify(&self, candidate: Address) {
        let candidate = self.peer_of(candidate);
        let me = self.inner.me;
        let mut state = self.inner.state.write();
        let adopt = match state.predecessor {
            None => true,
            Some(predecessor) => ring::in_range_exclusive(candidate.id(), predecessor.id(), me.id()),
        };
        if adopt && state.predecessor != Some(candidate) {
            state.predecessor = Some(candidate);
            tracing::debug!(parent: self.span(), "adopted predecessor {}", candidate);
        }
    }

    /// Starts a new one-node ring. Must be called from within a tokio runtime.
    pub fn create(&self) -> ChordResult<()> {
        {
            let mut state = self.inner.state.write();
            if state.phase != Phase::Standalone {
                return Err(ChordError::OperationRejected(format!(
                    "cannot create a ring while {:?}",
                    state.phase
                )));
            }
            state.reset(self.inner.me, &self.inner.config);
            state.phase = Phase::Member;
        }
        self.start_maintenance();
        tracing::info!(parent: self.span(), "created a new ring");
        Ok(())
    }

    /// Joins the ring that `known` belongs to. Joining through this node's own address creates a
    /// new ring instead.
    pub async fn join(&self, known: Address) -> ChordResult<()> {
        let me = self.inner.me;
        if known == me.address() {
            return self.create();
        }
        let phase = self.phase();
        if phase != Phase::Standalone {
            return Err(ChordError::OperationRejected(format!(
                "cannot join while {phase:?}"
            )));
        }

        let introducer = self.peer(&known);
        introducer.ping().await?;
        let mut successor = introducer.lookup(me.id()).await?;
        if successor == me.address() {
            // the ring still remembers this address from an earlier membership
            successor = known;
        } else {
            self.peer(&successor).ping().await?;
        }
        let successor = self.peer_of(successor);

        {
            let mut state = self.inner.state.write();
            if state.phase != Phase::Standalone {
                return Err(ChordError::OperationRejected(format!(
                    "cannot join while {:?}",
                    state.phase
                )));
            }
            state.reset(me, &self.inner.config);
            state.successors.fill(successor);
            state.fingers.fill(successor);
            state.phase = Phase::Member;
        }
        self.start_maintenance();
        tracing::info!(parent: self.span(), "joined ring through {} with successor {}", known, successor);

        let node = self.clone();
        tokio::spawn(async move {
            node.refresh_successor_list().await;
            node.refresh_fingers().await;
        });
        Ok(())
    }

    /// Leaves the ring, handing the predecessor and successor to each other and every primary
    /// responsibility to the successor. The node ends up standalone even if part of the handoff
    /// fails; the first failure is returned.
    pub async fn leave(&self) -> ChordResult<()> {
        let me = self.inner.me;
        let (predecessor, successor) = {
            let mut state = self.inner.state.write();
            match state.phase {
                Phase::Member => {}
                phase => {
                    return Err(ChordError::OperationRejected(format!(
                        "cannot leave while {phase:?}"
                    )))
                }
            }
            let successor = state.successors.first();
            if successor != me && state.predecessor.is_none() {
                return Err(ChordError::OperationRejected(
                    "predecessor unknown, nobody to hand the successor to".to_string(),
                ));
            }
            state.phase = Phase::Leaving;
            (state.predecessor, successor)
        };
        self.stop_maintenance();

        let mut first_error = None;
        if successor != me {
            if let Some(predecessor) = predecessor.filter(|p| *p != me) {
                if let Err(e) = self
                    .peer(&predecessor.address())
                    .set_successor(0, successor.address())
                    .await
                {
                    tracing::warn!(parent: self.span(), "could not rewire predecessor {}: {}", predecessor, e);
                    first_error.get_or_insert(e);
                }
            }
            let successor_peer = self.peer(&successor.address());
            if let Err(e) = successor_peer
                .set_predecessor(predecessor.map(|p| p.address()))
                .await
            {
                tracing::warn!(parent: self.span(), "could not rewire successor {}: {}", successor, e);
                first_error.get_or_insert(e);
            }
            if let Err(e) = self.migrate_all(successor_peer.as_ref()).await {
                first_error.get_or_insert(e);
            }
        }

        {
            let mut state = self.inner.state.write();
            state.reset(me, &self.inner.config);
            state.phase = Phase::Standalone;
        }
        self.inner.store.clear_replicas();
        tracing::info!(parent: self.span(), "left the ring");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Registers the single handler for inbound actions. A second registration is rejected.
    pub fn register_action_handler(&self, handler: Arc<dyn ActionHandler>) -> ChordResult<()> {
        let mut slot = self.inner.action_handler.write();
        if slot.is_some() {
            return Err(ChordError::OperationRejected(
                "an action handler is already registered".to_string(),
            ));
        }
        *slot = Some(handler);
        Ok(())
    }

    /// Invokes the action handler registered at `target`.
    pub async fn send_action(
        &self,
        target: &Address,
        name: &str,
        payload: Vec<u8>,
    ) -> ChordResult<Vec<u8>> {
        self.peer(target).action(name, payload).await
    }

    pub(crate) fn start_maintenance(&self) {
        let mut tasks = self.inner.tasks.lock();
        if tasks.is_none() {
            *tasks = Some(MaintenanceTasks::start(self));
        }
    }

    pub(crate) fn stop_maintenance(&self) {
        let tasks = self.inner.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.stop();
        }
    }

    /// Answers one request addressed to this node.
    pub(crate) async fn handle_request(&self, origin: Address, request: Request) -> Response {
        tracing::trace!(parent: self.span(), "processing {:?} from {}", request, origin);
        if request.requires_membership() {
            // a node outside the ring would claim every key and pull its neighbours after it
            let phase = self.phase();
            if phase != Phase::Member {
                return Response::Failure(ChordError::OperationRejected(format!(
                    "not a ring member while {phase:?}"
                )));
            }
        }
        match request {
            Request::Ping => Response::Pong,
            Request::GetPredecessor => {
                Response::Predecessor(self.predecessor().map(|p| p.address()))
            }
            Request::SetPredecessor(predecessor) => {
                self.set_predecessor(predecessor);
                Response::Ack
            }
            Request::GetSuccessor(index) => peer_response(self.successor_at(index)),
            Request::SetSuccessor(index, successor) => {
                ack_response(self.set_successor(index, successor))
            }
            Request::GetFinger(level) => peer_response(self.finger_at(level)),
            Request::SetFinger(level, finger) => ack_response(self.set_finger(level, finger)),
            Request::Lookup(key) => match self.lookup_id(key).await {
                Ok(owner) => Response::Peer(owner),
                Err(e) => Response::Failure(e),
            },
            Request::Notify(candidate) => {
                self.notify(candidate);
                Response::Ack
            }
            Request::Store { kind, operation } => self.handle_store(kind, operation),
            Request::Action { name, payload } => self.handle_action(origin, &name, payload).await,
        }
    }

    fn handle_store(&self, kind: StoreKind, operation: StoreRequest) -> Response {
        let identifier = match &operation {
            StoreRequest::Get { identifier, .. } | StoreRequest::Delete(identifier) => {
                Some(identifier.as_str())
            }
            StoreRequest::Post(entry) | StoreRequest::Put(entry) => Some(entry.identifier()),
            StoreRequest::GetAll => None,
        };
        if let Some(Err(e)) = identifier.map(validate_identifier) {
            return Response::Failure(e);
        }

        let store = &self.inner.store;
        match (kind, operation) {
            (StoreKind::Primary, StoreRequest::Get { identifier, since }) => {
                Response::Versioned(store.read(&identifier, since))
            }
            (StoreKind::Primary, StoreRequest::GetAll) => Response::Entries(store.get_all()),
            (StoreKind::Primary, StoreRequest::Post(entry)) => {
                store.post(entry);
                Response::Ack
            }
            (StoreKind::Primary, StoreRequest::Put(entry)) => {
                store.put(entry);
                Response::Ack
            }
            (StoreKind::Primary, StoreRequest::Delete(identifier)) => {
                Response::Entry(store.delete(&identifier))
            }
            (StoreKind::Replica, StoreRequest::Get { identifier, since }) => {
                Response::Versioned(store.read_replication(&identifier, since))
            }
            (StoreKind::Replica, StoreRequest::GetAll) => {
                Response::Entries(store.get_all_replication())
            }
            (StoreKind::Replica, StoreRequest::Post(entry)) => {
                ack_response(store.register_replication(entry).map(|_| ()))
            }
            (StoreKind::Replica, StoreRequest::Put(entry)) => {
                ack_response(store.put_replication(entry))
            }
            (StoreKind::Replica, StoreRequest::Delete(identifier)) => {
                Response::Entry(store.delete_replication(&identifier))
            }
        }
    }

    async fn handle_action(&self, origin: Address, name: &str, payload: Vec<u8>) -> Response {
        let handler = self.inner.action_handler.read().clone();
        let Some(handler) = handler else {
            return Response::Failure(ChordError::OperationRejected(format!(
                "no action handler registered for {name}"
            )));
        };
        match handler.handle_action(origin, name, payload).await {
            Ok(result) => Response::Action(result),
            Err(e) => Response::Failure(ChordError::OperationRejected(format!(
                "action {name} failed: {e:#}"
            ))),
        }
    }
}

fn peer_response(peer: ChordResult<PeerRef>) -> Response {
    match peer {
        Ok(peer) => Response::Peer(peer.address()),
        Err(e) => Response::Failure(e),
    }
}

fn ack_response(result: ChordResult<()>) -> Response {
    match result {
        Ok(()) => Response::Ack,
        Err(e) => Response::Failure(e),
    }
}

impl fmt::Debug for ChordNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("ChordNode")
            .field("me", &self.inner.me)
            .field("phase", &state.phase)
            .field("predecessor", &state.predecessor)
            .field("successors", &state.successors)
            .finish()
    }
}

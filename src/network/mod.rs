//! Typed request/response messaging between ring nodes.
//!
//! Every remote operation of the ring is one [`Request`] variant answered by one [`Response`]
//! variant. Transports only move these values around; they never interpret them.

pub mod mock;
mod processor;

use crate::core::{Address, ChordError, Identifier, Responsibility, Versioned};
use async_trait::async_trait;

pub use processor::MessageProcessor;

/// Which of the two per-node stores a store request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Entries the receiving node owns.
    Primary,
    /// Backups the receiving node keeps for its predecessors.
    Replica,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreRequest {
    /// Fetch one entry, only if it is newer than `since`. Answered with [`Response::Versioned`].
    Get {
        identifier: String,
        since: Option<u64>,
    },
    GetAll,
    /// Merge an entry, ignoring versions that are not newer than the one held.
    Post(Responsibility),
    /// Overwrite an entry.
    Put(Responsibility),
    Delete(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Ping,
    GetPredecessor,
    SetPredecessor(Option<Address>),
    GetSuccessor(usize),
    SetSuccessor(usize, Address),
    GetFinger(usize),
    SetFinger(usize, Address),
    Lookup(Identifier),
    Notify(Address),
    Store {
        kind: StoreKind,
        operation: StoreRequest,
    },
    /// Opaque application-level call, delivered to the registered action handler.
    Action { name: String, payload: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Pong,
    Ack,
    /// Answer to a predecessor query; `None` when the predecessor is unknown.
    Predecessor(Option<Address>),
    /// Answer to successor, finger and lookup queries.
    Peer(Address),
    /// Answer to a delete: the removed entry, if any.
    Entry(Option<Responsibility>),
    /// Answer to a conditional read.
    Versioned(Versioned),
    Entries(Vec<Responsibility>),
    Action(Vec<u8>),
    /// The receiving node processed the request and refused it.
    Failure(ChordError),
}

impl Request {
    /// Ring routing and maintenance requests. Only a ring member answers them; store and action
    /// requests are served in every phase.
    pub fn requires_membership(&self) -> bool {
        match self {
            Request::Ping
            | Request::GetPredecessor
            | Request::SetPredecessor(_)
            | Request::GetSuccessor(_)
            | Request::SetSuccessor(..)
            | Request::GetFinger(_)
            | Request::SetFinger(..)
            | Request::Lookup(_)
            | Request::Notify(_) => true,
            Request::Store { .. } | Request::Action { .. } => false,
        }
    }
}

/// MessageProcessorCore is implemented by the entity that answers incoming requests at a node.
#[async_trait]
pub trait MessageProcessorCore: Send + Sync {
    async fn process_incoming_request(&self, origin: Address, request: Request) -> Response;
}

/// Network is the transport a node uses to reach the other nodes of the ring.
#[async_trait]
pub trait Network: Send + Sync {
    /// Address at which this network endpoint is reachable.
    fn local_address(&self) -> Address;

    /// Delivers `request` to `target` and waits for its response.
    /// An error means the request could not be delivered or answered; a refusal by the target
    /// comes back as `Ok(Response::Failure(_))`.
    async fn send(&self, target: Address, request: Request) -> anyhow::Result<Response>;

    /// Registers the processor that answers requests addressed to this endpoint.
    /// At any point in time, there can be only one processor registered.
    /// Registering a new processor is illegal if there is already a processor registered, and causes an error.
    fn register_processor(&self, processor: MessageProcessor) -> anyhow::Result<()>;
}

//! Location-transparent handle to a ring node.
//!
//! Every ring operation talks to other nodes, and to itself, through [`Peer`]. The node itself
//! is reached through [`LocalPeer`], which answers from in-process state; every other node through
//! [`RemotePeer`], which sends the request over the [`Network`] with a bounded wait.

use crate::core::{Address, ChordError, ChordResult, Identifier, Responsibility, Versioned};
use crate::network::{Network, Request, Response, StoreKind, StoreRequest};
use crate::node::chord_node::ChordNode;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

fn unexpected(address: Address, request: &str, response: Response) -> ChordError {
    ChordError::ProtocolInconsistency(format!(
        "{address} answered {request} with {response:?}"
    ))
}

/// Unwraps a refusal carried in a response into an error.
fn into_result(response: Response) -> ChordResult<Response> {
    match response {
        Response::Failure(err) => Err(err),
        response => Ok(response),
    }
}

#[async_trait]
pub trait Peer: Send + Sync {
    fn address(&self) -> Address;

    /// Delivers one request and returns the answer, with refusals already turned into errors.
    async fn call(&self, request: Request) -> ChordResult<Response>;

    async fn ping(&self) -> ChordResult<()> {
        match self.call(Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(unexpected(self.address(), "ping", other)),
        }
    }

    async fn get_predecessor(&self) -> ChordResult<Option<Address>> {
        match self.call(Request::GetPredecessor).await? {
            Response::Predecessor(predecessor) => Ok(predecessor),
            other => Err(unexpected(self.address(), "get_predecessor", other)),
        }
    }

    async fn set_predecessor(&self, predecessor: Option<Address>) -> ChordResult<()> {
        self.expect_ack(Request::SetPredecessor(predecessor), "set_predecessor")
            .await
    }

    async fn get_successor(&self, index: usize) -> ChordResult<Address> {
        self.expect_peer(Request::GetSuccessor(index), "get_successor")
            .await
    }

    async fn set_successor(&self, index: usize, successor: Address) -> ChordResult<()> {
        self.expect_ack(Request::SetSuccessor(index, successor), "set_successor")
            .await
    }

    async fn get_finger(&self, level: usize) -> ChordResult<Address> {
        self.expect_peer(Request::GetFinger(level), "get_finger").await
    }

    async fn set_finger(&self, level: usize, finger: Address) -> ChordResult<()> {
        self.expect_ack(Request::SetFinger(level, finger), "set_finger")
            .await
    }

    /// Resolves the node responsible for `key`.
    async fn lookup(&self, key: Identifier) -> ChordResult<Address> {
        self.expect_peer(Request::Lookup(key), "lookup").await
    }

    /// Tells the peer that `candidate` might be its predecessor.
    async fn notify(&self, candidate: Address) -> ChordResult<()> {
        self.expect_ack(Request::Notify(candidate), "notify").await
    }

    async fn get_responsibility(
        &self,
        kind: StoreKind,
        identifier: &str,
        since: Option<u64>,
    ) -> ChordResult<Versioned> {
        let operation = StoreRequest::Get {
            identifier: identifier.to_string(),
            since,
        };
        match self.call(Request::Store { kind, operation }).await? {
            Response::Versioned(read) => Ok(read),
            other => Err(unexpected(self.address(), "get_responsibility", other)),
        }
    }

    async fn get_all_responsibilities(&self, kind: StoreKind) -> ChordResult<Vec<Responsibility>> {
        let request = Request::Store {
            kind,
            operation: StoreRequest::GetAll,
        };
        match self.call(request).await? {
            Response::Entries(entries) => Ok(entries),
            other => Err(unexpected(
                self.address(),
                "get_all_responsibilities",
                other,
            )),
        }
    }

    async fn post_responsibility(
        &self,
        kind: StoreKind,
        responsibility: Responsibility,
    ) -> ChordResult<()> {
        let request = Request::Store {
            kind,
            operation: StoreRequest::Post(responsibility),
        };
        self.expect_ack(request, "post_responsibility").await
    }

    async fn put_responsibility(
        &self,
        kind: StoreKind,
        responsibility: Responsibility,
    ) -> ChordResult<()> {
        let request = Request::Store {
            kind,
            operation: StoreRequest::Put(responsibility),
        };
        self.expect_ack(request, "put_responsibility").await
    }

    async fn delete_responsibility(
        &self,
        kind: StoreKind,
        identifier: &str,
    ) -> ChordResult<Option<Responsibility>> {
        let request = Request::Store {
            kind,
            operation: StoreRequest::Delete(identifier.to_string()),
        };
        match self.call(request).await? {
            Response::Entry(entry) => Ok(entry),
            other => Err(unexpected(self.address(), "delete_responsibility", other)),
        }
    }

    /// Invokes the application action handler registered at the peer.
    async fn action(&self, name: &str, payload: Vec<u8>) -> ChordResult<Vec<u8>> {
        let request = Request::Action {
            name: name.to_string(),
            payload,
        };
        match self.call(request).await? {
            Response::Action(result) => Ok(result),
            other => Err(unexpected(self.address(), "action", other)),
        }
    }

    async fn expect_ack(&self, request: Request, name: &str) -> ChordResult<()> {
        match self.call(request).await? {
            Response::Ack => Ok(()),
            other => Err(unexpected(self.address(), name, other)),
        }
    }

    async fn expect_peer(&self, request: Request, name: &str) -> ChordResult<Address> {
        match self.call(request).await? {
            Response::Peer(address) => Ok(address),
            other => Err(unexpected(self.address(), name, other)),
        }
    }
}

/// LocalPeer answers directly from the state of the node it wraps.
pub struct LocalPeer {
    node: ChordNode,
}

impl LocalPeer {
    pub fn new(node: ChordNode) -> Self {
        LocalPeer { node }
    }
}

#[async_trait]
impl Peer for LocalPeer {
    fn address(&self) -> Address {
        self.node.address()
    }

    async fn call(&self, request: Request) -> ChordResult<Response> {
        into_result(self.node.handle_request(self.node.address(), request).await)
    }
}

/// RemotePeer reaches another node over the network.
/// A call that fails to deliver or does not complete within the timeout reports the peer as
/// unreachable.
pub struct RemotePeer {
    origin: Address,
    address: Address,
    net: Arc<dyn Network>,
    timeout: Duration,
}

impl RemotePeer {
    pub fn new(origin: Address, address: Address, net: Arc<dyn Network>, timeout: Duration) -> Self {
        RemotePeer {
            origin,
            address,
            net,
            timeout,
        }
    }
}

#[async_trait]
impl Peer for RemotePeer {
    fn address(&self) -> Address {
        self.address
    }

    async fn call(&self, request: Request) -> ChordResult<Response> {
        match tokio::time::timeout(self.timeout, self.net.send(self.address, request)).await {
            Ok(Ok(response)) => into_result(response),
            Ok(Err(err)) => Err(ChordError::unreachable(self.address, format!("{err:#}"))),
            Err(_) => {
                tracing::debug!(
                    "request from {} to {} timed out after {:?}",
                    self.origin,
                    self.address,
                    self.timeout
                );
                Err(ChordError::unreachable(
                    self.address,
                    format!("no answer within {:?}", self.timeout),
                ))
            }
        }
    }
}

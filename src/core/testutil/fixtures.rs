use crate::core::clock::ClockMock;
use crate::core::ring;
use crate::core::{Address, Clock, Identifier, PeerRef, RingConfig};
use crate::network::mock::hub::NetworkHub;
use crate::node::ChordNode;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, Span};
use unimock::{matching, MockFn, Unimock};

static NEXT_PORT: AtomicU16 = AtomicU16::new(20_000);

/// Root span for tests; installs a test-writer subscriber the first time it is called.
pub fn span_fixture() -> Span {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_test_writer()
        .try_init();
    tracing::span!(Level::INFO, "test")
}

/// A port no other fixture in this process has handed out.
pub fn unique_port() -> u16 {
    NEXT_PORT.fetch_add(1, Ordering::Relaxed)
}

/// Generate a fresh address on localhost.
pub fn random_address() -> Address {
    Address::new("localhost", &unique_port().to_string())
}

/// Generate a peer at a fresh address in a ring of `bits` bits.
pub fn random_peer(bits: u32) -> PeerRef {
    PeerRef::new(random_address(), bits)
}

/// Generate `n` fresh addresses whose ids are pairwise distinct in a ring of `bits` bits.
pub fn distinct_addresses(n: usize, bits: u32) -> Vec<Address> {
    let mut seen = HashSet::new();
    let mut addresses = Vec::with_capacity(n);
    while addresses.len() < n {
        let address = random_address();
        if seen.insert(ring::hash(&address.to_string(), bits)) {
            addresses.push(address);
        }
    }
    addresses
}

/// A clock frozen at `millis`.
pub fn fixed_clock(millis: u64) -> Arc<dyn Clock> {
    Arc::new(Unimock::new(
        ClockMock::now_millis
            .each_call(matching!())
            .returns(millis),
    ).no_verify_in_drop())
}

/// Ring settings for tests: 8-bit ids, a short rpc timeout, and maintenance intervals long
/// enough that tests drive every routine by hand.
pub fn test_config() -> RingConfig {
    RingConfig::default()
        .with_bits(8)
        .with_successor_list_size(3)
        .with_rpc_timeout(Duration::from_millis(200))
        .with_stabilize_interval(Duration::from_secs(3600))
}

/// Creates a standalone node on the hub at `address`.
pub fn new_node(hub: &Arc<NetworkHub>, address: Address, config: &RingConfig) -> ChordNode {
    let net = NetworkHub::new_mock_network(hub, address).unwrap();
    ChordNode::new(&span_fixture(), config.clone(), Arc::new(net)).unwrap()
}

/// Polls `condition` until it holds or `timeout` expires. Returns whether it held.
pub async fn wait_until<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Gives spawned work (join repopulation, replica pushes) the chance to run to completion.
/// None of it waits on real time while every peer is reachable.
pub async fn drain_background_tasks() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Runs `f` on every node in order.
pub async fn for_each_node<F, Fut>(nodes: &[ChordNode], f: F)
where
    F: Fn(ChordNode) -> Fut,
    Fut: Future<Output = ()>,
{
    for node in nodes {
        f(node.clone()).await;
    }
}

/// One maintenance round on every live node: drop dead predecessors, stabilize, then refill
/// successor lists and fingers.
pub async fn maintenance_round(nodes: &[ChordNode]) {
    for_each_node(nodes, |node| async move { node.check_predecessor().await }).await;
    for_each_node(nodes, |node| async move { node.stabilize().await }).await;
    for_each_node(nodes, |node| async move {
        node.refresh_successor_list().await;
        node.refresh_fingers().await;
    })
    .await;
}

/// Nodes ordered clockwise by id.
pub fn sorted_by_id(nodes: &[ChordNode]) -> Vec<ChordNode> {
    let mut sorted = nodes.to_vec();
    sorted.sort_by_key(|node| node.id());
    sorted
}

/// The node that owns `key`: the first id at or after it, wrapping around.
pub fn expected_owner(nodes: &[ChordNode], key: Identifier) -> ChordNode {
    let sorted = sorted_by_id(nodes);
    sorted
        .iter()
        .find(|node| node.id() >= key)
        .unwrap_or(&sorted[0])
        .clone()
}

/// True once every node's successor and predecessor match the ring order.
pub fn is_converged(nodes: &[ChordNode]) -> bool {
    let sorted = sorted_by_id(nodes);
    let n = sorted.len();
    (0..n).all(|i| {
        let next = &sorted[(i + 1) % n];
        let prev = &sorted[(i + n - 1) % n];
        sorted[i].successor() == next.peer_ref()
            && (n == 1 || sorted[i].predecessor() == Some(prev.peer_ref()))
    })
}

/// Runs maintenance rounds until the ring order is reflected everywhere, plus one final round so
/// fingers and successor lists settle on the converged ring.
pub async fn converge(nodes: &[ChordNode]) {
    for _ in 0..(4 * nodes.len() + 4) {
        maintenance_round(nodes).await;
        if is_converged(nodes) {
            maintenance_round(nodes).await;
            return;
        }
    }
    panic!("ring of {} nodes did not converge", nodes.len());
}

/// A ring of nodes sharing one in-memory hub.
pub struct TestRing {
    pub hub: Arc<NetworkHub>,
    pub nodes: Vec<ChordNode>,
    pub config: RingConfig,
}

impl TestRing {
    /// Creates a ring from the first node, joins the others through it one by one, and
    /// stabilizes until every node agrees on the ring order.
    pub async fn build(n: usize, config: RingConfig) -> TestRing {
        let hub = NetworkHub::new();
        let nodes: Vec<ChordNode> = distinct_addresses(n, config.bits)
            .into_iter()
            .map(|address| new_node(&hub, address, &config))
            .collect();

        nodes[0].create().unwrap();
        for (i, node) in nodes.iter().enumerate().skip(1) {
            node.join(nodes[0].address()).await.unwrap();
            drain_background_tasks().await;
            maintenance_round(&nodes[..=i]).await;
        }
        converge(&nodes).await;
        TestRing { hub, nodes, config }
    }

    /// Cuts `node` off the hub; every request to or from it fails from now on.
    pub fn kill(&mut self, node: &ChordNode) {
        self.hub.disconnect(node.address());
        self.nodes.retain(|n| n.address() != node.address());
    }

    pub fn sorted(&self) -> Vec<ChordNode> {
        sorted_by_id(&self.nodes)
    }

    pub fn owner_of(&self, key: Identifier) -> ChordNode {
        expected_owner(&self.nodes, key)
    }

    pub fn owner_of_identifier(&self, identifier: &str) -> ChordNode {
        self.owner_of(ring::hash(identifier, self.config.bits))
    }
}

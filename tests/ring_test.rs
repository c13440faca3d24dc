use chordring::core::{Address, RingConfig};
use chordring::network::mock::hub::NetworkHub;
use chordring::node::{ChordNode, Phase};
use std::sync::Arc;
use std::time::Duration;
use tracing::Span;

fn node_at(hub: &Arc<NetworkHub>, port: u16, config: &RingConfig) -> ChordNode {
    let address = Address::new("127.0.0.1", &port.to_string());
    let net = NetworkHub::new_mock_network(hub, address).unwrap();
    ChordNode::new(&Span::none(), config.clone(), Arc::new(net)).unwrap()
}

/// Nodes left to their own maintenance tasks agree on the owner of every key, and a
/// responsibility registered on any node ends up at its owner.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ring_converges_in_the_background() {
    let config = RingConfig::default()
        .with_bits(16)
        .with_rpc_timeout(Duration::from_millis(200))
        .with_stabilize_interval(Duration::from_millis(20))
        .with_responsibility_cooldown(2);
    let hub = NetworkHub::new();
    let nodes: Vec<ChordNode> = (0..4).map(|i| node_at(&hub, 9000 + i, &config)).collect();

    nodes[0].create().unwrap();
    for node in &nodes[1..] {
        node.join(nodes[0].address()).await.unwrap();
    }
    assert!(nodes.iter().all(|n| n.phase() == Phase::Member));

    nodes[1]
        .register_responsibility("weather", b"sunny".to_vec())
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        let mut owners = Vec::new();
        for node in &nodes {
            owners.push(node.lookup_responsible("weather").await.ok());
        }
        let agreed = owners.windows(2).all(|w| w[0] == w[1]) && owners[0].is_some();
        let stored = agreed
            && nodes.iter().any(|n| {
                Some(n.address()) == owners[0] && n.store().is_primary("weather")
            });
        if stored {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "ring did not settle: owners {owners:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let holders = nodes
        .iter()
        .filter(|n| n.store().is_primary("weather"))
        .count();
    assert_eq!(holders, 1);
}

use crate::core::testutil::fixtures::{new_node, random_address, test_config};
use crate::core::{ChordError, Responsibility, Versioned};
use crate::network::mock::hub::NetworkHub;
use crate::network::StoreKind;
use crate::node::Peer;
use std::time::{Duration, Instant};

/// A peer that never answers is reported unreachable once the rpc timeout expires.
#[tokio::test]
async fn test_remote_timeout_maps_to_unreachable() {
    let hub = NetworkHub::new();
    let config = test_config();
    let caller = new_node(&hub, random_address(), &config);
    let silent = new_node(&hub, random_address(), &config);
    hub.blackhole(silent.address());

    let started = Instant::now();
    let result = caller.peer(&silent.address()).ping().await;
    let elapsed = started.elapsed();

    match result {
        Err(ChordError::PeerUnreachable { address, .. }) => assert_eq!(address, silent.address()),
        other => panic!("expected PeerUnreachable, got {other:?}"),
    }
    assert!(elapsed >= config.rpc_timeout);
    assert!(elapsed < Duration::from_secs(5));
}

#[tokio::test]
async fn test_remote_transport_error_maps_to_unreachable() {
    let hub = NetworkHub::new();
    let config = test_config();
    let caller = new_node(&hub, random_address(), &config);
    let gone = new_node(&hub, random_address(), &config);
    hub.disconnect(gone.address());

    let err = caller.peer(&gone.address()).ping().await.unwrap_err();
    assert!(err.is_unreachable());

    let err = caller.peer(&random_address()).ping().await.unwrap_err();
    assert!(err.is_unreachable());
}

/// The node's own address resolves to an in-process handle that answers from local state.
#[tokio::test]
async fn test_local_peer_answers_in_process() {
    let hub = NetworkHub::new();
    let node = new_node(&hub, random_address(), &test_config());
    node.create().unwrap();
    let local = node.peer(&node.address());

    assert_eq!(local.address(), node.address());
    local.ping().await.unwrap();
    assert_eq!(local.get_successor(0).await.unwrap(), node.address());
    assert_eq!(local.get_predecessor().await.unwrap(), None);
    assert!(matches!(
        local.get_successor(3).await,
        Err(ChordError::Validation(_))
    ));
}

/// A refusal by a live peer travels back as the refusal, not as peer death.
#[tokio::test]
async fn test_remote_refusal_is_not_unreachable() {
    let hub = NetworkHub::new();
    let config = test_config();
    let caller = new_node(&hub, random_address(), &config);
    let target = new_node(&hub, random_address(), &config);
    target.create().unwrap();
    let remote = caller.peer(&target.address());

    assert!(matches!(
        remote.get_finger(config.finger_count()).await,
        Err(ChordError::Validation(_))
    ));
    assert!(matches!(
        remote.action("echo", vec![]).await,
        Err(ChordError::OperationRejected(_))
    ));
}

/// A node outside the ring refuses routing and maintenance requests but still serves its store.
#[tokio::test]
async fn test_standalone_node_refuses_ring_requests() {
    let hub = NetworkHub::new();
    let config = test_config();
    let caller = new_node(&hub, random_address(), &config);
    let outsider = new_node(&hub, random_address(), &config);
    let remote = caller.peer(&outsider.address());

    let err = remote.ping().await.unwrap_err();
    assert!(matches!(err, ChordError::OperationRejected(_)));
    assert!(!err.is_unreachable());
    assert!(remote.get_predecessor().await.is_err());
    assert!(remote.get_successor(0).await.is_err());
    assert!(remote.notify(caller.address()).await.is_err());
    assert!(remote.set_successor(0, caller.address()).await.is_err());
    assert!(remote.set_finger(1, caller.address()).await.is_err());

    // refused requests leave the outsider untouched
    assert_eq!(outsider.predecessor(), None);
    assert_eq!(outsider.successor(), outsider.peer_ref());
    assert_eq!(outsider.finger_at(1).unwrap(), outsider.peer_ref());

    remote
        .post_responsibility(
            StoreKind::Primary,
            Responsibility::new("weather", b"sunny".to_vec(), Some(1)),
        )
        .await
        .unwrap();
    assert!(outsider.store().is_primary("weather"));
}

#[tokio::test]
async fn test_remote_setters_update_target_state() {
    let hub = NetworkHub::new();
    let config = test_config();
    let caller = new_node(&hub, random_address(), &config);
    let target = new_node(&hub, random_address(), &config);
    target.create().unwrap();
    let remote = caller.peer(&target.address());

    remote.set_successor(1, caller.address()).await.unwrap();
    remote.set_finger(4, caller.address()).await.unwrap();
    remote.set_predecessor(Some(caller.address())).await.unwrap();

    assert_eq!(target.successor_at(1).unwrap(), caller.peer_ref());
    assert_eq!(remote.get_finger(4).await.unwrap(), caller.address());
    assert_eq!(target.predecessor(), Some(caller.peer_ref()));

    remote.set_predecessor(None).await.unwrap();
    assert_eq!(target.predecessor(), None);
}

/// Both stores of a remote node are reachable, and a replica is refused for a primary identifier.
#[tokio::test]
async fn test_remote_store_requests() {
    let hub = NetworkHub::new();
    let config = test_config();
    let caller = new_node(&hub, random_address(), &config);
    let target = new_node(&hub, random_address(), &config);
    let remote = caller.peer(&target.address());

    let entry = Responsibility::new("weather", b"sunny".to_vec(), Some(5));
    remote
        .post_responsibility(StoreKind::Replica, entry.clone())
        .await
        .unwrap();
    assert_eq!(
        remote
            .get_responsibility(StoreKind::Replica, "weather", None)
            .await
            .unwrap(),
        Versioned::Newer(entry.clone())
    );
    assert_eq!(
        remote
            .get_responsibility(StoreKind::Replica, "weather", Some(5))
            .await
            .unwrap(),
        Versioned::Unchanged
    );
    assert_eq!(
        remote
            .get_responsibility(StoreKind::Primary, "weather", None)
            .await
            .unwrap(),
        Versioned::Absent
    );

    remote
        .put_responsibility(StoreKind::Primary, Responsibility::new("sports", vec![1], Some(1)))
        .await
        .unwrap();
    assert!(matches!(
        remote
            .post_responsibility(
                StoreKind::Replica,
                Responsibility::new("sports", vec![2], Some(2))
            )
            .await,
        Err(ChordError::OperationRejected(_))
    ));
    assert_eq!(
        remote
            .get_all_responsibilities(StoreKind::Primary)
            .await
            .unwrap()
            .len(),
        1
    );

    let removed = remote
        .delete_responsibility(StoreKind::Replica, "weather")
        .await
        .unwrap();
    assert_eq!(removed, Some(entry));
    assert!(remote
        .get_all_responsibilities(StoreKind::Replica)
        .await
        .unwrap()
        .is_empty());

    assert!(matches!(
        remote.get_responsibility(StoreKind::Primary, "", None).await,
        Err(ChordError::Validation(_))
    ));
}

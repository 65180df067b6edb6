//! Scatter-gather tests: multi-node key enumeration, cluster-wide commands,
//! partial and total failure

mod common;

use common::{MockNode, dead_endpoint, two_node_cluster};
use slotwise::{ClusterClient, ClusterConfig, SlotwiseError, hash_slot};
use std::time::Duration;

#[tokio::test]
async fn collects_all_keys_in_cluster() {
    let (_node_a, _node_b, client) = two_node_cluster().await;

    client.kv().set("key-1", "foo").await.unwrap();
    client.kv().set("key-2", "bar").await.unwrap();

    let keys = client.cluster().keys("*").await.unwrap();
    assert!(keys.merged.contains(&"key-1".to_string()));
    assert!(keys.merged.contains(&"key-2".to_string()));
    assert!(!keys.is_partial());
    assert!(keys.duplicates.is_empty());
}

#[tokio::test]
async fn reads_all_keys_from_single_cluster_node() {
    let (node_a, node_b, client) = two_node_cluster().await;

    // 2-key hashes into B's range alongside key-2
    assert!(hash_slot(b"2-key") > 5460);

    client.kv().set("key-1", "foo").await.unwrap();
    client.kv().set("key-2", "bar").await.unwrap();
    client.kv().set("2-key", "bar").await.unwrap();

    let on_b = client
        .cluster()
        .keys_on_node(&node_b.endpoint(), "*")
        .await
        .unwrap();
    assert!(on_b.contains(&"key-2".to_string()));
    assert!(on_b.contains(&"2-key".to_string()));
    assert!(!on_b.contains(&"key-1".to_string()));

    let on_a = client
        .cluster()
        .keys_on_node(&node_a.endpoint(), "*")
        .await
        .unwrap();
    assert_eq!(on_a, vec!["key-1".to_string()]);
}

#[tokio::test]
async fn pattern_scatter_survives_a_dead_node() {
    let node_a = MockNode::start().await;
    let node_b = MockNode::start().await;
    let dead = dead_endpoint().await;

    // key-1 (229) -> A, key-2 (12422) -> B, dead owns the tail
    let views = vec![
        (0, 5460, node_a.endpoint()),
        (5461, 12999, node_b.endpoint()),
        (13000, 16383, dead.clone()),
    ];
    node_a.set_slots(views.clone());
    node_b.set_slots(views);

    let config = ClusterConfig::new([node_a.endpoint()])
        .with_connect_timeout(Duration::from_millis(200))
        .with_command_timeout(Duration::from_millis(500));
    let client = ClusterClient::connect(config).await.unwrap();

    client.kv().set("key-1", "foo").await.unwrap();
    client.kv().set("key-2", "bar").await.unwrap();

    let keys = client.cluster().keys("*").await.unwrap();
    assert!(keys.is_partial());
    assert_eq!(keys.failures.len(), 1);
    assert_eq!(keys.failures[0].node, dead);
    assert!(matches!(
        keys.failures[0].error,
        SlotwiseError::NodeUnreachable { .. }
    ));
    assert!(keys.merged.contains(&"key-1".to_string()));
    assert!(keys.merged.contains(&"key-2".to_string()));
}

#[tokio::test]
async fn total_scatter_failure_is_an_error() {
    let (node_a, node_b, client) = two_node_cluster().await;
    let dead = dead_endpoint().await;

    let all_dead = vec![(0, 16383, dead)];
    node_a.set_slots(all_dead.clone());
    node_b.set_slots(all_dead);
    client.cluster().refresh().await.unwrap();

    let err = client.cluster().keys("*").await.unwrap_err();
    assert!(matches!(err, SlotwiseError::AllNodesFailed));

    // Point commands against the dead owner fail loudly too
    let err = client.kv().set("key-1", "foo").await.unwrap_err();
    assert!(matches!(err, SlotwiseError::NodeUnreachable { .. }));
}

#[tokio::test]
async fn flush_all_clears_every_master() {
    let (node_a, node_b, client) = two_node_cluster().await;

    client.kv().set("key-1", "foo").await.unwrap();
    client.kv().set("key-2", "bar").await.unwrap();

    let outcome = client.cluster().flush_all().await.unwrap();
    assert!(!outcome.is_partial());
    assert_eq!(node_a.key_count(), 0);
    assert_eq!(node_b.key_count(), 0);
    assert!(client.cluster().keys("*").await.unwrap().merged.is_empty());
}

#[tokio::test]
async fn db_size_sums_across_masters() {
    let (_node_a, _node_b, client) = two_node_cluster().await;

    client.kv().set("key-1", "foo").await.unwrap();
    client.kv().set("key-2", "bar").await.unwrap();
    client.kv().set("2-key", "baz").await.unwrap();

    let outcome = client.cluster().db_size().await.unwrap();
    assert_eq!(outcome.merged, 3);
    assert!(!outcome.is_partial());
}

#[tokio::test]
async fn ping_all_reaches_every_master() {
    let (_node_a, _node_b, client) = two_node_cluster().await;
    let outcome = client.cluster().ping_all().await.unwrap();
    assert!(!outcome.is_partial());
}

#[tokio::test]
async fn pattern_is_forwarded_to_nodes() {
    let (_node_a, _node_b, client) = two_node_cluster().await;

    client.kv().set("user:1", "a").await.unwrap();
    client.kv().set("user:2", "b").await.unwrap();
    client.kv().set("order:1", "c").await.unwrap();

    let keys = client.cluster().keys("user:*").await.unwrap();
    assert_eq!(keys.merged.len(), 2);
    assert!(keys.merged.iter().all(|key| key.starts_with("user:")));
}

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{init_logging, MockTransport};
use pretty_assertions::assert_eq;
use tracker_core::{CloseReason, ConnectionState, ReconnectPolicy};
use tracker_engine::TaskConnectionRegistry;

fn registry(transport: &Arc<MockTransport>) -> TaskConnectionRegistry {
    TaskConnectionRegistry::new(transport.clone(), ReconnectPolicy::default())
}

#[tokio::test(start_paused = true)]
async fn last_release_closes_the_connection() {
    init_logging();
    let (transport, mut peers) = MockTransport::new();
    let registry = registry(&transport);

    let first = registry.acquire("t");
    let second = registry.acquire("t");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.ref_count("t"), 2);

    let peer = peers.recv().await.expect("connect");
    assert!(!registry.release("t"));
    assert_eq!(registry.ref_count("t"), 1);
    assert!(!first.is_closed());
    assert!(!peer.was_closed_by_client());

    assert!(registry.release("t"));
    assert!(!registry.contains("t"));
    first.closed().await;
    assert!(peer.was_closed_by_client());
    assert_eq!(
        second.connection_status().close_reason,
        Some(CloseReason::Requested)
    );
    assert_eq!(transport.connects(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquires_share_one_connection() {
    init_logging();
    let (transport, _peers) = MockTransport::new();
    let registry = registry(&transport);

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.acquire("shared") })
        })
        .collect();
    let mut managers = Vec::new();
    for handle in handles {
        managers.push(handle.await.expect("acquire task"));
    }

    assert!(managers.iter().all(|m| Arc::ptr_eq(m, &managers[0])));
    assert_eq!(registry.ref_count("shared"), 32);
    assert_eq!(registry.len(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.connects(), 1);
    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unknown_release_is_ignored() {
    init_logging();
    let (transport, _peers) = MockTransport::new();
    let registry = registry(&transport);
    let manager = registry.acquire("known");

    assert!(!registry.release("unknown"));
    assert_eq!(registry.ref_count("known"), 1);
    assert!(!manager.is_closed());
}

#[tokio::test(start_paused = true)]
async fn tasks_get_separate_connections() {
    init_logging();
    let (transport, mut peers) = MockTransport::new();
    let registry = registry(&transport);

    let a = registry.acquire("a");
    let b = registry.acquire("b");
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(registry.len(), 2);

    let mut seen = vec![
        peers.recv().await.expect("first").task_id,
        peers.recv().await.expect("second").task_id,
    ];
    seen.sort();
    assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);

    assert!(registry.release("a"));
    a.closed().await;
    assert_eq!(b.connection_status().state, ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn acquire_after_teardown_opens_a_new_connection() {
    init_logging();
    let (transport, _peers) = MockTransport::new();
    let registry = registry(&transport);

    let old = registry.acquire("t");
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.connects(), 1);
    registry.release("t");
    old.closed().await;

    let new = registry.acquire("t");
    assert!(!Arc::ptr_eq(&old, &new));
    assert!(!new.is_closed());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_everything() {
    init_logging();
    let (transport, _peers) = MockTransport::new();
    let registry = registry(&transport);
    let a = registry.acquire("a");
    let b = registry.acquire("b");
    let _extra = registry.acquire("b");

    registry.shutdown().await;

    assert!(registry.is_empty());
    assert!(a.is_closed());
    assert!(b.is_closed());
    // References taken before shutdown no longer affect the registry.
    assert!(!registry.release("b"));
}

//! End-to-end scenarios for a running exchange session.
//!
//! Each test starts a full [`ExchangeSession`] against the in-memory
//! collaborators and drives it through its public API only.

use std::time::Duration;

use cidswap_core::error::ExchangeError;
use cidswap_exchange::{ExchangeConfig, ExchangeSession};
use cidswap_tests::helpers::*;

/// Short rebroadcast period, long search deadline.
fn eager_rebroadcast() -> ExchangeConfig {
    ExchangeConfig {
        rebroadcast_interval: Duration::from_millis(50),
        provider_request_timeout: Duration::from_secs(5),
        provide_timeout: Duration::from_secs(5),
        ..ExchangeConfig::testing()
    }
}

/// Rebroadcast effectively disabled.
fn quiet() -> ExchangeConfig {
    ExchangeConfig {
        rebroadcast_interval: Duration::from_secs(3600),
        ..ExchangeConfig::testing()
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn want_finds_and_dials_provider_without_duplicate_search() {
    let cluster = Cluster::new();
    cluster.provide("X", "Q");
    cluster.routing.set_connect_delay(Duration::from_millis(400));
    let session = cluster.start(eager_rebroadcast());

    session.want(cid("X"), 1).await.unwrap();
    cluster.routing.wait_for_searches(&cid("X"), 1).await;

    // Several rebroadcast ticks land while the dial is still pending.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(cluster.routing.connected().is_empty());
    assert_eq!(cluster.routing.search_count(&cid("X")), 1);
    assert_eq!(session.stats().active_queries, 1);

    cluster.routing.wait_for_connects(1).await;
    assert_eq!(cluster.routing.connected(), vec![peer("Q")]);

    // Resolving the want stops further rebroadcasts, so the set drains.
    session.has_block(cid("X")).await.unwrap();
    eventually("active query set drains", || session.stats().active_queries == 0).await;
    assert!(session.wantlist().is_empty());

    session.shutdown().await;
}

#[tokio::test]
async fn explicit_resubmission_during_search_is_coalesced() {
    let cluster = Cluster::new();
    cluster.provide("X", "Q");
    cluster.routing.set_connect_delay(Duration::from_millis(200));
    let session = cluster.start(quiet());

    session.want(cid("X"), 1).await.unwrap();
    cluster.routing.wait_for_searches(&cid("X"), 1).await;
    session.want(cid("X"), 5).await.unwrap();
    session.want(cid("X"), 5).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(cluster.routing.search_count(&cid("X")), 1);
    assert_eq!(session.wantlist().len(), 1);
    assert_eq!(session.wantlist()[0].priority, 5);
    session.shutdown().await;
}

#[tokio::test]
async fn unreachable_provider_does_not_block_the_rest() {
    let cluster = Cluster::new();
    for p in ["P1", "P2", "P3"] {
        cluster.provide("X", p);
    }
    cluster.routing.fail_connect(peer("P2"));
    let session = cluster.start(quiet());

    session.want(cid("X"), 0).await.unwrap();
    cluster.routing.wait_for_connects(2).await;
    eventually("search completes", || session.stats().active_queries == 0).await;

    let mut connected = cluster.routing.connected();
    connected.sort();
    let mut expected = vec![peer("P1"), peer("P3")];
    expected.sort();
    assert_eq!(connected, expected);
    session.shutdown().await;
}

#[tokio::test]
async fn provider_cap_limits_dials() {
    let cluster = Cluster::new();
    for i in 0..10 {
        cluster.provide("X", &format!("P{i}"));
    }
    let config = ExchangeConfig {
        max_providers_per_request: 3,
        ..quiet()
    };
    let session = cluster.start(config);

    session.want(cid("X"), 0).await.unwrap();
    cluster.routing.wait_for_connects(3).await;
    eventually("search completes", || session.stats().active_queries == 0).await;
    assert_eq!(cluster.routing.connected().len(), 3);
    session.shutdown().await;
}

#[tokio::test]
async fn cancel_want_aborts_pending_dials() {
    let cluster = Cluster::new();
    cluster.provide("X", "Q");
    cluster.routing.set_connect_delay(Duration::from_secs(30));
    let session = cluster.start(quiet());

    session.want(cid("X"), 0).await.unwrap();
    cluster.routing.wait_for_searches(&cid("X"), 1).await;
    assert!(session.cancel_want(&cid("X")));

    eventually("search aborted", || session.stats().active_queries == 0).await;
    assert!(cluster.routing.connected().is_empty());
    session.shutdown().await;
}

#[tokio::test]
async fn rebroadcast_retries_an_unresolved_want() {
    let cluster = Cluster::new();
    let session = cluster.start(eager_rebroadcast());

    // No providers yet: the first search comes back empty.
    session.want(cid("X"), 0).await.unwrap();
    cluster.routing.wait_for_searches(&cid("X"), 1).await;

    cluster.provide("X", "Q");
    cluster.routing.wait_for_connects(1).await;
    assert!(cluster.routing.search_count(&cid("X")) >= 2);
    session.shutdown().await;
}

// ---------------------------------------------------------------------------
// Announce
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_slot_announces_complete_in_arrival_order() {
    let cluster = Cluster::new();
    cluster.routing.set_provide_delay(Duration::from_millis(30));
    let config = ExchangeConfig {
        provide_worker_max: 1,
        provide_timeout: Duration::from_secs(5),
        ..quiet()
    };
    let session = cluster.start(config);

    for label in ["A", "B", "C"] {
        session.has_block(cid(label)).await.unwrap();
    }
    cluster.routing.wait_for_announcements(3).await;

    assert_eq!(cluster.routing.announced(), vec![cid("A"), cid("B"), cid("C")]);
    assert_eq!(cluster.routing.peak_concurrent_provides(), 1);
    session.shutdown().await;
}

#[tokio::test]
async fn announce_concurrency_respects_worker_max() {
    let cluster = Cluster::new();
    cluster.routing.set_provide_delay(Duration::from_millis(40));
    let config = ExchangeConfig {
        provide_worker_max: 3,
        provide_timeout: Duration::from_secs(5),
        ..quiet()
    };
    let session = cluster.start(config);

    for i in 0..12 {
        session.has_block(cid(&format!("blk{i}"))).await.unwrap();
    }
    cluster.routing.wait_for_announcements(12).await;

    let peak = cluster.routing.peak_concurrent_provides();
    assert!(peak <= 3, "peak {peak} exceeds the announce limit");
    session.shutdown().await;
}

#[tokio::test]
async fn failed_announces_do_not_stall_the_pipeline() {
    let cluster = Cluster::new();
    cluster.routing.fail_provide(true);
    let session = cluster.start(quiet());

    for label in ["A", "B", "C", "D"] {
        session.has_block(cid(label)).await.unwrap();
    }
    cluster.routing.wait_for_provide_attempts(4).await;
    assert!(cluster.routing.announced().is_empty());
    session.shutdown().await;
}

#[tokio::test]
async fn provide_disabled_skips_announce() {
    let cluster = Cluster::new();
    let config = ExchangeConfig {
        provide_enabled: false,
        ..quiet()
    };
    let session = cluster.start(config);

    session.want(cid("A"), 0).await.unwrap();
    session.has_block(cid("A")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(session.wantlist().is_empty());
    assert_eq!(cluster.routing.provide_attempts(), 0);
    assert_eq!(session.stats().provide_buf_len, 0);
    session.shutdown().await;
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[tokio::test]
async fn outbound_envelopes_update_counters() {
    let cluster = Cluster::new();
    let session = cluster.start(quiet());

    cluster.engine.offer(envelope("R1", b"hello"));
    cluster.engine.offer(envelope("R2", b"world!"));
    cluster.network.wait_for_sends(2).await;
    eventually("counters updated", || session.stats().blocks_sent == 2).await;

    let stats = session.stats();
    assert_eq!(stats.data_sent, 11);
    assert_eq!(cluster.engine.message_sent_count(), 2);
    session.shutdown().await;
}

#[tokio::test]
async fn withdrawn_offers_never_reach_the_transport() {
    let cluster = Cluster::new();
    let session = cluster.start(quiet());

    let withdrawn = cluster.engine.offer_pending();
    let fulfilled = cluster.engine.offer_pending();
    withdrawn.withdraw();
    fulfilled.fulfil(envelope("R", b"kept")).unwrap();
    cluster.network.wait_for_sends(1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(cluster.network.sent(), vec![envelope("R", b"kept")]);
    assert_eq!(cluster.engine.message_sent_count(), 1);
    session.shutdown().await;
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn calls_after_cancellation_are_rejected() {
    let cluster = Cluster::new();
    let session = cluster.start(quiet());
    session.cancellation_token().cancel();

    assert!(!session.is_running());
    assert!(matches!(session.want(cid("X"), 0).await, Err(ExchangeError::ShuttingDown)));
    assert!(matches!(session.has_block(cid("X")).await, Err(ExchangeError::ShuttingDown)));
    session.shutdown().await;
}

#[tokio::test]
async fn shutdown_returns_with_work_in_flight() {
    let cluster = Cluster::new();
    cluster.provide("X", "Q");
    cluster.routing.set_connect_delay(Duration::from_secs(30));
    cluster.routing.set_provide_delay(Duration::from_secs(30));
    let session = cluster.start(quiet());

    session.want(cid("X"), 0).await.unwrap();
    session.has_block(cid("Y")).await.unwrap();
    cluster.network.set_send_delay(Duration::from_secs(3600));
    let _held = cluster.engine.offer_pending();
    cluster.engine.offer(envelope("R", b"stalled"));
    cluster.routing.wait_for_provide_attempts(1).await;
    cluster.network.wait_for_attempts(1).await;

    tokio::time::timeout(Duration::from_secs(2), session.shutdown())
        .await
        .expect("shutdown waited on detached work");
}

#[tokio::test]
async fn invalid_config_is_rejected_at_start() {
    let cluster = Cluster::new();
    let config = ExchangeConfig {
        task_worker_count: 0,
        ..quiet()
    };
    let err = ExchangeSession::start(
        config,
        cluster.routing.clone(),
        cluster.engine.clone(),
        cluster.network.clone(),
    )
    .unwrap_err();
    assert!(matches!(err, ExchangeError::Config(_)));
}

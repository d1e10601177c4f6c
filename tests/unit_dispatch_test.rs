// Unit tests for the dispatcher's five replication patterns.

mod common;

use common::{harness, single_group, two_groups, wait_for_drain};
use hustgate::core::backend::{BackendOp, OpParams, ParamKey};
use std::time::Duration;

fn key_params(key: &[u8]) -> OpParams {
    OpParams::new().with(ParamKey::Key, key.to_vec())
}

#[tokio::test]
async fn write_all_full_success_leaves_no_binlog() {
    let h = harness(single_group(("a", true), ("b", true)), 16).await;
    h.transport.respond("a", 200, 1, b"");
    h.transport.respond("b", 200, 1, b"");

    let response = h
        .dispatcher
        .write_all(BackendOp::Put, b"foo", key_params(b"foo"), Some(b"bar"[..].into()))
        .await;

    assert!(response.is_ok());
    assert_eq!(h.binlog.total_pending().await, 0);
    // No binlog file was even created.
    assert_eq!(
        std::fs::read_dir(h.binlog_dir.path()).unwrap().count(),
        0
    );
}

#[tokio::test]
async fn write_all_partial_success_appends_then_drains_binlog() {
    let h = harness(single_group(("a", true), ("b", true)), 16).await;
    h.transport.respond("a", 200, 1, b"");
    h.transport.respond("b", 500, 0, b"");

    let response = h
        .dispatcher
        .write_all(BackendOp::Put, b"foo", key_params(b"foo"), Some(b"bar"[..].into()))
        .await;

    // The client still sees success, and exactly one record is queued for
    // the replica that missed the write.
    assert!(response.is_ok());
    assert_eq!(h.binlog.pending_for("b").await, 1);

    // Once b recovers, the replay worker drains the record.
    h.transport.respond("b", 200, 1, b"");
    assert!(wait_for_drain(&h.binlog, Duration::from_secs(2)).await);

    // The replayed call carried the original operation.
    let replayed = h
        .transport
        .calls()
        .into_iter()
        .filter(|c| c.host == "b" && c.op == BackendOp::Put)
        .next_back()
        .unwrap();
    assert_eq!(replayed.params.get(ParamKey::Key).unwrap().as_ref(), b"foo");
    assert_eq!(replayed.body.as_deref(), Some(&b"bar"[..]));
}

#[tokio::test]
async fn write_all_total_failure_appends_nothing() {
    // P5: succ == 0 means there is nothing to replicate from.
    let h = harness(single_group(("a", true), ("b", true)), 16).await;
    h.transport.respond("a", 500, 0, b"");
    h.transport.respond("b", 500, 0, b"");

    let response = h
        .dispatcher
        .write_all(BackendOp::Del, b"foo", key_params(b"foo"), None)
        .await;

    assert!(!response.is_ok());
    assert_eq!(h.binlog.total_pending().await, 0);
}

#[tokio::test]
async fn no_live_replica_short_circuits_without_calls() {
    let h = harness(single_group(("a", false), ("b", false)), 16).await;

    let response = h
        .dispatcher
        .write_all(BackendOp::Put, b"foo", key_params(b"foo"), None)
        .await;

    assert!(!response.is_ok());
    assert_eq!(response.code, 0);
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn read_newest_returns_the_highest_version() {
    // P4: with versions 5 and 7, the body of version 7 wins.
    let h = harness(single_group(("a", true), ("b", true)), 16).await;
    h.transport.respond("a", 200, 5, b"x");
    h.transport.respond("b", 200, 7, b"y");

    let response = h
        .dispatcher
        .read_newest(BackendOp::Hget, b"k", key_params(b"k"))
        .await;

    assert!(response.is_ok());
    assert_eq!(response.version, 7);
    assert_eq!(response.body.as_ref(), b"y");
}

#[tokio::test]
async fn read_newest_ignores_failed_replicas() {
    let h = harness(single_group(("a", true), ("b", true)), 16).await;
    h.transport.respond("a", 500, 9, b"stale");
    h.transport.respond("b", 200, 2, b"good");

    let response = h
        .dispatcher
        .read_newest(BackendOp::Hget, b"k", key_params(b"k"))
        .await;

    assert_eq!(response.body.as_ref(), b"good");
}

#[tokio::test]
async fn read_first_ok_contacts_only_live_hosts_in_order() {
    // Scenario: a live, b dead. Only a is contacted.
    let h = harness(single_group(("a", true), ("b", false)), 16).await;
    h.transport.respond("a", 200, 1, b"bar");

    let response = h
        .dispatcher
        .read_first_ok(BackendOp::Get, b"foo", key_params(b"foo"))
        .await;

    assert!(response.is_ok());
    assert_eq!(response.body.as_ref(), b"bar");
    assert_eq!(h.transport.calls_to("a"), 1);
    assert_eq!(h.transport.calls_to("b"), 0);
}

#[tokio::test]
async fn read_first_ok_falls_through_to_the_slave() {
    let h = harness(single_group(("a", true), ("b", true)), 16).await;
    h.transport.respond("a", 404, 0, b"");
    h.transport.respond("b", 200, 1, b"from-slave");

    let response = h
        .dispatcher
        .read_first_ok(BackendOp::Get, b"foo", key_params(b"foo"))
        .await;

    assert_eq!(response.body.as_ref(), b"from-slave");
    assert_eq!(h.transport.calls_to("a"), 1);
}

#[tokio::test]
async fn coord_write_sends_the_sibling_host_along() {
    let h = harness(single_group(("a", true), ("b", true)), 16).await;
    h.transport.respond("a", 200, 1, b"8");

    let response = h
        .dispatcher
        .coord_write(BackendOp::Hincrby, b"k", key_params(b"k"))
        .await;

    assert!(response.is_ok());
    let call = h.transport.calls().pop().unwrap();
    assert_eq!(call.host, "a");
    assert_eq!(call.params.get(ParamKey::Host).unwrap().as_ref(), b"b");
}

#[tokio::test]
async fn coord_write_falls_back_to_the_slave_when_master_is_down() {
    let h = harness(single_group(("a", false), ("b", true)), 16).await;
    h.transport.respond("b", 200, 1, b"8");

    h.dispatcher
        .coord_write(BackendOp::Hincrby, b"k", key_params(b"k"))
        .await;

    let call = h.transport.calls().pop().unwrap();
    assert_eq!(call.host, "b");
    assert_eq!(call.params.get(ParamKey::Host).unwrap().as_ref(), b"a");
}

#[tokio::test]
async fn stat_scatter_sums_numeric_replies() {
    let h = harness(
        two_groups((("a", true), ("b", true)), (("c", true), ("d", true))),
        16,
    )
    .await;
    h.transport.respond("a", 200, 0, b"40");
    h.transport.respond("c", 200, 0, b"2");

    let response = h.dispatcher.stat_scatter(BackendOp::Stat, OpParams::new()).await;

    assert!(response.is_ok());
    assert_eq!(response.body.as_ref(), b"42");
    // Slaves were not consulted: their masters are alive.
    assert_eq!(h.transport.calls_to("b"), 0);
    assert_eq!(h.transport.calls_to("d"), 0);
}

#[tokio::test]
async fn stat_scatter_returns_the_zero_sentinel_on_any_failure() {
    let h = harness(
        two_groups((("a", true), ("b", true)), (("c", true), ("d", true))),
        16,
    )
    .await;
    h.transport.respond("a", 200, 0, b"40");
    h.transport.respond("c", 503, 0, b"");

    let response = h.dispatcher.stat_scatter(BackendOp::Stat, OpParams::new()).await;
    assert!(!response.is_ok());
}

#[tokio::test]
async fn admission_is_bounded_by_the_configured_concurrency() {
    // P7: with concurrency 1, a second command waits for the first permit.
    let h = harness(single_group(("a", true), ("b", true)), 1).await;

    let held = h.dispatcher.admit().await.unwrap();
    let blocked = tokio::time::timeout(Duration::from_millis(50), h.dispatcher.admit()).await;
    assert!(blocked.is_err(), "second admit should block at capacity 1");

    drop(held);
    let granted = tokio::time::timeout(Duration::from_millis(50), h.dispatcher.admit()).await;
    assert!(granted.is_ok());
}

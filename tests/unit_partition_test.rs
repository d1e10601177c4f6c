// Unit tests for the two-view partition map.

mod common;

use common::{single_group, two_groups};
use hustgate::core::routing::{BackendPair, BackendSlot, PartitionMap, PeerGroup, Role, slot_of};
use std::io::Write;

fn group(region: [usize; 2], master: &str, slave: &str) -> PeerGroup {
    PeerGroup {
        region,
        backends: BackendPair {
            master: BackendSlot {
                host: master.to_string(),
                alive: true,
            },
            slave: BackendSlot {
                host: slave.to_string(),
                alive: true,
            },
        },
    }
}

#[test]
fn regions_must_partition_the_slot_space_exactly() {
    // A gap.
    let gap = vec![group([0, 512], "a", "b"), group([513, 1024], "c", "d")];
    assert!(PartitionMap::from_groups(gap).is_err());

    // An overlap.
    let overlap = vec![group([0, 600], "a", "b"), group([512, 1024], "c", "d")];
    assert!(PartitionMap::from_groups(overlap).is_err());

    // Out of range.
    let oversized = vec![group([0, 2048], "a", "b")];
    assert!(PartitionMap::from_groups(oversized).is_err());

    // An empty region.
    let empty = vec![group([512, 512], "a", "b"), group([0, 1024], "c", "d")];
    assert!(PartitionMap::from_groups(empty).is_err());

    // An exact cover.
    let exact = vec![group([0, 512], "a", "b"), group([512, 1024], "c", "d")];
    assert!(PartitionMap::from_groups(exact).is_ok());
}

#[test]
fn lookup_returns_the_owning_groups_backends() {
    let map = PartitionMap::from_groups(vec![
        group([0, 512], "a:9999", "b:9999"),
        group([512, 1024], "c:9999", "d:9999"),
    ])
    .unwrap();

    assert_eq!(map.lookup(0).master.host, "a:9999");
    assert_eq!(map.lookup(511).slave.host, "b:9999");
    assert_eq!(map.lookup(512).master.host, "c:9999");
    assert_eq!(map.lookup(1023).slave.host, "d:9999");
}

#[test]
fn derived_view_lags_until_rebuild() {
    let map = PartitionMap::from_groups(single_group(("a", true), ("b", true))).unwrap();

    assert!(map.set_alive(0, Role::Master, false));
    // The derived view still shows the pre-flip snapshot.
    assert!(map.lookup(0).master.alive);

    map.rebuild_derived();
    assert!(!map.lookup(0).master.alive);
    assert_eq!(map.live_hosts(0), vec!["b".to_string()]);
}

#[test]
fn set_alive_reports_whether_the_bit_flipped() {
    let map = PartitionMap::from_groups(single_group(("a", true), ("b", true))).unwrap();
    assert!(map.set_alive(0, Role::Slave, false));
    assert!(!map.set_alive(0, Role::Slave, false));
    assert!(map.set_alive(0, Role::Slave, true));
    // Out-of-range group index is a no-op.
    assert!(!map.set_alive(7, Role::Master, false));
}

#[test]
fn degenerate_pair_acts_as_a_single_replica() {
    let map = PartitionMap::from_groups(single_group(("a", true), ("a", true))).unwrap();
    assert_eq!(map.live_hosts(0), vec!["a".to_string()]);

    // Both flags collapse on a flip of either role.
    assert!(map.set_alive(0, Role::Slave, false));
    map.rebuild_derived();
    let pair = map.lookup(0);
    assert!(!pair.master.alive);
    assert!(!pair.slave.alive);
    assert!(map.live_hosts(0).is_empty());
}

#[test]
fn reload_rejects_bad_tables_and_keeps_the_prior_view() {
    let map = PartitionMap::from_groups(single_group(("a", true), ("b", true))).unwrap();

    let mut bad = tempfile::NamedTempFile::new().unwrap();
    // Valid JSON, invalid partition: a gap above slot 512.
    bad.write_all(br#"[{"region":[0,512],"backends":{"master":{"host":"x"},"slave":{"host":"y"}}}]"#)
        .unwrap();
    assert!(map.reload(bad.path()).is_err());
    assert_eq!(map.lookup(0).master.host, "a");

    let mut good = tempfile::NamedTempFile::new().unwrap();
    good.write_all(br#"{"peers":[{"region":[0,1024],"backends":{"master":{"host":"x"},"slave":{"host":"y"}}}]}"#)
        .unwrap();
    map.reload(good.path()).unwrap();
    assert_eq!(map.lookup(0).master.host, "x");
    // Alive defaults to true for freshly loaded backends.
    assert!(map.lookup(0).master.alive);
}

#[test]
fn stat_targets_prefer_masters_and_dedupe() {
    let map = PartitionMap::from_groups(two_groups(
        (("a", true), ("b", true)),
        (("a", true), ("c", true)),
    ))
    .unwrap();
    // Both groups prefer their master, which is the same host.
    assert_eq!(map.stat_targets(), vec!["a".to_string()]);

    assert!(map.set_alive(0, Role::Master, false));
    map.rebuild_derived();
    assert_eq!(map.stat_targets(), vec!["b".to_string(), "a".to_string()]);
}

#[test]
fn stat_targets_empty_when_any_group_is_fully_down() {
    let map = PartitionMap::from_groups(two_groups(
        (("a", false), ("b", false)),
        (("c", true), ("d", true)),
    ))
    .unwrap();
    assert!(map.stat_targets().is_empty());
}

#[test]
fn coord_pair_prefers_the_live_master() {
    let map = PartitionMap::from_groups(single_group(("a", true), ("b", true))).unwrap();
    assert_eq!(map.coord_pair(0), Some(("a".to_string(), "b".to_string())));

    map.set_alive(0, Role::Master, false);
    map.rebuild_derived();
    assert_eq!(map.coord_pair(0), Some(("b".to_string(), "a".to_string())));

    map.set_alive(0, Role::Slave, false);
    map.rebuild_derived();
    assert_eq!(map.coord_pair(0), None);
}

#[test]
fn is_alive_tracks_membership_liveness() {
    let map = PartitionMap::from_groups(single_group(("a", true), ("b", false))).unwrap();
    assert!(map.is_alive("a"));
    assert!(!map.is_alive("b"));
    assert!(!map.is_alive("nowhere"));
}

#[test]
fn every_slot_resolves_after_rebuilds() {
    // P2: the derived view always equals the authoritative bits.
    let map = PartitionMap::from_groups(two_groups(
        (("a", true), ("b", true)),
        (("c", true), ("d", true)),
    ))
    .unwrap();
    map.set_alive(1, Role::Master, false);
    map.rebuild_derived();

    for key in [&b"foo"[..], b"bar", b"", b"abc"] {
        let slot = slot_of(key);
        let pair = map.lookup(slot);
        if slot < 512 {
            assert!(pair.master.alive);
        } else {
            assert_eq!(pair.master.alive, false);
            assert_eq!(pair.master.host, "c");
        }
    }
}

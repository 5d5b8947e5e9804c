//! Tests for the consistent hash ring.

use crate::discovery::{DynamicPeerListProvider, PeerAddress};
use crate::event::Event;
use crate::hash_ring::{HashRing, RingSnapshot, RoutingKey};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

fn peers(names: &[&str]) -> Vec<PeerAddress> {
  names.iter().map(|s| s.to_string()).collect()
}

fn key(value: &str) -> RoutingKey {
  RoutingKey::new(vec![Some(value.to_string())])
}

#[test]
fn empty_ring_has_no_owner() {
  let ring = HashRing::new(128, &[]);
  assert!(ring.snapshot().is_empty());
  assert_eq!(ring.lookup(&key("anything")), None);
}

#[test]
fn single_peer_owns_every_key() {
  let ring = HashRing::new(16, &peers(&["10.0.0.1"]));
  for i in 0..50 {
    assert_eq!(ring.lookup(&key(&i.to_string())).as_deref(), Some("10.0.0.1"));
  }
}

#[test]
fn ring_has_one_entry_per_virtual_node() {
  let snapshot = RingSnapshot::build(&peers(&["a", "b", "c"]), 128);
  assert_eq!(snapshot.len(), 3 * 128);
}

#[test]
fn duplicate_peers_are_ignored() {
  let with_dupes = RingSnapshot::build(&peers(&["a", "b", "a"]), 32);
  let without = RingSnapshot::build(&peers(&["a", "b"]), 32);
  assert_eq!(with_dupes, without);
}

#[test]
fn peer_order_does_not_change_the_ring() {
  let forward = RingSnapshot::build(&peers(&["a", "b", "c"]), 64);
  let reversed = RingSnapshot::build(&peers(&["c", "b", "a"]), 64);
  assert_eq!(forward, reversed);
}

#[test]
fn keys_spread_across_peers() {
  let ring = HashRing::new(128, &peers(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]));
  let mut counts: HashMap<PeerAddress, usize> = HashMap::new();
  for i in 0..3000 {
    let owner = ring.lookup(&key(&format!("customer-{i}"))).unwrap();
    *counts.entry(owner).or_default() += 1;
  }
  assert_eq!(counts.len(), 3);
  for count in counts.values() {
    assert!(*count > 500, "unbalanced ring: {counts:?}");
  }
}

#[test]
fn adding_a_peer_only_moves_keys_to_that_peer() {
  let before = HashRing::new(128, &peers(&["a", "b", "c"]));
  let after = HashRing::new(128, &peers(&["a", "b", "c", "d"]));
  for i in 0..1000 {
    let k = key(&i.to_string());
    let old = before.lookup(&k).unwrap();
    let new = after.lookup(&k).unwrap();
    assert!(old == new || new == "d", "key {i} moved from {old} to {new}");
  }
}

#[test]
fn rebuild_swaps_snapshot() {
  let ring = HashRing::new(8, &peers(&["a"]));
  let old = ring.snapshot();
  ring.rebuild(&peers(&["b"]));
  assert_eq!(ring.lookup(&key("x")).as_deref(), Some("b"));
  // readers holding the old snapshot still see a complete ring
  assert_eq!(old.owner(&key("x")).map(String::as_str), Some("a"));
}

#[test]
fn routing_key_from_event_uses_null_placeholders() {
  let event = Event::from_value(json!({"a": "1", "c": 3}));
  let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
  let (routing_key, all_missing) = RoutingKey::from_event(&event, &keys);
  assert!(!all_missing);
  assert_eq!(
    routing_key.values(),
    &[Some("1".to_string()), None, Some("3".to_string())]
  );
}

#[test]
fn routing_key_is_empty_when_all_fields_missing() {
  let event = Event::from_value(json!({"other": 1}));
  let keys = vec!["a".to_string(), "b".to_string()];
  let (routing_key, all_missing) = RoutingKey::from_event(&event, &keys);
  assert!(all_missing);
  assert!(routing_key.is_empty());
}

#[test]
fn missing_value_differs_from_present_value() {
  let ring = RingSnapshot::build(&peers(&["a", "b", "c", "d", "e"]), 128);
  let with_none = RoutingKey::new(vec![None, Some("x".to_string())]);
  let shifted = RoutingKey::new(vec![Some("x".to_string()), None]);
  // Distinct keys hash independently; both still resolve to an owner.
  assert!(ring.owner(&with_none).is_some());
  assert!(ring.owner(&shifted).is_some());
  assert_ne!(with_none, shifted);
}

#[tokio::test]
async fn ring_follows_provider_updates() {
  let provider = DynamicPeerListProvider::new(["a"]);
  let ring = HashRing::from_provider(&provider, 16);
  assert_eq!(ring.lookup(&key("k")).as_deref(), Some("a"));

  provider.update(["b"]);
  let mut owner = None;
  for _ in 0..50 {
    owner = ring.lookup(&key("k"));
    if owner.as_deref() == Some("b") {
      break;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  assert_eq!(owner.as_deref(), Some("b"));
}

proptest! {
  #[test]
  fn builds_are_deterministic(
    names in proptest::collection::vec("[a-z0-9.]{1,12}", 0..6),
    virtual_nodes in 1usize..64,
  ) {
    let first = RingSnapshot::build(&names, virtual_nodes);
    let second = RingSnapshot::build(&names, virtual_nodes);
    let first_entries: Vec<_> = first.entries().map(|(p, a)| (p, a.clone())).collect();
    let second_entries: Vec<_> = second.entries().map(|(p, a)| (p, a.clone())).collect();
    prop_assert_eq!(first_entries, second_entries);
  }

  #[test]
  fn lookups_are_stable(
    names in proptest::collection::vec("[a-z]{1,8}", 1..6),
    values in proptest::collection::vec(proptest::option::of("[a-z0-9]{0,10}"), 0..4),
  ) {
    let ring = HashRing::new(32, &names);
    let routing_key = RoutingKey::new(values);
    let owner = ring.lookup(&routing_key);
    prop_assert!(owner.is_some());
    prop_assert_eq!(ring.lookup(&routing_key), owner.clone());
    prop_assert!(names.contains(&owner.unwrap()));
  }
}

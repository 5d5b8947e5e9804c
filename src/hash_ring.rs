//! # Consistent Hash Ring
//!
//! Maps a routing key to exactly one owning peer. Every peer is placed on the
//! ring at `virtual_nodes` positions derived from `(address, index)` with
//! SHA-256, so every node that sees the same peer list computes the same ring
//! and agrees on ownership without coordination.
//!
//! The ring is held as an immutable [`RingSnapshot`] behind an [`ArcSwap`].
//! Membership changes build a complete new snapshot and swap it in; lookups
//! never lock and always see either the old or the new snapshot.
//!
//! ## Example
//!
//! ```rust
//! use peerweave::hash_ring::{HashRing, RoutingKey};
//!
//! let ring = HashRing::new(128, &["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
//! let key = RoutingKey::new(vec![Some("customer-7".to_string())]);
//! let owner = ring.lookup(&key).unwrap();
//! assert_eq!(ring.lookup(&key).unwrap(), owner);
//! ```

use crate::discovery::{PeerAddress, PeerListProvider};
use crate::event::Event;
use arc_swap::ArcSwap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Ordered identification-key values of one event.
///
/// Missing fields are `None`. A key with no values routes to the empty-key
/// position.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct RoutingKey(Vec<Option<String>>);

impl RoutingKey {
  /// Creates a routing key from raw values.
  pub fn new(values: Vec<Option<String>>) -> Self {
    Self(values)
  }

  /// Extracts the routing key for `event` from `identification_keys`.
  ///
  /// Returns the key and whether every identification key was missing, in
  /// which case the key is empty.
  pub fn from_event(event: &Event, identification_keys: &[String]) -> (Self, bool) {
    let values: Vec<Option<String>> = identification_keys
      .iter()
      .map(|key| event.get(key).map(value_to_string))
      .collect();
    if values.iter().all(Option::is_none) {
      return (Self::default(), true);
    }
    (Self(values), false)
  }

  /// Returns true when the key holds no values.
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Returns the key values.
  pub fn values(&self) -> &[Option<String>] {
    &self.0
  }

  fn position(&self) -> u128 {
    let mut hasher = Sha256::new();
    for value in &self.0 {
      match value {
        Some(v) => {
          hasher.update([1u8]);
          hasher.update((v.len() as u64).to_be_bytes());
          hasher.update(v.as_bytes());
        }
        None => hasher.update([0u8]),
      }
    }
    digest_position(hasher)
  }
}

fn value_to_string(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn vnode_position(address: &str, index: u32) -> u128 {
  let mut hasher = Sha256::new();
  hasher.update(address.as_bytes());
  hasher.update([0u8]);
  hasher.update(index.to_be_bytes());
  digest_position(hasher)
}

fn digest_position(hasher: Sha256) -> u128 {
  let digest = hasher.finalize();
  let mut bytes = [0u8; 16];
  bytes.copy_from_slice(&digest[..16]);
  u128::from_be_bytes(bytes)
}

/// Immutable ring: position → owning peer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RingSnapshot {
  entries: BTreeMap<u128, PeerAddress>,
}

impl RingSnapshot {
  /// Builds a ring from a peer list.
  ///
  /// Peers are deduplicated and sorted first, so the result does not depend
  /// on the order the directory reported them in. When two `(peer, index)`
  /// pairs hash to the same position the first one inserted keeps it.
  pub fn build(peers: &[PeerAddress], virtual_nodes: usize) -> Self {
    let mut sorted: Vec<&PeerAddress> = peers.iter().collect();
    sorted.sort();
    sorted.dedup();

    let mut entries = BTreeMap::new();
    for peer in sorted {
      for index in 0..virtual_nodes as u32 {
        entries
          .entry(vnode_position(peer, index))
          .or_insert_with(|| peer.clone());
      }
    }
    Self { entries }
  }

  /// Returns the owner of `key`: the entry with the least position greater
  /// than the key's hash, wrapping to the first entry. `None` for an empty
  /// ring.
  pub fn owner(&self, key: &RoutingKey) -> Option<&PeerAddress> {
    let position = key.position();
    self
      .entries
      .range((Bound::Excluded(position), Bound::Unbounded))
      .next()
      .or_else(|| self.entries.iter().next())
      .map(|(_, peer)| peer)
  }

  /// Number of ring entries.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Returns true when the ring has no entries.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Iterates `(position, peer)` pairs in ring order.
  pub fn entries(&self) -> impl Iterator<Item = (u128, &PeerAddress)> {
    self.entries.iter().map(|(pos, peer)| (*pos, peer))
  }
}

/// Shared consistent hash ring with lock-free lookups.
pub struct HashRing {
  snapshot: ArcSwap<RingSnapshot>,
  virtual_nodes: usize,
}

impl HashRing {
  /// Creates a ring over a fixed peer list.
  pub fn new(virtual_nodes: usize, peers: &[PeerAddress]) -> Self {
    Self {
      snapshot: ArcSwap::from_pointee(RingSnapshot::build(peers, virtual_nodes)),
      virtual_nodes,
    }
  }

  /// Creates a ring that follows `provider`.
  ///
  /// When called inside a Tokio runtime a background task rebuilds the ring
  /// on every membership notification. The task holds only a weak reference
  /// and exits once the ring is dropped.
  pub fn from_provider(provider: &dyn PeerListProvider, virtual_nodes: usize) -> Arc<Self> {
    let mut updates = provider.subscribe();
    let peers = updates.borrow_and_update().clone();
    let ring = Arc::new(Self::new(virtual_nodes, &peers));
    debug!(peers = peers.len(), entries = ring.snapshot().len(), "built hash ring");

    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        let weak: Weak<Self> = Arc::downgrade(&ring);
        handle.spawn(async move {
          while updates.changed().await.is_ok() {
            let peers = updates.borrow_and_update().clone();
            match weak.upgrade() {
              Some(ring) => ring.rebuild(&peers),
              None => break,
            }
          }
        });
      }
      Err(_) => {
        debug!("no runtime available; hash ring will not follow membership changes");
      }
    }
    ring
  }

  /// Returns the owning peer for `key`, or `None` when the ring is empty.
  pub fn lookup(&self, key: &RoutingKey) -> Option<PeerAddress> {
    self.snapshot.load().owner(key).cloned()
  }

  /// Replaces the ring with one built from `peers`.
  pub fn rebuild(&self, peers: &[PeerAddress]) {
    let snapshot = RingSnapshot::build(peers, self.virtual_nodes);
    debug!(peers = peers.len(), entries = snapshot.len(), "rebuilt hash ring");
    self.snapshot.store(Arc::new(snapshot));
  }

  /// Returns the current snapshot.
  pub fn snapshot(&self) -> Arc<RingSnapshot> {
    self.snapshot.load_full()
  }

  /// Ring positions per peer.
  pub fn virtual_nodes(&self) -> usize {
    self.virtual_nodes
  }
}

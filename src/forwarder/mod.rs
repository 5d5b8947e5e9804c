//! # Forwarders
//!
//! A forwarder is the per-(pipeline, plugin) routing engine. The registry
//! picks one variant at registration time:
//!
//! - [`LocalPeerForwarder`] when no other peer can own a record, and
//! - [`RemotePeerForwarder`] when records must be spread across peers.
//!
//! Callers use [`PeerForwarder`] and get the same interface either way.
//!
//! ## Example
//!
//! ```rust
//! use peerweave::event::{Event, Record};
//! use peerweave::forwarder::PeerForwarder;
//! use serde_json::json;
//!
//! # async fn example() {
//! let forwarder = PeerForwarder::local();
//! let batch = vec![Record::new(Event::from_value(json!({"id": 1})))];
//! let local = forwarder.forward_records(batch).await;
//! assert_eq!(local.len(), 1);
//! assert!(forwarder.receive_records().await.is_empty());
//! # }
//! ```

mod address;
mod local;
mod remote;

pub use address::LocalAddressCache;
pub use local::LocalPeerForwarder;
pub use remote::RemotePeerForwarder;

use crate::event::{Event, Record};
use std::time::Duration;

/// Routing engine for one (pipeline, plugin) pair.
pub enum PeerForwarder {
  /// Keeps every record on this node.
  Local(LocalPeerForwarder),
  /// Routes records to their owning peers.
  Remote(RemotePeerForwarder),
}

impl PeerForwarder {
  /// Creates a local forwarder.
  pub fn local() -> Self {
    Self::Local(LocalPeerForwarder::new())
  }

  /// Routes `records` and returns those to process on this node.
  pub async fn forward_records(&self, records: Vec<Record<Event>>) -> Vec<Record<Event>> {
    match self {
      Self::Local(forwarder) => forwarder.forward_records(records),
      Self::Remote(forwarder) => forwarder.forward_records(records).await,
    }
  }

  /// Returns records forwarded to this node or taken back after a failed
  /// send.
  pub async fn receive_records(&self) -> Vec<Record<Event>> {
    match self {
      Self::Local(forwarder) => forwarder.receive_records(),
      Self::Remote(forwarder) => forwarder.receive_records().await,
    }
  }

  /// Stops routing to peers and flushes queued records.
  pub async fn prepare_for_shutdown(&self) {
    if let Self::Remote(forwarder) = self {
      forwarder.prepare_for_shutdown().await;
    }
  }

  /// Waits up to `timeout` for in-flight requests; true when all finished.
  pub async fn wait_for_in_flight(&self, timeout: Duration) -> bool {
    match self {
      Self::Local(_) => true,
      Self::Remote(forwarder) => forwarder.wait_for_in_flight(timeout).await,
    }
  }

  /// Runs [`prepare_for_shutdown`](Self::prepare_for_shutdown) and waits up
  /// to the configured drain timeout; true when nothing was left in flight.
  pub async fn drain(&self) -> bool {
    match self {
      Self::Local(_) => true,
      Self::Remote(forwarder) => forwarder.drain().await,
    }
  }

  /// Returns true when no forwarding work is queued or in flight.
  pub fn is_ready_for_shutdown(&self) -> bool {
    match self {
      Self::Local(_) => true,
      Self::Remote(forwarder) => forwarder.is_ready_for_shutdown(),
    }
  }

  /// Returns true for the remote variant.
  pub fn is_remote(&self) -> bool {
    matches!(self, Self::Remote(_))
  }

  /// Returns the remote forwarder, if this is one.
  pub fn as_remote(&self) -> Option<&RemotePeerForwarder> {
    match self {
      Self::Remote(forwarder) => Some(forwarder),
      Self::Local(_) => None,
    }
  }
}

//! Forwarder used when no peer can own a record.

use crate::event::{Event, Record};

/// Identity forwarder: every record is processed where it arrived.
#[derive(Clone, Debug, Default)]
pub struct LocalPeerForwarder;

impl LocalPeerForwarder {
  /// Creates a local forwarder.
  pub fn new() -> Self {
    Self
  }

  /// Returns `records` unchanged.
  pub fn forward_records(&self, records: Vec<Record<Event>>) -> Vec<Record<Event>> {
    records
  }

  /// Always empty: nothing is ever forwarded to a local-only node.
  pub fn receive_records(&self) -> Vec<Record<Event>> {
    Vec::new()
  }
}

//! Peer forwarder counters.
//!
//! Each forwarder owns a [`PeerForwarderMetrics`] labelled with its pipeline
//! and plugin. Counts are kept in atomics (readable through
//! [`PeerForwarderMetrics::snapshot`]) and mirrored to the `metrics` facade,
//! so they reach whatever recorder the host process installed. Without a
//! recorder the facade calls are no-ops.
//!
//! | Counter | Meaning |
//! |---------|---------|
//! | `peerweave_records_to_be_processed_locally_total` | owned by this node at routing time |
//! | `peerweave_records_actually_processed_locally_total` | returned to the caller or taken back after a failed send |
//! | `peerweave_records_to_be_forwarded_total` | enqueued for a peer |
//! | `peerweave_records_successfully_forwarded_total` | acknowledged by a peer |
//! | `peerweave_records_failed_forwarding_total` | rejected by a full queue or a failed send |
//! | `peerweave_records_missing_identification_keys_total` | every identification key missing |
//! | `peerweave_requests_successful_total` | forwarding requests acknowledged |
//! | `peerweave_requests_failed_total` | forwarding requests failed |

use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of a forwarder's counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MetricsSnapshot {
  /// Records owned by this node at routing time.
  pub records_to_be_processed_locally: u64,
  /// Records handed back for local processing.
  pub records_actually_processed_locally: u64,
  /// Records enqueued for a peer.
  pub records_to_be_forwarded: u64,
  /// Records acknowledged by a peer.
  pub records_successfully_forwarded: u64,
  /// Records rejected by a full queue or a failed send.
  pub records_failed_forwarding: u64,
  /// Records whose identification keys were all missing.
  pub records_missing_identification_keys: u64,
  /// Forwarding requests acknowledged.
  pub requests_successful: u64,
  /// Forwarding requests failed.
  pub requests_failed: u64,
}

/// Counters for one (pipeline, plugin) forwarder.
#[derive(Debug)]
pub struct PeerForwarderMetrics {
  pipeline_name: String,
  plugin_id: String,
  records_to_be_processed_locally: AtomicU64,
  records_actually_processed_locally: AtomicU64,
  records_to_be_forwarded: AtomicU64,
  records_successfully_forwarded: AtomicU64,
  records_failed_forwarding: AtomicU64,
  records_missing_identification_keys: AtomicU64,
  requests_successful: AtomicU64,
  requests_failed: AtomicU64,
}

macro_rules! recorder {
  ($(#[$doc:meta])* $fn_name:ident, $field:ident, $metric:literal) => {
    $(#[$doc])*
    pub fn $fn_name(&self, count: u64) {
      if count == 0 {
        return;
      }
      self.$field.fetch_add(count, Ordering::Relaxed);
      counter!(
        $metric,
        "pipeline" => self.pipeline_name.clone(),
        "plugin_id" => self.plugin_id.clone()
      )
      .increment(count);
    }
  };
}

impl PeerForwarderMetrics {
  /// Creates zeroed counters for a forwarder.
  pub fn new(pipeline_name: impl Into<String>, plugin_id: impl Into<String>) -> Self {
    Self {
      pipeline_name: pipeline_name.into(),
      plugin_id: plugin_id.into(),
      records_to_be_processed_locally: AtomicU64::new(0),
      records_actually_processed_locally: AtomicU64::new(0),
      records_to_be_forwarded: AtomicU64::new(0),
      records_successfully_forwarded: AtomicU64::new(0),
      records_failed_forwarding: AtomicU64::new(0),
      records_missing_identification_keys: AtomicU64::new(0),
      requests_successful: AtomicU64::new(0),
      requests_failed: AtomicU64::new(0),
    }
  }

  recorder!(
    /// Counts records owned by this node.
    record_to_be_processed_locally,
    records_to_be_processed_locally,
    "peerweave_records_to_be_processed_locally_total"
  );
  recorder!(
    /// Counts records handed back for local processing.
    record_actually_processed_locally,
    records_actually_processed_locally,
    "peerweave_records_actually_processed_locally_total"
  );
  recorder!(
    /// Counts records enqueued for a peer.
    record_to_be_forwarded,
    records_to_be_forwarded,
    "peerweave_records_to_be_forwarded_total"
  );
  recorder!(
    /// Counts records acknowledged by a peer.
    record_successfully_forwarded,
    records_successfully_forwarded,
    "peerweave_records_successfully_forwarded_total"
  );
  recorder!(
    /// Counts records that could not be forwarded.
    record_failed_forwarding,
    records_failed_forwarding,
    "peerweave_records_failed_forwarding_total"
  );
  recorder!(
    /// Counts records with no identification key values.
    record_missing_identification_keys,
    records_missing_identification_keys,
    "peerweave_records_missing_identification_keys_total"
  );
  recorder!(
    /// Counts acknowledged forwarding requests.
    record_request_successful,
    requests_successful,
    "peerweave_requests_successful_total"
  );
  recorder!(
    /// Counts failed forwarding requests.
    record_request_failed,
    requests_failed,
    "peerweave_requests_failed_total"
  );

  /// Returns the current counter values.
  pub fn snapshot(&self) -> MetricsSnapshot {
    MetricsSnapshot {
      records_to_be_processed_locally: self.records_to_be_processed_locally.load(Ordering::Relaxed),
      records_actually_processed_locally: self
        .records_actually_processed_locally
        .load(Ordering::Relaxed),
      records_to_be_forwarded: self.records_to_be_forwarded.load(Ordering::Relaxed),
      records_successfully_forwarded: self.records_successfully_forwarded.load(Ordering::Relaxed),
      records_failed_forwarding: self.records_failed_forwarding.load(Ordering::Relaxed),
      records_missing_identification_keys: self
        .records_missing_identification_keys
        .load(Ordering::Relaxed),
      requests_successful: self.requests_successful.load(Ordering::Relaxed),
      requests_failed: self.requests_failed.load(Ordering::Relaxed),
    }
  }
}

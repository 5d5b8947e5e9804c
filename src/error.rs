//! # Error Types
//!
//! Errors raised by the peer-forwarding subsystem.
//!
//! Only build-time problems propagate to the caller: a duplicate forwarder
//! registration or an invalid processor/configuration aborts pipeline
//! construction. Everything that can go wrong while routing records at runtime
//! (queue full, transport failure, fallback write failure) is absorbed inside
//! the forwarder and turned into local processing or a logged drop, so those
//! paths surface as [`BufferError`] and [`TransportError`] values that never
//! leave `forward_records` / `receive_records`.
//!
//! ## Example
//!
//! ```rust
//! use peerweave::error::PeerForwarderError;
//!
//! let err = PeerForwarderError::DuplicateRegistration {
//!     pipeline_name: "traces".to_string(),
//!     plugin_id: "service-map".to_string(),
//! };
//! assert!(err.to_string().contains("traces"));
//! ```

use std::time::Duration;
use thiserror::Error;

/// Fatal configuration errors raised while building pipelines.
#[derive(Error, Debug)]
pub enum PeerForwarderError {
  /// A forwarder already exists for this (pipeline, plugin) pair.
  #[error(
    "a peer forwarder is already registered for pipeline '{pipeline_name}' and plugin '{plugin_id}'"
  )]
  DuplicateRegistration {
    /// Pipeline that registered twice.
    pipeline_name: String,
    /// Plugin that registered twice.
    plugin_id: String,
  },

  /// A processor requiring peer forwarding declared no identification keys.
  #[error("processor '{plugin_id}' requires peer forwarding but has no identification keys")]
  EmptyIdentificationKeys {
    /// Offending plugin.
    plugin_id: String,
  },

  /// Instances of the same processor disagree on their identification keys.
  #[error("processor instances of '{plugin_id}' declare different identification keys")]
  MismatchedIdentificationKeys {
    /// Offending plugin.
    plugin_id: String,
  },

  /// The processor does not implement peer forwarding.
  #[error("processor '{plugin_id}' does not support peer forwarding")]
  UnsupportedProcessor {
    /// Offending plugin.
    plugin_id: String,
  },

  /// Invalid peer forwarder configuration.
  #[error("invalid peer forwarder configuration: {0}")]
  Config(#[from] ConfigError),
}

/// Errors from the bounded receive buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
  /// No space became available within the write timeout.
  #[error("timed out after {0:?} waiting for receive buffer capacity")]
  Timeout(Duration),

  /// The batch can never fit, even in an empty buffer.
  #[error("batch of {requested} records exceeds receive buffer capacity of {capacity}")]
  SizeOverflow {
    /// Records in the rejected batch.
    requested: usize,
    /// Total buffer capacity.
    capacity: usize,
  },
}

/// Errors reported by a [`PeerForwarderClient`](crate::client::PeerForwarderClient).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
  /// The request could not be submitted (serialization, no connection, ...).
  #[error("failed to submit forwarding request to {destination}: {reason}")]
  Submission {
    /// Peer the batch was addressed to.
    destination: String,
    /// Description of the failure.
    reason: String,
  },

  /// The request was sent but no valid response arrived.
  #[error("forwarding request to {destination} failed: {reason}")]
  Response {
    /// Peer the batch was addressed to.
    destination: String,
    /// Description of the failure.
    reason: String,
  },

  /// The peer did not answer within the client timeout.
  #[error("forwarding request to {destination} timed out after {timeout:?}")]
  Timeout {
    /// Peer the batch was addressed to.
    destination: String,
    /// Configured client timeout.
    timeout: Duration,
  },
}

/// Invalid or unreadable configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
  /// A field holds a value outside its allowed range.
  #[error("{field}: {reason}")]
  InvalidValue {
    /// Configuration key.
    field: &'static str,
    /// Why the value was rejected.
    reason: String,
  },

  /// YAML could not be parsed.
  #[error("yaml error: {0}")]
  Yaml(#[from] serde_yaml::Error),

  /// JSON could not be parsed.
  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// The configuration file could not be read.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl ConfigError {
  pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
    Self::InvalidValue {
      field,
      reason: reason.into(),
    }
  }
}

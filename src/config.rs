//! # Peer Forwarder Configuration
//!
//! Pre-parsed settings for discovery, batching, buffering and timeouts.
//! Every field has a default, so an empty document is a valid configuration
//! (single node, no forwarding).
//!
//! ## Example
//!
//! ```rust
//! use peerweave::config::{DiscoveryMode, PeerForwarderConfig};
//!
//! let config = PeerForwarderConfig::from_yaml_str(
//!     "discovery_mode: static\nstatic_endpoints: [\"10.0.0.1\", \"10.0.0.2\"]\nforwarding_batch_size: 500\n",
//! )?;
//! assert_eq!(config.discovery_mode, DiscoveryMode::Static);
//! assert_eq!(config.forwarding_batch_size, 500);
//! assert_eq!(config.batch_size, 48);
//! # Ok::<(), peerweave::error::ConfigError>(())
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Upper bound for `forwarding_batch_size`.
pub const MAX_FORWARDING_BATCH_SIZE: usize = 15_000;

/// Default number of ring positions per peer.
pub const DEFAULT_VIRTUAL_NODES: usize = 128;

/// How peer addresses are discovered.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
  /// Single node; never forwards.
  #[default]
  LocalNode,
  /// Fixed list from `static_endpoints`.
  Static,
  /// Addresses resolved from a DNS name by an external provider.
  Dns,
  /// Addresses resolved from AWS Cloud Map by an external provider.
  AwsCloudMap,
}

impl DiscoveryMode {
  /// Returns true when addresses come from an external, changing source.
  pub fn is_dynamic(self) -> bool {
    matches!(self, Self::Dns | Self::AwsCloudMap)
  }
}

/// Configuration for the peer forwarder.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PeerForwarderConfig {
  /// Discovery mode.
  pub discovery_mode: DiscoveryMode,
  /// Peer addresses used in static mode.
  pub static_endpoints: Vec<String>,
  /// DNS name resolved in dns mode.
  pub domain_name: Option<String>,
  /// Transport client timeout in milliseconds.
  pub client_timeout_ms: u64,
  /// Records returned by one receive-buffer read.
  ///
  /// A read flags high load only when it returns at least half of
  /// `forwarding_batch_size` records, so this must be at least that large
  /// for receives ever to skip `batch_delay_ms`.
  pub batch_size: usize,
  /// Receive-buffer read timeout under low load, in milliseconds.
  pub batch_delay_ms: u64,
  /// Receive-buffer capacity in records.
  pub buffer_size: usize,
  /// Bound on writing a failed batch back into the local receive buffer.
  #[serde(rename = "failed_forwarding_requests_local_write_timeout_ms")]
  pub failed_forwarding_request_local_write_timeout_ms: u64,
  /// Records per forwarding request.
  pub forwarding_batch_size: usize,
  /// Batches per worker thread a destination queue can hold.
  pub forwarding_batch_queue_depth: usize,
  /// Maximum age of a partial batch before it is flushed, in milliseconds.
  pub forwarding_batch_timeout_ms: u64,
  /// How long shutdown waits for in-flight forwarding, in milliseconds.
  pub drain_timeout_ms: u64,
  /// Ring positions per peer.
  pub virtual_nodes: usize,
  /// Identification-key sets for which forwarding is disabled.
  pub exclude_identification_keys: Vec<BTreeSet<String>>,
}

impl Default for PeerForwarderConfig {
  fn default() -> Self {
    Self {
      discovery_mode: DiscoveryMode::LocalNode,
      static_endpoints: Vec::new(),
      domain_name: None,
      client_timeout_ms: 60_000,
      batch_size: 48,
      batch_delay_ms: 3_000,
      buffer_size: 512,
      failed_forwarding_request_local_write_timeout_ms: 500,
      forwarding_batch_size: 1_500,
      forwarding_batch_queue_depth: 1,
      forwarding_batch_timeout_ms: 3_000,
      drain_timeout_ms: 10_000,
      virtual_nodes: DEFAULT_VIRTUAL_NODES,
      exclude_identification_keys: Vec::new(),
    }
  }
}

impl PeerForwarderConfig {
  /// Parses and validates a YAML document.
  pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
  }

  /// Parses and validates a JSON document.
  pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  /// Reads a configuration file. `.json` files are parsed as JSON, anything
  /// else as YAML.
  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
      Some("json") => Self::from_json_str(&contents),
      _ => Self::from_yaml_str(&contents),
    }
  }

  /// Checks value ranges and cross-field constraints.
  pub fn validate(&self) -> Result<(), ConfigError> {
    positive("client_timeout_ms", self.client_timeout_ms as usize)?;
    positive("batch_size", self.batch_size)?;
    positive("buffer_size", self.buffer_size)?;
    positive(
      "failed_forwarding_requests_local_write_timeout_ms",
      self.failed_forwarding_request_local_write_timeout_ms as usize,
    )?;
    positive("forwarding_batch_queue_depth", self.forwarding_batch_queue_depth)?;
    positive("virtual_nodes", self.virtual_nodes)?;

    if self.forwarding_batch_size == 0 || self.forwarding_batch_size > MAX_FORWARDING_BATCH_SIZE {
      return Err(ConfigError::invalid(
        "forwarding_batch_size",
        format!("must be between 1 and {MAX_FORWARDING_BATCH_SIZE} inclusive"),
      ));
    }
    if self.batch_size > self.buffer_size {
      return Err(ConfigError::invalid(
        "batch_size",
        format!("must not exceed buffer_size ({})", self.buffer_size),
      ));
    }
    if self.discovery_mode == DiscoveryMode::Dns && self.domain_name.is_none() {
      return Err(ConfigError::invalid(
        "domain_name",
        "required when discovery_mode is dns",
      ));
    }
    if self.are_peers_configured() && !self.detects_high_load() {
      warn!(
        batch_size = self.batch_size,
        forwarding_batch_size = self.forwarding_batch_size,
        "batch_size is below half of forwarding_batch_size; receives always wait batch_delay_ms"
      );
    }
    Ok(())
  }

  /// Returns true when a single receive-buffer read can be large enough to
  /// flag high load.
  pub fn detects_high_load(&self) -> bool {
    self.batch_size * 2 >= self.forwarding_batch_size
  }

  /// Returns true when the configured topology can contain other peers.
  ///
  /// Local-node mode and a static list with at most one endpoint never do.
  pub fn are_peers_configured(&self) -> bool {
    match self.discovery_mode {
      DiscoveryMode::LocalNode => false,
      DiscoveryMode::Static => self.static_endpoints.len() > 1,
      DiscoveryMode::Dns | DiscoveryMode::AwsCloudMap => true,
    }
  }

  /// Returns true when `keys` is listed in `exclude_identification_keys`.
  pub fn is_excluded<'a, I>(&self, keys: I) -> bool
  where
    I: IntoIterator<Item = &'a String>,
  {
    let keys: BTreeSet<String> = keys.into_iter().cloned().collect();
    self.exclude_identification_keys.iter().any(|set| *set == keys)
  }

  /// Sets the discovery mode.
  #[must_use]
  pub fn with_discovery_mode(mut self, mode: DiscoveryMode) -> Self {
    self.discovery_mode = mode;
    self
  }

  /// Sets the static endpoints.
  #[must_use]
  pub fn with_static_endpoints<I, S>(mut self, endpoints: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.static_endpoints = endpoints.into_iter().map(Into::into).collect();
    self
  }

  /// Sets the receive-buffer capacity and read batch size.
  #[must_use]
  pub fn with_receive_buffer(mut self, buffer_size: usize, batch_size: usize) -> Self {
    self.buffer_size = buffer_size;
    self.batch_size = batch_size;
    self
  }

  /// Sets the low-load receive read timeout.
  #[must_use]
  pub fn with_batch_delay(mut self, delay: Duration) -> Self {
    self.batch_delay_ms = delay.as_millis() as u64;
    self
  }

  /// Sets forwarding batch size, queue depth and flush timeout.
  #[must_use]
  pub fn with_forwarding_batch(mut self, size: usize, queue_depth: usize, timeout: Duration) -> Self {
    self.forwarding_batch_size = size;
    self.forwarding_batch_queue_depth = queue_depth;
    self.forwarding_batch_timeout_ms = timeout.as_millis() as u64;
    self
  }

  /// Sets the transport client timeout.
  #[must_use]
  pub fn with_client_timeout(mut self, timeout: Duration) -> Self {
    self.client_timeout_ms = timeout.as_millis() as u64;
    self
  }

  /// Sets how long shutdown waits for in-flight forwarding.
  #[must_use]
  pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
    self.drain_timeout_ms = timeout.as_millis() as u64;
    self
  }

  /// Sets the failed-request local write timeout.
  #[must_use]
  pub fn with_local_write_timeout(mut self, timeout: Duration) -> Self {
    self.failed_forwarding_request_local_write_timeout_ms = timeout.as_millis() as u64;
    self
  }

  /// Sets the number of ring positions per peer.
  #[must_use]
  pub fn with_virtual_nodes(mut self, virtual_nodes: usize) -> Self {
    self.virtual_nodes = virtual_nodes;
    self
  }

  /// Adds an identification-key set for which forwarding is disabled.
  #[must_use]
  pub fn with_excluded_identification_keys<I, S>(mut self, keys: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self
      .exclude_identification_keys
      .push(keys.into_iter().map(Into::into).collect());
    self
  }

  /// Client timeout as a duration.
  pub fn client_timeout(&self) -> Duration {
    Duration::from_millis(self.client_timeout_ms)
  }

  /// Low-load receive read timeout as a duration.
  pub fn batch_delay(&self) -> Duration {
    Duration::from_millis(self.batch_delay_ms)
  }

  /// Failed-request local write timeout as a duration.
  pub fn failed_forwarding_request_local_write_timeout(&self) -> Duration {
    Duration::from_millis(self.failed_forwarding_request_local_write_timeout_ms)
  }

  /// Partial-batch flush timeout as a duration.
  pub fn forwarding_batch_timeout(&self) -> Duration {
    Duration::from_millis(self.forwarding_batch_timeout_ms)
  }

  /// Shutdown drain timeout as a duration.
  pub fn drain_timeout(&self) -> Duration {
    Duration::from_millis(self.drain_timeout_ms)
  }
}

fn positive(field: &'static str, value: usize) -> Result<(), ConfigError> {
  if value == 0 {
    return Err(ConfigError::invalid(field, "must be a positive integer"));
  }
  Ok(())
}

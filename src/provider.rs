//! # Forwarder Registry
//!
//! [`PeerForwarderProvider`] hands out exactly one [`PeerForwarder`] per
//! (pipeline, plugin) pair and owns the receive buffer behind each one.
//!
//! Whether a registration gets a remote or a local forwarder is decided at
//! the moment it registers: remote forwarding needs at least one registered
//! forwarder and a discovery mode that can yield other peers. The decision is
//! not revisited for earlier registrations.
//!
//! The hash ring is built on the first remote registration and shared by all
//! later ones.
//!
//! ## Example
//!
//! ```rust
//! use peerweave::client::{ForwardStatus, ForwardingFuture, PeerForwarderClient};
//! use peerweave::config::PeerForwarderConfig;
//! use peerweave::error::TransportError;
//! use peerweave::event::{Event, Record};
//! use peerweave::provider::PeerForwarderProvider;
//! use std::sync::Arc;
//!
//! struct NoopClient;
//!
//! impl PeerForwarderClient for NoopClient {
//!     fn send(&self, _: &[Record<Event>], _: &str, _: &str, _: &str)
//!         -> Result<ForwardingFuture, TransportError> {
//!         Ok(Box::pin(async { Ok(ForwardStatus::Ok) }))
//!     }
//! }
//!
//! let provider = PeerForwarderProvider::from_config(
//!     PeerForwarderConfig::default(),
//!     Arc::new(NoopClient),
//! )?;
//! let forwarder = provider.register("logs", "aggregate", vec!["id".to_string()], 2)?;
//! assert!(!forwarder.is_remote());
//! assert!(provider.register("logs", "aggregate", vec!["id".to_string()], 2).is_err());
//! # Ok::<(), peerweave::error::PeerForwarderError>(())
//! ```

use crate::client::PeerForwarderClient;
use crate::config::PeerForwarderConfig;
use crate::discovery::{self, PeerListProvider};
use crate::error::PeerForwarderError;
use crate::event::{Event, Record};
use crate::forwarder::{PeerForwarder, RemotePeerForwarder};
use crate::hash_ring::HashRing;
use crate::receive_buffer::ReceiveBuffer;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Receive buffer shared between a forwarder and the pipeline runner.
pub type SharedReceiveBuffer = Arc<ReceiveBuffer<Record<Event>>>;

/// Pipeline name → plugin id → receive buffer.
pub type PipelineReceiveBuffers = HashMap<String, HashMap<String, SharedReceiveBuffer>>;

/// Registry of peer forwarders.
pub struct PeerForwarderProvider {
  config: PeerForwarderConfig,
  client: Arc<dyn PeerForwarderClient>,
  peer_list_provider: Arc<dyn PeerListProvider>,
  hash_ring: OnceLock<Arc<HashRing>>,
  receive_buffers: DashMap<(String, String), SharedReceiveBuffer>,
}

impl PeerForwarderProvider {
  /// Creates a registry over an explicit peer directory.
  pub fn new(
    config: PeerForwarderConfig,
    client: Arc<dyn PeerForwarderClient>,
    peer_list_provider: Arc<dyn PeerListProvider>,
  ) -> Result<Self, PeerForwarderError> {
    config.validate()?;
    Ok(Self {
      config,
      client,
      peer_list_provider,
      hash_ring: OnceLock::new(),
      receive_buffers: DashMap::new(),
    })
  }

  /// Creates a registry whose peer directory follows the configured
  /// discovery mode.
  pub fn from_config(
    config: PeerForwarderConfig,
    client: Arc<dyn PeerForwarderClient>,
  ) -> Result<Self, PeerForwarderError> {
    let peer_list_provider = discovery::provider_for(&config);
    Self::new(config, client, peer_list_provider)
  }

  /// Registers the forwarder for `(pipeline_name, plugin_id)`.
  ///
  /// Creates the pair's receive buffer, then returns a remote forwarder if
  /// [`is_peer_forwarding_required`](Self::is_peer_forwarding_required) holds
  /// at this point and a local one otherwise.
  pub fn register(
    &self,
    pipeline_name: &str,
    plugin_id: &str,
    identification_keys: Vec<String>,
    worker_threads: usize,
  ) -> Result<PeerForwarder, PeerForwarderError> {
    let receive_buffer = match self
      .receive_buffers
      .entry((pipeline_name.to_string(), plugin_id.to_string()))
    {
      Entry::Occupied(_) => {
        return Err(PeerForwarderError::DuplicateRegistration {
          pipeline_name: pipeline_name.to_string(),
          plugin_id: plugin_id.to_string(),
        });
      }
      Entry::Vacant(slot) => {
        let buffer = Arc::new(ReceiveBuffer::new(
          self.config.buffer_size,
          self.config.batch_size,
          pipeline_name,
          plugin_id,
        ));
        slot.insert(Arc::clone(&buffer));
        buffer
      }
    };

    if !self.is_peer_forwarding_required() {
      info!(pipeline = pipeline_name, plugin_id, "registered local peer forwarder");
      return Ok(PeerForwarder::local());
    }

    info!(
      pipeline = pipeline_name,
      plugin_id,
      identification_keys = ?identification_keys,
      "registered remote peer forwarder"
    );
    Ok(PeerForwarder::Remote(RemotePeerForwarder::new(
      Arc::clone(&self.client),
      self.hash_ring(),
      receive_buffer,
      identification_keys,
      &self.config,
      worker_threads,
    )))
  }

  /// Returns true when records must be routed across peers: at least one
  /// forwarder is registered and the discovery mode can yield other peers.
  pub fn is_peer_forwarding_required(&self) -> bool {
    !self.receive_buffers.is_empty() && self.config.are_peers_configured()
  }

  /// Returns the shared hash ring, building it on first use.
  pub fn hash_ring(&self) -> Arc<HashRing> {
    Arc::clone(self.hash_ring.get_or_init(|| {
      HashRing::from_provider(self.peer_list_provider.as_ref(), self.config.virtual_nodes)
    }))
  }

  /// Returns every registered receive buffer grouped by pipeline.
  pub fn pipeline_receive_buffers(&self) -> PipelineReceiveBuffers {
    let mut grouped: PipelineReceiveBuffers = HashMap::new();
    for entry in self.receive_buffers.iter() {
      let (pipeline_name, plugin_id) = entry.key();
      grouped
        .entry(pipeline_name.clone())
        .or_default()
        .insert(plugin_id.clone(), Arc::clone(entry.value()));
    }
    grouped
  }

  /// Configuration this registry was built with.
  pub fn config(&self) -> &PeerForwarderConfig {
    &self.config
  }
}

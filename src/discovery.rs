//! # Peer Discovery
//!
//! The peer directory contract consumed by the hash ring. Providers publish
//! the current address list through a `tokio::sync::watch` channel; the ring
//! owner drains change notifications and rebuilds its snapshot.
//!
//! Discovery backends (DNS, cloud service registries) live outside this crate.
//! They drive a [`DynamicPeerListProvider`] by calling
//! [`update`](DynamicPeerListProvider::update) whenever membership changes.

use crate::config::{DiscoveryMode, PeerForwarderConfig};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Address used for the local node when discovery is disabled.
pub const LOCAL_ENDPOINT: &str = "127.0.0.1";

/// Opaque peer identifier, compared by value.
pub type PeerAddress = String;

/// Source of the live peer address list.
pub trait PeerListProvider: Send + Sync {
  /// Returns the current peer addresses.
  fn peer_list(&self) -> Vec<PeerAddress>;

  /// Subscribes to membership changes. The receiver always holds the latest
  /// list; `changed()` resolves after every update.
  fn subscribe(&self) -> watch::Receiver<Vec<PeerAddress>>;
}

/// Fixed peer list.
pub struct StaticPeerListProvider {
  sender: watch::Sender<Vec<PeerAddress>>,
}

impl StaticPeerListProvider {
  /// Creates a provider over a fixed list.
  pub fn new<I, S>(endpoints: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<PeerAddress>,
  {
    let (sender, _) = watch::channel(endpoints.into_iter().map(Into::into).collect());
    Self { sender }
  }

  /// Creates a provider containing only the local endpoint.
  pub fn local() -> Self {
    Self::new([LOCAL_ENDPOINT])
  }
}

impl PeerListProvider for StaticPeerListProvider {
  fn peer_list(&self) -> Vec<PeerAddress> {
    self.sender.borrow().clone()
  }

  fn subscribe(&self) -> watch::Receiver<Vec<PeerAddress>> {
    self.sender.subscribe()
  }
}

/// Peer list updated by an external discovery mechanism.
pub struct DynamicPeerListProvider {
  sender: watch::Sender<Vec<PeerAddress>>,
}

impl DynamicPeerListProvider {
  /// Creates a provider with an initial list.
  pub fn new<I, S>(initial: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<PeerAddress>,
  {
    let (sender, _) = watch::channel(initial.into_iter().map(Into::into).collect());
    Self { sender }
  }

  /// Replaces the peer list and notifies subscribers.
  pub fn update<I, S>(&self, peers: I)
  where
    I: IntoIterator<Item = S>,
    S: Into<PeerAddress>,
  {
    let peers: Vec<PeerAddress> = peers.into_iter().map(Into::into).collect();
    debug!(peers = peers.len(), "peer list updated");
    self.sender.send_replace(peers);
  }
}

impl PeerListProvider for DynamicPeerListProvider {
  fn peer_list(&self) -> Vec<PeerAddress> {
    self.sender.borrow().clone()
  }

  fn subscribe(&self) -> watch::Receiver<Vec<PeerAddress>> {
    self.sender.subscribe()
  }
}

/// Builds the provider for the configured discovery mode.
///
/// Dynamic modes start empty until their external backend calls
/// [`DynamicPeerListProvider::update`]; pass that provider to the registry
/// directly instead of using this helper when one exists.
pub fn provider_for(config: &PeerForwarderConfig) -> Arc<dyn PeerListProvider> {
  match config.discovery_mode {
    DiscoveryMode::LocalNode => Arc::new(StaticPeerListProvider::local()),
    DiscoveryMode::Static => Arc::new(StaticPeerListProvider::new(config.static_endpoints.clone())),
    DiscoveryMode::Dns | DiscoveryMode::AwsCloudMap => {
      Arc::new(DynamicPeerListProvider::new(Vec::<PeerAddress>::new()))
    }
  }
}

//! Decides whether a peer address refers to this node.

use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use tracing::{debug, warn};

/// Per-address cache of "is this address one of mine".
///
/// Resolution happens once per address for the lifetime of the forwarder;
/// addresses that cannot be resolved are cached as remote.
#[derive(Debug, Default)]
pub struct LocalAddressCache {
  cache: DashMap<String, bool>,
}

impl LocalAddressCache {
  /// Creates an empty cache.
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns true when `address` resolves to an interface of this host.
  pub async fn is_local(&self, address: &str) -> bool {
    if let Some(known) = self.cache.get(address) {
      return *known;
    }
    let local = resolve_is_local(address).await;
    debug!(address, local, "resolved peer address");
    self.cache.insert(address.to_string(), local);
    local
  }
}

async fn resolve_is_local(address: &str) -> bool {
  match tokio::net::lookup_host((address, 0)).await {
    Ok(mut resolved) => resolved.any(|socket| is_local_ip(socket.ip())),
    Err(e) => {
      warn!(address, error = %e, "could not resolve peer address; treating it as remote");
      false
    }
  }
}

fn is_local_ip(ip: IpAddr) -> bool {
  // Binding succeeds only for addresses assigned to a local interface.
  ip.is_loopback() || ip.is_unspecified() || UdpSocket::bind(SocketAddr::new(ip, 0)).is_ok()
}

//! Tests for the forwarder registry.

use crate::client::{ForwardStatus, ForwardingFuture, PeerForwarderClient};
use crate::config::{DiscoveryMode, PeerForwarderConfig};
use crate::discovery::DynamicPeerListProvider;
use crate::error::{ConfigError, PeerForwarderError, TransportError};
use crate::event::{Event, Record};
use crate::provider::PeerForwarderProvider;
use std::sync::Arc;

struct OkClient;

impl PeerForwarderClient for OkClient {
  fn send(
    &self,
    _records: &[Record<Event>],
    _destination: &str,
    _plugin_id: &str,
    _pipeline_name: &str,
  ) -> Result<ForwardingFuture, TransportError> {
    Ok(Box::pin(async { Ok(ForwardStatus::Ok) }))
  }
}

fn keys() -> Vec<String> {
  vec!["customer_id".to_string()]
}

fn static_config(endpoints: &[&str]) -> PeerForwarderConfig {
  PeerForwarderConfig::default()
    .with_discovery_mode(DiscoveryMode::Static)
    .with_static_endpoints(endpoints.iter().copied())
}

#[test]
fn duplicate_registration_is_rejected() {
  let provider = PeerForwarderProvider::from_config(PeerForwarderConfig::default(), Arc::new(OkClient)).unwrap();
  provider.register("logs", "agg", keys(), 1).unwrap();

  let err = provider.register("logs", "agg", keys(), 1).err().unwrap();
  assert!(matches!(
    err,
    PeerForwarderError::DuplicateRegistration { ref pipeline_name, ref plugin_id }
      if pipeline_name == "logs" && plugin_id == "agg"
  ));
}

#[test]
fn same_plugin_in_another_pipeline_is_allowed() {
  let provider = PeerForwarderProvider::from_config(PeerForwarderConfig::default(), Arc::new(OkClient)).unwrap();
  provider.register("logs", "agg", keys(), 1).unwrap();
  provider.register("traces", "agg", keys(), 1).unwrap();
}

#[test]
fn local_node_mode_yields_local_forwarder() {
  let provider = PeerForwarderProvider::from_config(PeerForwarderConfig::default(), Arc::new(OkClient)).unwrap();
  let forwarder = provider.register("logs", "agg", keys(), 1).unwrap();
  assert!(!forwarder.is_remote());
  assert!(!provider.is_peer_forwarding_required());
}

#[test]
fn single_static_endpoint_yields_local_forwarder() {
  let provider = PeerForwarderProvider::from_config(static_config(&["127.0.0.1"]), Arc::new(OkClient)).unwrap();
  let forwarder = provider.register("logs", "agg", keys(), 1).unwrap();
  assert!(!forwarder.is_remote());
}

#[tokio::test]
async fn multiple_static_endpoints_yield_remote_forwarder() {
  let provider = PeerForwarderProvider::from_config(
    static_config(&["127.0.0.1", "8.8.8.8"]),
    Arc::new(OkClient),
  )
  .unwrap();
  assert!(!provider.is_peer_forwarding_required());

  let forwarder = provider.register("logs", "agg", keys(), 4).unwrap();
  assert!(forwarder.is_remote());
  assert!(provider.is_peer_forwarding_required());

  let remote = forwarder.as_remote().unwrap();
  assert_eq!(remote.identification_keys(), keys().as_slice());
  assert_eq!(remote.queue_capacity(), 1_500 * 4);
}

#[tokio::test]
async fn remote_forwarders_share_one_ring() {
  let peers = Arc::new(DynamicPeerListProvider::new(["10.0.0.1", "10.0.0.2"]));
  let config = PeerForwarderConfig::default().with_discovery_mode(DiscoveryMode::AwsCloudMap);
  let provider = PeerForwarderProvider::new(config, Arc::new(OkClient), peers).unwrap();

  provider.register("logs", "a", keys(), 1).unwrap();
  let ring = provider.hash_ring();
  provider.register("logs", "b", keys(), 1).unwrap();

  assert!(Arc::ptr_eq(&ring, &provider.hash_ring()));
  assert_eq!(ring.snapshot().len(), 2 * 128);
}

#[test]
fn receive_buffers_are_grouped_by_pipeline() {
  let config = PeerForwarderConfig::default().with_receive_buffer(64, 8);
  let provider = PeerForwarderProvider::from_config(config, Arc::new(OkClient)).unwrap();
  provider.register("logs", "agg", keys(), 1).unwrap();
  provider.register("logs", "dedupe", keys(), 1).unwrap();
  provider.register("traces", "service-map", keys(), 1).unwrap();

  let buffers = provider.pipeline_receive_buffers();
  assert_eq!(buffers.len(), 2);
  assert_eq!(buffers["logs"].len(), 2);
  let buffer = &buffers["traces"]["service-map"];
  assert_eq!(buffer.pipeline_name(), "traces");
  assert_eq!(buffer.plugin_id(), "service-map");
  assert_eq!(buffer.capacity(), 64);
  assert_eq!(buffer.batch_size(), 8);
}

#[test]
fn invalid_config_is_rejected() {
  let config = PeerForwarderConfig::default().with_receive_buffer(4, 8);
  let err = PeerForwarderProvider::from_config(config, Arc::new(OkClient)).err().unwrap();
  assert!(matches!(
    err,
    PeerForwarderError::Config(ConfigError::InvalidValue { field: "batch_size", .. })
  ));
}

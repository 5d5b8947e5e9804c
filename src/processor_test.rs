//! Tests for the peer-forwarding processor decorator.

use crate::client::{ForwardStatus, ForwardingFuture, PeerForwarderClient};
use crate::config::{DiscoveryMode, PeerForwarderConfig};
use crate::error::{PeerForwarderError, TransportError};
use crate::event::{Event, Record};
use crate::processor::{PeerForwardingProcessorDecorator, Processor, RequiresPeerForwarding};
use crate::provider::PeerForwarderProvider;
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

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

/// Records what it was asked to process and passes it through.
struct Aggregate {
  keys: Vec<String>,
  seen: Mutex<Vec<Record<Event>>>,
  shut_down: AtomicBool,
}

impl Aggregate {
  fn new(keys: &[&str]) -> Arc<Self> {
    Arc::new(Self {
      keys: keys.iter().map(|k| k.to_string()).collect(),
      seen: Mutex::new(Vec::new()),
      shut_down: AtomicBool::new(false),
    })
  }

  fn seen(&self) -> Vec<Record<Event>> {
    self.seen.lock().unwrap().clone()
  }
}

#[async_trait]
impl Processor for Aggregate {
  async fn execute(&self, records: Vec<Record<Event>>) -> Vec<Record<Event>> {
    self.seen.lock().unwrap().extend(records.iter().cloned());
    records
  }

  fn shutdown(&self) {
    self.shut_down.store(true, Ordering::SeqCst);
  }

  fn as_peer_forwarding(&self) -> Option<&dyn RequiresPeerForwarding> {
    Some(self)
  }
}

impl RequiresPeerForwarding for Aggregate {
  fn identification_keys(&self) -> Vec<String> {
    self.keys.clone()
  }

  // Only events carrying a "kind" of "span" are routed; "local" ones stay.
  fn is_applicable_event_for_peer_forwarding(&self, event: &Event) -> bool {
    event.get("kind") == Some(&json!("span"))
  }

  fn is_for_local_processing_only(&self, event: &Event) -> bool {
    event.get("kind") == Some(&json!("local"))
  }
}

struct Plain;

#[async_trait]
impl Processor for Plain {
  async fn execute(&self, records: Vec<Record<Event>>) -> Vec<Record<Event>> {
    records
  }
}

fn record(kind: &str, id: i64) -> Record<Event> {
  Record::new(Event::from_value(json!({ "kind": kind, "trace_id": id })))
}

fn local_provider(config: PeerForwarderConfig) -> PeerForwarderProvider {
  PeerForwarderProvider::from_config(config, Arc::new(OkClient)).unwrap()
}

fn decorate(
  processors: Vec<Arc<dyn Processor>>,
  provider: &PeerForwarderProvider,
) -> Result<Vec<PeerForwardingProcessorDecorator>, PeerForwarderError> {
  PeerForwardingProcessorDecorator::decorate_processors(processors, provider, "traces", "service-map", 2)
}

#[test]
fn processor_without_peer_forwarding_is_rejected() {
  let provider = local_provider(PeerForwarderConfig::default());
  let err = decorate(vec![Arc::new(Plain)], &provider).err().unwrap();
  assert!(matches!(err, PeerForwarderError::UnsupportedProcessor { .. }));
  assert!(provider.pipeline_receive_buffers().is_empty());
}

#[test]
fn empty_identification_keys_are_rejected() {
  let provider = local_provider(PeerForwarderConfig::default());
  let err = decorate(vec![Aggregate::new(&[])], &provider).err().unwrap();
  assert!(matches!(err, PeerForwarderError::EmptyIdentificationKeys { .. }));
}

#[test]
fn mismatched_identification_keys_are_rejected() {
  let provider = local_provider(PeerForwarderConfig::default());
  let err = decorate(vec![Aggregate::new(&["a"]), Aggregate::new(&["b"])], &provider)
    .err()
    .unwrap();
  assert!(matches!(err, PeerForwarderError::MismatchedIdentificationKeys { .. }));
}

#[test]
fn key_order_does_not_matter() {
  let provider = local_provider(PeerForwarderConfig::default());
  let decorated = decorate(
    vec![Aggregate::new(&["a", "b"]), Aggregate::new(&["b", "a"])],
    &provider,
  )
  .unwrap();
  assert_eq!(decorated.len(), 2);
}

#[test]
fn no_processors_registers_nothing() {
  let provider = local_provider(PeerForwarderConfig::default());
  assert!(decorate(Vec::new(), &provider).unwrap().is_empty());
  assert!(provider.pipeline_receive_buffers().is_empty());
}

#[test]
fn instances_share_one_forwarder() {
  let provider = local_provider(PeerForwarderConfig::default());
  let decorated = decorate(
    vec![Aggregate::new(&["trace_id"]), Aggregate::new(&["trace_id"])],
    &provider,
  )
  .unwrap();

  assert!(Arc::ptr_eq(
    decorated[0].peer_forwarder(),
    decorated[1].peer_forwarder()
  ));
  assert_eq!(provider.pipeline_receive_buffers()["traces"].len(), 1);
}

#[tokio::test]
async fn excluded_keys_disable_forwarding_but_still_register() {
  let config = PeerForwarderConfig::default().with_excluded_identification_keys(["trace_id"]);
  let provider = local_provider(config);
  let aggregate = Aggregate::new(&["trace_id"]);
  let decorated = decorate(vec![aggregate.clone()], &provider).unwrap();

  assert!(decorated[0].is_forwarding_disabled());
  assert_eq!(provider.pipeline_receive_buffers()["traces"].len(), 1);

  let batch = vec![record("span", 1), record("span", 2)];
  let output = decorated[0].execute(batch.clone()).await;
  assert_eq!(output, batch);
  assert_eq!(aggregate.seen(), batch);
}

#[tokio::test]
async fn non_matching_exclusion_keeps_forwarding_enabled() {
  let config = PeerForwarderConfig::default().with_excluded_identification_keys(["other"]);
  let provider = local_provider(config);
  let decorated = decorate(vec![Aggregate::new(&["trace_id"])], &provider).unwrap();
  assert!(!decorated[0].is_forwarding_disabled());
}

#[tokio::test]
async fn skipped_events_bypass_the_inner_processor() {
  let provider = local_provider(PeerForwarderConfig::default());
  let aggregate = Aggregate::new(&["trace_id"]);
  let decorated = decorate(vec![aggregate.clone()], &provider).unwrap();

  let span = record("span", 1);
  let local = record("local", 2);
  let other = record("log", 3);
  let output = decorated[0]
    .execute(vec![other.clone(), span.clone(), local.clone()])
    .await;

  assert_eq!(aggregate.seen(), vec![span.clone(), local.clone()]);
  assert_eq!(output, vec![span, local, other]);
}

#[tokio::test]
async fn received_records_reach_the_inner_processor() {
  let config = PeerForwarderConfig::default()
    .with_discovery_mode(DiscoveryMode::Static)
    .with_static_endpoints(["127.0.0.1", "8.8.8.8"])
    .with_batch_delay(Duration::from_millis(10));
  let provider = local_provider(config);
  let aggregate = Aggregate::new(&["trace_id"]);
  let decorated = decorate(vec![aggregate.clone()], &provider).unwrap();
  assert!(decorated[0].peer_forwarder().is_remote());

  let forwarded_in = record("span", 42);
  provider.pipeline_receive_buffers()["traces"]["service-map"]
    .write(forwarded_in.clone(), Duration::ZERO)
    .await
    .unwrap();

  let output = decorated[0].execute(Vec::new()).await;
  assert_eq!(output, vec![forwarded_in.clone()]);
  assert_eq!(aggregate.seen(), vec![forwarded_in]);
}

#[tokio::test]
async fn lifecycle_calls_reach_the_inner_processor() {
  let provider = local_provider(PeerForwarderConfig::default());
  let aggregate = Aggregate::new(&["trace_id"]);
  let decorated = decorate(vec![aggregate.clone()], &provider).unwrap();

  decorated[0].prepare_for_shutdown();
  assert!(decorated[0].is_ready_for_shutdown());
  decorated[0].shutdown();
  assert!(aggregate.shut_down.load(Ordering::SeqCst));
  assert_eq!(
    decorated[0].as_peer_forwarding().map(|p| p.identification_keys()),
    Some(vec!["trace_id".to_string()])
  );
}

#[tokio::test]
async fn drain_reaches_the_shared_forwarder() {
  let config = PeerForwarderConfig::default()
    .with_discovery_mode(DiscoveryMode::Static)
    .with_static_endpoints(["127.0.0.1", "8.8.8.8"])
    .with_drain_timeout(Duration::from_millis(200));
  let provider = local_provider(config);
  let decorated = decorate(
    vec![Aggregate::new(&["trace_id"]), Aggregate::new(&["trace_id"])],
    &provider,
  )
  .unwrap();

  assert!(decorated[0].drain_peer_forwarder().await);
  assert!(decorated[1].is_ready_for_shutdown());
  let forwarded = decorated[1]
    .peer_forwarder()
    .forward_records(vec![record("span", 1)])
    .await;
  assert_eq!(forwarded.len(), 1);
}

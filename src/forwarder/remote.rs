//! # Remote Peer Forwarder
//!
//! Routes every record to the peer that owns its identification-key values.
//!
//! ## Forward path
//!
//! [`forward_records`](RemotePeerForwarder::forward_records) groups a batch
//! by owning peer. Records owned by this node (or whose identification keys
//! are all missing) are returned to the caller at once. The rest are pushed
//! into a bounded per-destination queue; a full queue rejects the record and
//! it is returned for local processing instead.
//!
//! After routing, every known destination is checked and flushed while it
//! holds a full batch or its last flush is older than the batch timeout.
//! Each flush drains at most `forwarding_batch_size` records and submits them
//! to the [`PeerForwarderClient`]. Event handles are released as soon as the
//! client accepts the request; the outcome is awaited on a tracked task.
//!
//! ## Failure path
//!
//! A request that cannot be submitted, is answered with a non-OK status,
//! fails in flight or gets no answer within `client_timeout_ms` is written back into this node's own receive buffer within
//! `failed_forwarding_requests_local_write_timeout_ms`. Only when that write
//! also fails is the batch dropped, with an error log.
//!
//! ## Receive path
//!
//! [`receive_records`](RemotePeerForwarder::receive_records) reads the
//! receive buffer and checkpoints straight away. A read that returns at least
//! half of `forwarding_batch_size` flags high load and the next read does not
//! wait; otherwise the next read waits up to `batch_delay_ms` to coalesce.

use crate::client::{ForwardStatus, PeerForwarderClient};
use crate::config::PeerForwarderConfig;
use crate::discovery::PeerAddress;
use crate::error::TransportError;
use crate::event::{Event, Record};
use crate::forwarder::address::LocalAddressCache;
use crate::hash_ring::{HashRing, RoutingKey};
use crate::metrics::PeerForwarderMetrics;
use crate::receive_buffer::ReceiveBuffer;
use crossbeam::queue::ArrayQueue;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

type BatchQueue = ArrayQueue<Record<Event>>;

/// Forwarder that routes records across peers with a consistent hash ring.
pub struct RemotePeerForwarder {
  client: Arc<dyn PeerForwarderClient>,
  hash_ring: Arc<HashRing>,
  fallback: Arc<LocalFallback>,
  identification_keys: Vec<String>,
  local_addresses: LocalAddressCache,
  batch_queues: DashMap<PeerAddress, Arc<BatchQueue>>,
  last_flush: DashMap<PeerAddress, Instant>,
  queue_capacity: usize,
  forwarding_batch_size: usize,
  forwarding_batch_timeout: Duration,
  client_timeout: Duration,
  drain_timeout: Duration,
  batch_delay: Duration,
  high_load: AtomicBool,
  accepting: AtomicBool,
  in_flight: TaskTracker,
}

/// Everything a completion task needs to take a failed batch back.
struct LocalFallback {
  receive_buffer: Arc<ReceiveBuffer<Record<Event>>>,
  metrics: Arc<PeerForwarderMetrics>,
  write_timeout: Duration,
}

impl RemotePeerForwarder {
  /// Creates a forwarder for the pipeline and plugin `receive_buffer` belongs
  /// to.
  ///
  /// Destination queues hold `forwarding_batch_size * worker_threads *
  /// forwarding_batch_queue_depth` records each.
  pub fn new(
    client: Arc<dyn PeerForwarderClient>,
    hash_ring: Arc<HashRing>,
    receive_buffer: Arc<ReceiveBuffer<Record<Event>>>,
    identification_keys: Vec<String>,
    config: &PeerForwarderConfig,
    worker_threads: usize,
  ) -> Self {
    let metrics = Arc::new(PeerForwarderMetrics::new(
      receive_buffer.pipeline_name(),
      receive_buffer.plugin_id(),
    ));
    let queue_capacity = config.forwarding_batch_size
      * worker_threads.max(1)
      * config.forwarding_batch_queue_depth;
    Self {
      client,
      hash_ring,
      fallback: Arc::new(LocalFallback {
        receive_buffer,
        metrics,
        write_timeout: config.failed_forwarding_request_local_write_timeout(),
      }),
      identification_keys,
      local_addresses: LocalAddressCache::new(),
      batch_queues: DashMap::new(),
      last_flush: DashMap::new(),
      queue_capacity: queue_capacity.max(1),
      forwarding_batch_size: config.forwarding_batch_size.max(1),
      forwarding_batch_timeout: config.forwarding_batch_timeout(),
      client_timeout: config.client_timeout(),
      drain_timeout: config.drain_timeout(),
      batch_delay: config.batch_delay(),
      high_load: AtomicBool::new(false),
      accepting: AtomicBool::new(true),
      in_flight: TaskTracker::new(),
    }
  }

  /// Routes `records` and returns the ones to process on this node.
  pub async fn forward_records(&self, records: Vec<Record<Event>>) -> Vec<Record<Event>> {
    let metrics = &self.fallback.metrics;
    if !self.accepting.load(Ordering::Acquire) {
      metrics.record_actually_processed_locally(records.len() as u64);
      return records;
    }

    let mut local = Vec::new();
    let mut by_destination: HashMap<PeerAddress, Vec<Record<Event>>> = HashMap::new();
    for record in records {
      let (key, all_missing) = RoutingKey::from_event(record.data(), &self.identification_keys);
      if all_missing {
        metrics.record_missing_identification_keys(1);
        metrics.record_to_be_processed_locally(1);
        local.push(record);
        continue;
      }
      match self.hash_ring.lookup(&key) {
        Some(owner) => by_destination.entry(owner).or_default().push(record),
        None => {
          metrics.record_to_be_processed_locally(1);
          local.push(record);
        }
      }
    }

    for (destination, group) in by_destination {
      if self.local_addresses.is_local(&destination).await {
        metrics.record_to_be_processed_locally(group.len() as u64);
        local.extend(group);
        continue;
      }
      metrics.record_to_be_forwarded(group.len() as u64);
      let rejected = self.enqueue(&destination, group);
      if !rejected.is_empty() {
        warn!(
          destination = %destination,
          records = rejected.len(),
          "forwarding queue full; processing records locally"
        );
        metrics.record_failed_forwarding(rejected.len() as u64);
        local.extend(rejected);
      }
    }

    self.flush_all_batches().await;

    metrics.record_actually_processed_locally(local.len() as u64);
    local
  }

  /// Drains records forwarded to this node and records taken back after a
  /// failed send, checkpointing the read immediately.
  pub async fn receive_records(&self) -> Vec<Record<Event>> {
    let timeout = if self.high_load.load(Ordering::Acquire) {
      Duration::ZERO
    } else {
      self.batch_delay
    };
    let buffer = &self.fallback.receive_buffer;
    let (records, checkpoint) = buffer.read(timeout).await;
    buffer.checkpoint(checkpoint);

    let high_load = records.len() * 2 >= self.forwarding_batch_size;
    self.high_load.store(high_load, Ordering::Release);
    records
  }

  /// Stops routing to peers and flushes every queued record.
  ///
  /// Later [`forward_records`](Self::forward_records) calls return every
  /// record for local processing.
  pub async fn prepare_for_shutdown(&self) {
    self.accepting.store(false, Ordering::Release);
    let destinations: Vec<PeerAddress> = self.batch_queues.iter().map(|e| e.key().clone()).collect();
    for destination in destinations {
      let Some(queue) = self.queue(&destination) else {
        continue;
      };
      while !queue.is_empty() {
        let batch = self.drain_batch(&queue);
        self.submit(&destination, batch).await;
      }
    }
  }

  /// Waits up to `timeout` for in-flight requests to complete.
  ///
  /// Returns true when every request finished in time.
  pub async fn wait_for_in_flight(&self, timeout: Duration) -> bool {
    self.in_flight.close();
    let drained = tokio::time::timeout(timeout, self.in_flight.wait()).await.is_ok();
    if !drained {
      warn!(
        pending = self.in_flight.len(),
        "forwarding requests still in flight after drain timeout"
      );
    }
    drained
  }

  /// Flushes queued records, then waits up to `drain_timeout_ms` for the
  /// requests in flight. Returns true when every request finished in time.
  pub async fn drain(&self) -> bool {
    self.prepare_for_shutdown().await;
    self.wait_for_in_flight(self.drain_timeout).await
  }

  /// Returns true when nothing is queued or in flight.
  pub fn is_ready_for_shutdown(&self) -> bool {
    self.in_flight.is_empty() && self.batch_queues.iter().all(|e| e.value().is_empty())
  }

  /// Counters for this forwarder.
  pub fn metrics(&self) -> &Arc<PeerForwarderMetrics> {
    &self.fallback.metrics
  }

  /// Identification keys records are routed by.
  pub fn identification_keys(&self) -> &[String] {
    &self.identification_keys
  }

  /// Records currently waiting for `destination`.
  pub fn queue_len(&self, destination: &str) -> usize {
    self.queue(destination).map_or(0, |q| q.len())
  }

  /// Capacity of every destination queue.
  pub fn queue_capacity(&self) -> usize {
    self.queue_capacity
  }

  /// Pushes records into the destination queue; returns those that did not
  /// fit.
  fn enqueue(&self, destination: &str, records: Vec<Record<Event>>) -> Vec<Record<Event>> {
    let queue = self.queue_or_create(destination);
    let mut rejected = Vec::new();
    for record in records {
      if let Err(record) = queue.push(record) {
        rejected.push(record);
      }
    }
    rejected
  }

  async fn flush_all_batches(&self) {
    let destinations: Vec<PeerAddress> = self.batch_queues.iter().map(|e| e.key().clone()).collect();
    for destination in destinations {
      self.flush_destination(&destination).await;
    }
  }

  async fn flush_destination(&self, destination: &str) {
    let Some(queue) = self.queue(destination) else {
      return;
    };
    while self.is_batch_ready(destination, &queue) {
      let batch = self.drain_batch(&queue);
      self.last_flush.insert(destination.to_string(), Instant::now());
      if batch.is_empty() {
        break;
      }
      self.submit(destination, batch).await;
    }
  }

  fn is_batch_ready(&self, destination: &str, queue: &BatchQueue) -> bool {
    if queue.is_empty() {
      return false;
    }
    if queue.len() >= self.forwarding_batch_size {
      return true;
    }
    self
      .last_flush
      .get(destination)
      .is_none_or(|last| last.elapsed() >= self.forwarding_batch_timeout)
  }

  fn drain_batch(&self, queue: &BatchQueue) -> Vec<Record<Event>> {
    let mut batch = Vec::with_capacity(queue.len().min(self.forwarding_batch_size));
    while batch.len() < self.forwarding_batch_size {
      match queue.pop() {
        Some(record) => batch.push(record),
        None => break,
      }
    }
    batch
  }

  async fn submit(&self, destination: &str, batch: Vec<Record<Event>>) {
    let fallback = &self.fallback;
    let plugin_id = fallback.receive_buffer.plugin_id();
    let pipeline_name = fallback.receive_buffer.pipeline_name();

    let pending = match self.client.send(&batch, destination, plugin_id, pipeline_name) {
      Ok(pending) => pending,
      Err(e) => {
        warn!(destination, error = %e, records = batch.len(), "failed to submit forwarding request");
        fallback.take_back(destination, batch).await;
        return;
      }
    };

    for record in &batch {
      record.data().handle().release(true);
    }
    debug!(destination, records = batch.len(), "submitted forwarding request");

    let fallback = Arc::clone(&self.fallback);
    let destination = destination.to_string();
    let client_timeout = self.client_timeout;
    self.in_flight.spawn(async move {
      let outcome = match tokio::time::timeout(client_timeout, pending).await {
        Ok(Ok(ForwardStatus::Ok)) => Ok(()),
        Ok(Ok(ForwardStatus::NotOk(reason))) => Err(reason),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(
          TransportError::Timeout {
            destination: destination.clone(),
            timeout: client_timeout,
          }
          .to_string(),
        ),
      };
      match outcome {
        Ok(()) => {
          fallback.metrics.record_successfully_forwarded(batch.len() as u64);
          fallback.metrics.record_request_successful(1);
        }
        Err(reason) => {
          warn!(destination = %destination, reason = %reason, records = batch.len(), "forwarding request failed");
          fallback.take_back(&destination, batch).await;
        }
      }
    });
  }

  fn queue(&self, destination: &str) -> Option<Arc<BatchQueue>> {
    self.batch_queues.get(destination).map(|q| Arc::clone(q.value()))
  }

  fn queue_or_create(&self, destination: &str) -> Arc<BatchQueue> {
    if let Some(queue) = self.queue(destination) {
      return queue;
    }
    let queue = self
      .batch_queues
      .entry(destination.to_string())
      .or_insert_with(|| {
        self.last_flush.insert(destination.to_string(), Instant::now());
        Arc::new(ArrayQueue::new(self.queue_capacity))
      });
    Arc::clone(queue.value())
  }
}

impl LocalFallback {
  /// Writes a batch that could not be forwarded into the local receive
  /// buffer. Batches larger than the buffer are written in buffer-sized
  /// chunks; all chunks share one deadline.
  async fn take_back(&self, destination: &str, batch: Vec<Record<Event>>) {
    let total = batch.len();
    let deadline = tokio::time::Instant::now() + self.write_timeout;
    let capacity = self.receive_buffer.capacity().max(1);
    let mut remaining = batch;
    let mut written = 0;

    while !remaining.is_empty() {
      let rest = remaining.split_off(remaining.len().min(capacity));
      let chunk = std::mem::replace(&mut remaining, rest);
      let chunk_len = chunk.len();
      let wait = deadline.saturating_duration_since(tokio::time::Instant::now());
      match self.receive_buffer.write_all(chunk, wait).await {
        Ok(()) => written += chunk_len,
        Err(e) => {
          error!(
            destination,
            error = %e,
            dropped = total - written,
            "failed to write unforwarded records to the local receive buffer; dropping them"
          );
          break;
        }
      }
    }

    self.metrics.record_actually_processed_locally(written as u64);
    self.metrics.record_failed_forwarding(total as u64);
    self.metrics.record_request_failed(1);
  }
}

//! # Peer-Forwarding Processors
//!
//! Stateful processors that must see every event sharing a key on the same
//! node implement [`RequiresPeerForwarding`]. The pipeline builder wraps them
//! with [`PeerForwardingProcessorDecorator`], which routes each batch through
//! the pair's [`PeerForwarder`] before the inner processor runs:
//!
//! 1. events the processor wants forwarded go to the forwarder and only the
//!    ones this node owns come back;
//! 2. events the processor only handles locally stay here;
//! 3. every other event skips the processor and is appended to its output;
//! 4. records peers forwarded to this node join the local set.
//!
//! All instances of one processor share a single forwarder.

use crate::error::PeerForwarderError;
use crate::event::{Event, Record};
use crate::forwarder::PeerForwarder;
use crate::provider::PeerForwarderProvider;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// A pipeline stage transforming batches of records.
#[async_trait]
pub trait Processor: Send + Sync {
  /// Processes a batch and returns the records for the next stage.
  async fn execute(&self, records: Vec<Record<Event>>) -> Vec<Record<Event>>;

  /// Called once when the pipeline starts shutting down.
  fn prepare_for_shutdown(&self) {}

  /// Returns true once the processor holds no pending state.
  fn is_ready_for_shutdown(&self) -> bool {
    true
  }

  /// Releases resources.
  fn shutdown(&self) {}

  /// Returns the peer-forwarding view of this processor, if it has one.
  fn as_peer_forwarding(&self) -> Option<&dyn RequiresPeerForwarding> {
    None
  }
}

/// A processor whose events must be grouped by key on one node.
pub trait RequiresPeerForwarding: Send + Sync {
  /// Event fields whose values decide the owning node.
  fn identification_keys(&self) -> Vec<String>;

  /// Returns true when `event` should be routed to its owner.
  fn is_applicable_event_for_peer_forwarding(&self, _event: &Event) -> bool {
    true
  }

  /// Returns true when a non-routed `event` should still be processed here.
  fn is_for_local_processing_only(&self, _event: &Event) -> bool {
    false
  }
}

/// Runs a processor behind its pair's peer forwarder.
pub struct PeerForwardingProcessorDecorator {
  inner: Arc<dyn Processor>,
  peer_forwarder: Arc<PeerForwarder>,
  forwarding_disabled: bool,
}

impl PeerForwardingProcessorDecorator {
  /// Wraps every instance of one processor plugin.
  ///
  /// Every processor must implement [`RequiresPeerForwarding`] with the same
  /// non-empty set of identification keys. One forwarder is registered for
  /// `(pipeline_name, plugin_id)` and shared by all returned decorators.
  /// Forwarding is disabled when the key set is listed in the registry's
  /// `exclude_identification_keys`; the forwarder is still registered.
  pub fn decorate_processors(
    processors: Vec<Arc<dyn Processor>>,
    provider: &PeerForwarderProvider,
    pipeline_name: &str,
    plugin_id: &str,
    worker_threads: usize,
  ) -> Result<Vec<Self>, PeerForwarderError> {
    let mut identification_keys: Option<(BTreeSet<String>, Vec<String>)> = None;
    for processor in &processors {
      let forwarding = processor
        .as_peer_forwarding()
        .ok_or_else(|| PeerForwarderError::UnsupportedProcessor {
          plugin_id: plugin_id.to_string(),
        })?;
      let keys = forwarding.identification_keys();
      let key_set: BTreeSet<String> = keys.iter().cloned().collect();
      if key_set.is_empty() {
        return Err(PeerForwarderError::EmptyIdentificationKeys {
          plugin_id: plugin_id.to_string(),
        });
      }
      match &identification_keys {
        Some((first, _)) if *first != key_set => {
          return Err(PeerForwarderError::MismatchedIdentificationKeys {
            plugin_id: plugin_id.to_string(),
          });
        }
        Some(_) => {}
        None => identification_keys = Some((key_set, keys)),
      }
    }

    let Some((key_set, keys)) = identification_keys else {
      return Ok(Vec::new());
    };

    let forwarding_disabled = provider.config().is_excluded(&key_set);
    if forwarding_disabled {
      debug!(pipeline = pipeline_name, plugin_id, "peer forwarding disabled by excluded identification keys");
    }
    let peer_forwarder = Arc::new(provider.register(pipeline_name, plugin_id, keys, worker_threads)?);

    Ok(
      processors
        .into_iter()
        .map(|inner| Self {
          inner,
          peer_forwarder: Arc::clone(&peer_forwarder),
          forwarding_disabled,
        })
        .collect(),
    )
  }

  /// Forwarder shared by every instance of this processor.
  pub fn peer_forwarder(&self) -> &Arc<PeerForwarder> {
    &self.peer_forwarder
  }

  /// Drains the shared forwarder ahead of [`Processor::shutdown`].
  ///
  /// The pipeline calls this once per processor plugin after it stops feeding
  /// batches.
  pub async fn drain_peer_forwarder(&self) -> bool {
    self.peer_forwarder.drain().await
  }

  /// Returns true when events are processed locally instead of routed.
  pub fn is_forwarding_disabled(&self) -> bool {
    self.forwarding_disabled
  }
}

#[async_trait]
impl Processor for PeerForwardingProcessorDecorator {
  async fn execute(&self, records: Vec<Record<Event>>) -> Vec<Record<Event>> {
    let Some(forwarding) = self.inner.as_peer_forwarding() else {
      return self.inner.execute(records).await;
    };

    let mut to_forward = Vec::new();
    let mut local = Vec::new();
    let mut skipped = Vec::new();
    for record in records {
      let event = record.data();
      if forwarding.is_applicable_event_for_peer_forwarding(event) {
        to_forward.push(record);
      } else if forwarding.is_for_local_processing_only(event) {
        local.push(record);
      } else {
        skipped.push(record);
      }
    }

    let mut to_process = if self.forwarding_disabled {
      to_forward
    } else {
      let mut owned = self.peer_forwarder.forward_records(to_forward).await;
      owned.extend(self.peer_forwarder.receive_records().await);
      owned
    };
    to_process.extend(local);

    let mut output = self.inner.execute(to_process).await;
    output.extend(skipped);
    output
  }

  fn prepare_for_shutdown(&self) {
    self.inner.prepare_for_shutdown();
  }

  fn is_ready_for_shutdown(&self) -> bool {
    self.inner.is_ready_for_shutdown() && self.peer_forwarder.is_ready_for_shutdown()
  }

  fn shutdown(&self) {
    self.inner.shutdown();
  }

  fn as_peer_forwarding(&self) -> Option<&dyn RequiresPeerForwarding> {
    self.inner.as_peer_forwarding()
  }
}

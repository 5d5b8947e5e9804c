//! # Peerweave
//!
//! Peer forwarding for clustered event pipelines.
//!
//! Every node in a cluster runs the same pipeline, but stateful processors
//! (aggregation, deduplication, correlation) need every event sharing a key on
//! one node. Peerweave decides which node owns each event, ships events to
//! their owners in batches, and accepts events that peers ship here.
//!
//! ## Key Features
//!
//! - **Consistent hashing**: every node computes the same ring from the same
//!   peer list, so ownership needs no coordination
//! - **Lock-free membership updates**: the ring is an immutable snapshot
//!   swapped wholesale when peers come and go
//! - **Bounded batching**: per-destination queues reject rather than grow;
//!   rejected events are processed locally
//! - **Fallback to local**: a failed send is written back into this node's
//!   own receive buffer
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peerweave::config::PeerForwarderConfig;
//! use peerweave::provider::PeerForwarderProvider;
//! # use peerweave::client::PeerForwarderClient;
//! # use std::sync::Arc;
//! # async fn run(client: Arc<dyn PeerForwarderClient>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = PeerForwarderConfig::from_file("peer_forwarder.yaml")?;
//! let provider = PeerForwarderProvider::from_config(config, client)?;
//! let forwarder = provider.register("traces", "service-map", vec!["trace_id".into()], 4)?;
//!
//! // Per batch: keep what this node owns, ship the rest.
//! let local = forwarder.forward_records(Vec::new()).await;
//! let forwarded_in = forwarder.receive_records().await;
//! # let _ = (local, forwarded_in);
//! # Ok(())
//! # }
//! ```

// Documentation enforcement - treat missing docs as errors
#![deny(missing_docs)]

/// Transport client contract for shipping batches to peers.
pub mod client;
/// Peer forwarder configuration.
pub mod config;
/// Peer directory contract and built-in providers.
pub mod discovery;
/// Error types.
pub mod error;
/// Events, event handles and records.
pub mod event;
/// Local and remote forwarders.
pub mod forwarder;
/// Consistent hash ring.
pub mod hash_ring;
/// Forwarder counters.
pub mod metrics;
/// Processor traits and the peer-forwarding decorator.
pub mod processor;
/// Forwarder registry.
pub mod provider;
/// Bounded, checkpointed receive buffer.
pub mod receive_buffer;

#[cfg(test)]
mod hash_ring_test;
#[cfg(test)]
mod processor_test;
#[cfg(test)]
mod provider_test;

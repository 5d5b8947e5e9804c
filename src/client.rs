//! # Transport Client
//!
//! Contract for the component that ships a batch to a peer. The network layer
//! itself (TLS, pooling, HTTP) lives outside this crate; the forwarder only
//! needs a non-blocking `send` that hands back a future for the outcome.
//!
//! `send` returning `Err` means the request was never submitted. A submitted
//! request resolves to [`ForwardStatus::Ok`], [`ForwardStatus::NotOk`] or a
//! [`TransportError`]; the forwarder treats the last two identically.
//!
//! ## Example
//!
//! ```rust
//! use peerweave::client::{ForwardStatus, ForwardingFuture, PeerForwarderClient};
//! use peerweave::error::TransportError;
//! use peerweave::event::{Event, Record};
//!
//! struct AlwaysOk;
//!
//! impl PeerForwarderClient for AlwaysOk {
//!     fn send(
//!         &self,
//!         _records: &[Record<Event>],
//!         _destination: &str,
//!         _plugin_id: &str,
//!         _pipeline_name: &str,
//!     ) -> Result<ForwardingFuture, TransportError> {
//!         Ok(Box::pin(async { Ok(ForwardStatus::Ok) }))
//!     }
//! }
//! ```

use crate::error::TransportError;
use crate::event::{Event, Record};
use futures::future::BoxFuture;

/// Outcome reported by a peer for one forwarding request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwardStatus {
  /// The peer accepted the batch.
  Ok,
  /// The peer answered but rejected the batch.
  NotOk(String),
}

/// Pending result of a submitted forwarding request.
pub type ForwardingFuture = BoxFuture<'static, Result<ForwardStatus, TransportError>>;

/// Sends batches of records to peers.
pub trait PeerForwarderClient: Send + Sync {
  /// Submits `records` to `destination` for the given plugin and pipeline.
  ///
  /// Must not block on network I/O; the returned future carries the result.
  fn send(
    &self,
    records: &[Record<Event>],
    destination: &str,
    plugin_id: &str,
    pipeline_name: &str,
  ) -> Result<ForwardingFuture, TransportError>;
}

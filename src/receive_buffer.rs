//! # Receive Buffer
//!
//! Bounded, checkpointed queue holding records that peers forwarded to this
//! node, plus batches this node failed to forward and took back.
//!
//! Capacity is accounted with a semaphore: a write takes one permit per
//! record and a [`checkpoint`](ReceiveBuffer::checkpoint) returns them. Reads
//! alone do not free space, so records handed to a worker keep occupying
//! their slots until that worker checkpoints the read.
//!
//! ## Example
//!
//! ```rust
//! use peerweave::receive_buffer::ReceiveBuffer;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), peerweave::error::BufferError> {
//! let buffer = ReceiveBuffer::new(16, 4, "pipeline", "plugin");
//! buffer.write_all(vec![1, 2, 3], Duration::from_millis(100)).await?;
//!
//! let (records, checkpoint) = buffer.read(Duration::ZERO).await;
//! assert_eq!(records, vec![1, 2, 3]);
//! buffer.checkpoint(checkpoint);
//! assert!(buffer.is_empty());
//! # Ok(())
//! # }
//! ```

use crate::error::BufferError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::time::Instant;

/// Token returned by [`ReceiveBuffer::read`], consumed by
/// [`ReceiveBuffer::checkpoint`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "records stay in flight until the read is checkpointed"]
pub struct CheckpointState {
  num_records: usize,
}

impl CheckpointState {
  /// Number of records covered by this checkpoint.
  pub fn num_records_to_be_checked(&self) -> usize {
    self.num_records
  }
}

/// Bounded queue of records forwarded to this node.
pub struct ReceiveBuffer<T> {
  pipeline_name: String,
  plugin_id: String,
  capacity: usize,
  batch_size: usize,
  queue: Mutex<VecDeque<T>>,
  free_slots: Semaphore,
  queued: AtomicUsize,
  in_flight: AtomicUsize,
  written: Notify,
}

impl<T: Send> ReceiveBuffer<T> {
  /// Creates a buffer holding at most `capacity` records and returning at
  /// most `batch_size` records per read.
  pub fn new(
    capacity: usize,
    batch_size: usize,
    pipeline_name: impl Into<String>,
    plugin_id: impl Into<String>,
  ) -> Self {
    Self {
      pipeline_name: pipeline_name.into(),
      plugin_id: plugin_id.into(),
      capacity,
      batch_size: batch_size.max(1),
      queue: Mutex::new(VecDeque::with_capacity(capacity)),
      free_slots: Semaphore::new(capacity),
      queued: AtomicUsize::new(0),
      in_flight: AtomicUsize::new(0),
      written: Notify::new(),
    }
  }

  /// Writes one record, waiting up to `timeout` for a free slot.
  pub async fn write(&self, record: T, timeout: Duration) -> Result<(), BufferError> {
    self.write_all(vec![record], timeout).await
  }

  /// Writes every record or none, waiting up to `timeout` for enough free
  /// slots. Batches larger than the buffer fail immediately.
  ///
  /// Cancel safe: the only await point is the slot wait, and slots are
  /// consumed only once the records are queued.
  pub async fn write_all(&self, records: Vec<T>, timeout: Duration) -> Result<(), BufferError> {
    let count = records.len();
    if count == 0 {
      return Ok(());
    }
    if count > self.capacity {
      return Err(BufferError::SizeOverflow {
        requested: count,
        capacity: self.capacity,
      });
    }

    let permit = match tokio::time::timeout(timeout, self.free_slots.acquire_many(count as u32)).await {
      Ok(Ok(permit)) => permit,
      _ => return Err(BufferError::Timeout(timeout)),
    };

    {
      let mut queue = self.lock_queue();
      queue.extend(records);
      self.queued.fetch_add(count, Ordering::AcqRel);
    }
    // Slots now belong to the queued records until a checkpoint returns them.
    permit.forget();
    self.written.notify_waiters();
    Ok(())
  }

  /// Reads up to `batch_size` records.
  ///
  /// Waits up to `timeout` for a full batch, then returns whatever is
  /// available. A zero timeout never waits.
  pub async fn read(&self, timeout: Duration) -> (Vec<T>, CheckpointState) {
    let deadline = Instant::now() + timeout;
    loop {
      let written = self.written.notified();
      if self.queued.load(Ordering::Acquire) >= self.batch_size {
        break;
      }
      if tokio::time::timeout_at(deadline, written).await.is_err() {
        break;
      }
    }

    let mut queue = self.lock_queue();
    let take = queue.len().min(self.batch_size);
    let records: Vec<T> = queue.drain(..take).collect();
    self.queued.fetch_sub(take, Ordering::AcqRel);
    self.in_flight.fetch_add(take, Ordering::AcqRel);
    (records, CheckpointState { num_records: take })
  }

  /// Marks a read as processed and frees its slots.
  pub fn checkpoint(&self, state: CheckpointState) {
    if state.num_records == 0 {
      return;
    }
    self.in_flight.fetch_sub(state.num_records, Ordering::AcqRel);
    self.free_slots.add_permits(state.num_records);
  }

  /// Returns true when nothing is queued or awaiting checkpoint.
  pub fn is_empty(&self) -> bool {
    self.queued.load(Ordering::Acquire) == 0 && self.in_flight.load(Ordering::Acquire) == 0
  }

  /// Records currently queued (excluding unchecked reads).
  pub fn len(&self) -> usize {
    self.queued.load(Ordering::Acquire)
  }

  /// Total capacity in records.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Maximum records returned by one read.
  pub fn batch_size(&self) -> usize {
    self.batch_size
  }

  /// Pipeline this buffer belongs to.
  pub fn pipeline_name(&self) -> &str {
    &self.pipeline_name
  }

  /// Plugin this buffer belongs to.
  pub fn plugin_id(&self) -> &str {
    &self.plugin_id
  }

  fn lock_queue(&self) -> MutexGuard<'_, VecDeque<T>> {
    // Critical sections never panic mid-update, so a poisoned queue is intact.
    self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

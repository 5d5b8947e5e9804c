//! # Events and Records
//!
//! The unit of data flowing through a pipeline. An [`Event`] is a JSON object
//! plus an [`EventHandle`] that tracks the upstream resources (buffer slots,
//! source acknowledgements) the event still holds. A [`Record`] wraps the
//! payload the pipeline passes between stages.
//!
//! ## Example
//!
//! ```rust
//! use peerweave::event::{Event, Record};
//! use serde_json::json;
//!
//! let event = Event::from_value(json!({ "customer_id": "c-42", "order": { "total": 10 } }));
//! assert_eq!(event.get("customer_id"), Some(&json!("c-42")));
//! assert_eq!(event.get("order/total"), Some(&json!(10)));
//!
//! let record = Record::new(event);
//! assert!(record.data().get("missing").is_none());
//! ```

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

type ReleaseCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Handle to the upstream resources held by an event.
///
/// Releasing the handle runs the registered callback exactly once, no matter
/// how many clones of the handle exist or how often `release` is called.
#[derive(Clone, Default)]
pub struct EventHandle {
  released: Arc<AtomicBool>,
  on_release: Option<ReleaseCallback>,
}

impl EventHandle {
  /// Creates a handle that invokes `on_release` with the delivery result.
  pub fn with_callback<F>(on_release: F) -> Self
  where
    F: Fn(bool) + Send + Sync + 'static,
  {
    Self {
      released: Arc::new(AtomicBool::new(false)),
      on_release: Some(Arc::new(on_release)),
    }
  }

  /// Releases the handle. `result` tells the owner whether the event was
  /// accepted downstream.
  pub fn release(&self, result: bool) {
    if self.released.swap(true, Ordering::AcqRel) {
      return;
    }
    if let Some(callback) = &self.on_release {
      callback(result);
    }
  }

  /// Returns true once [`release`](Self::release) has been called.
  pub fn is_released(&self) -> bool {
    self.released.load(Ordering::Acquire)
  }
}

impl fmt::Debug for EventHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EventHandle")
      .field("released", &self.is_released())
      .finish()
  }
}

/// A structured event: a JSON object plus its resource handle.
///
/// Equality compares the payload only.
#[derive(Clone, Debug, Default)]
pub struct Event {
  data: Map<String, Value>,
  handle: EventHandle,
}

impl Event {
  /// Creates an event from a JSON object.
  pub fn new(data: Map<String, Value>) -> Self {
    Self {
      data,
      handle: EventHandle::default(),
    }
  }

  /// Creates an event from any JSON value. Non-object values are stored under
  /// the `message` key.
  pub fn from_value(value: Value) -> Self {
    match value {
      Value::Object(map) => Self::new(map),
      other => {
        let mut map = Map::new();
        map.insert("message".to_string(), other);
        Self::new(map)
      }
    }
  }

  /// Attaches a resource handle.
  #[must_use]
  pub fn with_handle(mut self, handle: EventHandle) -> Self {
    self.handle = handle;
    self
  }

  /// Looks up a field. Keys containing `/` are resolved as nested paths, so
  /// `"a/b"` and `"/a/b"` both read `{"a": {"b": ..}}`. Explicit JSON nulls
  /// count as missing.
  pub fn get(&self, key: &str) -> Option<&Value> {
    let value = if key.contains('/') {
      let mut segments = key.split('/').filter(|s| !s.is_empty());
      let first = segments.next()?;
      segments.try_fold(self.data.get(first)?, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
      })
    } else {
      self.data.get(key)
    };
    value.filter(|v| !v.is_null())
  }

  /// Sets a top-level field.
  pub fn put(&mut self, key: impl Into<String>, value: Value) {
    self.data.insert(key.into(), value);
  }

  /// Returns the payload.
  pub fn data(&self) -> &Map<String, Value> {
    &self.data
  }

  /// Returns the resource handle.
  pub fn handle(&self) -> &EventHandle {
    &self.handle
  }
}

impl PartialEq for Event {
  fn eq(&self, other: &Self) -> bool {
    self.data == other.data
  }
}

impl From<Value> for Event {
  fn from(value: Value) -> Self {
    Self::from_value(value)
  }
}

/// A payload travelling between pipeline stages.
#[derive(Clone, Debug, PartialEq)]
pub struct Record<T> {
  data: T,
}

impl<T> Record<T> {
  /// Wraps a payload.
  pub fn new(data: T) -> Self {
    Self { data }
  }

  /// Returns the payload.
  pub fn data(&self) -> &T {
    &self.data
  }

  /// Returns the payload mutably.
  pub fn data_mut(&mut self) -> &mut T {
    &mut self.data
  }

  /// Unwraps the payload.
  pub fn into_data(self) -> T {
    self.data
  }
}

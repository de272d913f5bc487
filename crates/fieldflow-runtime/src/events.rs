//! Session events and notifiers for observability.
//!
//! Events are emitted as fetches start, settle and get discarded, so hosts
//! can stream progress to a UI, log it, or ignore it.

use fieldflow_loader::ErrorKind;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted by a [`FetchSession`](crate::FetchSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
  /// A fetch for a dependent field was started.
  FetchStarted {
    field: String,
    source_key: String,
    dependency: serde_json::Value,
    generation: u64,
  },

  /// New options were stored for a field.
  OptionsUpdated {
    field: String,
    source_key: String,
    count: usize,
  },

  /// A current fetch failed and the field now carries an error.
  FetchFailed {
    field: String,
    kind: ErrorKind,
    message: String,
  },

  /// A fetch settled after being superseded; its result was dropped.
  FetchDiscarded { field: String, generation: u64 },

  /// A value change cleared these descendant fields.
  FieldsCleared { fields: Vec<String> },

  /// The form-wide loading indicator changed.
  LoadingChanged { loading: bool },
}

/// Receives session events.
///
/// Called synchronously from the session; implementations should not block.
pub trait SessionNotifier: Send + Sync {
  fn notify(&self, event: SessionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl SessionNotifier for NoopNotifier {
  fn notify(&self, _event: SessionEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<SessionEvent>) -> Self {
    Self { sender }
  }
}

impl SessionNotifier for ChannelNotifier {
  fn notify(&self, event: SessionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

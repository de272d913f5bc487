//! Hook for persisting field selections.

use serde_json::Value;

/// Told about every value the user sets, before dependent fetches start.
///
/// Implementations must not fail the write; persistence errors are theirs to
/// handle.
pub trait PreferenceSink: Send + Sync {
  fn update_field(&self, field: &str, value: &Value);
}

#[derive(Debug, Clone, Default)]
pub struct NoopPreferences;

impl PreferenceSink for NoopPreferences {
  fn update_field(&self, _field: &str, _value: &Value) {}
}

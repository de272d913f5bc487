use std::fmt;

use serde_json::Value;

/// Deduplication key of one option fetch: the field, its loader and the
/// dependency value it was triggered with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub field: String,
  pub source_key: String,
  /// Canonical JSON of the dependency value.
  pub dependency: String,
}

impl RequestKey {
  pub fn new(field: &str, source_key: &str, dependency: &Value) -> Self {
    Self {
      field: field.to_string(),
      source_key: source_key.to_string(),
      dependency: dependency.to_string(),
    }
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}", self.field, self.source_key, self.dependency)
  }
}

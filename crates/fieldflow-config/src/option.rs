use serde::{Deserialize, Serialize};

/// One selectable entry of a dynamic field, mapped from raw loader output.
///
/// An option list is replaced wholesale on every successful fetch; entries
/// from two different parent values are never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicOption {
  pub value: serde_json::Value,
  pub label: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub metadata: Option<serde_json::Value>,
}

impl DynamicOption {
  pub fn new(value: impl Into<serde_json::Value>, label: impl Into<String>) -> Self {
    Self {
      value: value.into(),
      label: label.into(),
      metadata: None,
    }
  }

  pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
    self.metadata = Some(metadata);
    self
  }
}

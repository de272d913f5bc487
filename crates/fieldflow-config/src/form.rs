use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::field::FieldDef;

/// The ordered field list of one node type's configuration form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDef {
  /// Catalog identifier of the node this form configures.
  #[serde(default)]
  pub node_type: String,
  pub fields: Vec<FieldDef>,
}

impl FormDef {
  pub fn new(node_type: impl Into<String>, fields: Vec<FieldDef>) -> Self {
    Self {
      node_type: node_type.into(),
      fields,
    }
  }

  /// Parse a form definition from JSON text.
  ///
  /// Accepts either a full `{ "nodeType": ..., "fields": [...] }` object or a
  /// bare array of fields, which is how some catalogs ship their schemas.
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    if value.is_array() {
      let fields: Vec<FieldDef> = serde_json::from_value(value)?;
      return Ok(Self::new("", fields));
    }
    Ok(serde_json::from_value(value)?)
  }
}

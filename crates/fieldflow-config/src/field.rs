use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::{FieldValues, is_truthy};

/// Static description of one form field, as published by the node catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
  /// Unique identifier within the form.
  pub name: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,

  /// Parent field. The field stays hidden until the parent has a value, and
  /// its options are refetched whenever the parent changes.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub depends_on: Option<String>,

  /// Loader key producing this field's option list, e.g. "slack_channels".
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dynamic_source: Option<String>,

  #[serde(default)]
  pub required: bool,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default_value: Option<serde_json::Value>,

  #[serde(default)]
  pub hidden: bool,

  /// Tab the field is rendered on. Untabbed fields render on every tab.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ui_tab: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub visible_when: Option<VisibleWhen>,

  /// Extra request parameters, as minijinja templates rendered against the
  /// current form values when a fetch is triggered.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub loader_params: BTreeMap<String, String>,
}

impl FieldDef {
  /// A plain field with no dependency, source, or visibility rules.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      label: None,
      depends_on: None,
      dynamic_source: None,
      required: false,
      default_value: None,
      hidden: false,
      ui_tab: None,
      visible_when: None,
      loader_params: BTreeMap::new(),
    }
  }

  pub fn depends_on(mut self, parent: impl Into<String>) -> Self {
    self.depends_on = Some(parent.into());
    self
  }

  pub fn dynamic_source(mut self, source: impl Into<String>) -> Self {
    self.dynamic_source = Some(source.into());
    self
  }

  pub fn default_value(mut self, value: serde_json::Value) -> Self {
    self.default_value = Some(value);
    self
  }

  pub fn hidden(mut self) -> Self {
    self.hidden = true;
    self
  }

  pub fn ui_tab(mut self, tab: impl Into<String>) -> Self {
    self.ui_tab = Some(tab.into());
    self
  }

  pub fn visible_when(mut self, condition: VisibleWhen) -> Self {
    self.visible_when = Some(condition);
    self
  }

  pub fn loader_param(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
    self.loader_params.insert(name.into(), template.into());
    self
  }
}

/// Declarative visibility override layered on top of the dependency rule.
///
/// # Examples
///
/// ```json
/// { "field": "channelType", "equals": "text" }
/// { "field": "messageKind", "oneOf": ["reply", "thread"] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VisibleWhen {
  Equals {
    field: String,
    equals: serde_json::Value,
  },
  #[serde(rename_all = "camelCase")]
  OneOf {
    field: String,
    one_of: Vec<serde_json::Value>,
  },
  /// Shown only when the referenced field has a non-empty value.
  Present { field: String },
}

impl VisibleWhen {
  /// The field this condition inspects.
  pub fn field(&self) -> &str {
    match self {
      VisibleWhen::Equals { field, .. }
      | VisibleWhen::OneOf { field, .. }
      | VisibleWhen::Present { field } => field,
    }
  }

  pub fn matches(&self, values: &FieldValues) -> bool {
    let current = values.get(self.field());
    match self {
      VisibleWhen::Equals { equals, .. } => current == Some(equals),
      VisibleWhen::OneOf { one_of, .. } => current.is_some_and(|v| one_of.contains(v)),
      VisibleWhen::Present { .. } => current.is_some_and(is_truthy),
    }
  }
}

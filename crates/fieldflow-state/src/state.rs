use fieldflow_config::{FieldValues, is_empty};
use fieldflow_schema::FieldRegistry;
use serde::Serialize;

use crate::defaults::apply_defaults;

/// Result of writing one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteOutcome {
  /// False when the new value equals the old one (both empty counts as equal).
  pub changed: bool,
  pub previous: Option<serde_json::Value>,
  /// Downstream fields whose values were removed, breadth first.
  pub cleared: Vec<String>,
}

impl WriteOutcome {
  fn unchanged(previous: Option<serde_json::Value>) -> Self {
    Self {
      changed: false,
      previous,
      cleared: Vec::new(),
    }
  }
}

/// Live configuration values of one form session.
#[derive(Debug, Clone, Default)]
pub struct FormState {
  values: FieldValues,
  /// Identity of the initial data the values were seeded from.
  instance_id: Option<String>,
  defaults_applied: bool,
}

impl FormState {
  pub fn new() -> Self {
    Self::default()
  }

  /// Seed the state from a configured node instance.
  ///
  /// Re-seeding with the same `instance_id` is ignored, so defaults are
  /// applied once per instance. A different id replaces all values and
  /// re-arms defaulting. Returns whether the state was replaced.
  pub fn load_initial(&mut self, instance_id: &str, values: FieldValues) -> bool {
    if self.instance_id.as_deref() == Some(instance_id) {
      return false;
    }
    self.instance_id = Some(instance_id.to_string());
    self.values = values
      .into_iter()
      .filter(|(_, v)| !is_empty(v))
      .collect();
    self.defaults_applied = false;
    true
  }

  pub fn instance_id(&self) -> Option<&str> {
    self.instance_id.as_deref()
  }

  /// Apply schema defaults, once per initial-data identity.
  ///
  /// Returns the fields that received a default; empty when defaults were
  /// already applied.
  pub fn apply_defaults(&mut self, registry: &FieldRegistry) -> Vec<String> {
    if self.defaults_applied {
      return Vec::new();
    }
    let (next, applied) = apply_defaults(registry, &self.values);
    self.values = next;
    self.defaults_applied = true;
    applied
  }

  pub fn defaults_applied(&self) -> bool {
    self.defaults_applied
  }

  pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
    self.values.get(name)
  }

  /// Whether `name` currently holds a non-empty value.
  pub fn has_value(&self, name: &str) -> bool {
    self.values.get(name).is_some_and(|v| !is_empty(v))
  }

  pub fn values(&self) -> &FieldValues {
    &self.values
  }

  /// Write a field and invalidate everything downstream of it.
  ///
  /// Empty values remove the key. When the value actually changes, every
  /// transitive dependent loses its value; a write of the current value
  /// leaves dependents alone.
  pub fn set(
    &mut self,
    registry: &FieldRegistry,
    name: &str,
    value: serde_json::Value,
  ) -> WriteOutcome {
    let previous = self.values.get(name).cloned();

    let unchanged = match &previous {
      Some(prev) => prev == &value || (is_empty(prev) && is_empty(&value)),
      None => is_empty(&value),
    };
    if unchanged {
      return WriteOutcome::unchanged(previous);
    }

    if is_empty(&value) {
      self.values.remove(name);
    } else {
      self.values.insert(name.to_string(), value);
    }

    let cleared = registry
      .graph()
      .descendants(name)
      .into_iter()
      .filter(|child| self.values.remove(child).is_some())
      .collect();

    WriteOutcome {
      changed: true,
      previous,
      cleared,
    }
  }

  /// Reset a field to "no value". Same invalidation rules as [`FormState::set`].
  pub fn clear(&mut self, registry: &FieldRegistry, name: &str) -> WriteOutcome {
    self.set(registry, name, serde_json::Value::Null)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use fieldflow_config::{FieldDef, FormDef};
  use serde_json::json;

  fn registry() -> FieldRegistry {
    FieldRegistry::new(FormDef::new(
      "airtable_create_record",
      vec![
        FieldDef::new("base"),
        FieldDef::new("table").depends_on("base"),
        FieldDef::new("column").depends_on("table"),
        FieldDef::new("format").default_value(json!("plain")),
      ],
    ))
    .unwrap()
  }

  #[test]
  fn test_set_clears_transitive_dependents() {
    let registry = registry();
    let mut state = FormState::new();
    state.set(&registry, "base", json!("b1"));
    state.set(&registry, "table", json!("t1"));
    state.set(&registry, "column", json!("c1"));

    let outcome = state.set(&registry, "base", json!("b2"));

    assert!(outcome.changed);
    assert_eq!(outcome.previous, Some(json!("b1")));
    assert_eq!(outcome.cleared, vec!["table", "column"]);
    assert_eq!(state.get("base"), Some(&json!("b2")));
    assert!(!state.has_value("table"));
    assert!(!state.has_value("column"));
  }

  #[test]
  fn test_same_value_is_noop() {
    let registry = registry();
    let mut state = FormState::new();
    state.set(&registry, "base", json!("b1"));
    state.set(&registry, "table", json!("t1"));

    let outcome = state.set(&registry, "base", json!("b1"));

    assert!(!outcome.changed);
    assert!(outcome.cleared.is_empty());
    assert_eq!(state.get("table"), Some(&json!("t1")));
  }

  #[test]
  fn test_empty_to_empty_is_noop() {
    let registry = registry();
    let mut state = FormState::new();

    assert!(!state.set(&registry, "base", json!("")).changed);
    assert!(!state.clear(&registry, "base").changed);
  }

  #[test]
  fn test_clear_removes_key() {
    let registry = registry();
    let mut state = FormState::new();
    state.set(&registry, "base", json!("b1"));
    state.set(&registry, "table", json!("t1"));

    let outcome = state.clear(&registry, "base");

    assert!(outcome.changed);
    assert_eq!(outcome.cleared, vec!["table"]);
    assert!(state.get("base").is_none());
  }

  #[test]
  fn test_defaults_applied_once_per_instance() {
    let registry = registry();
    let mut state = FormState::new();

    assert!(state.load_initial("node-1", FieldValues::new()));
    assert_eq!(state.apply_defaults(&registry), vec!["format"]);

    // The user clears the defaulted field; a re-render must not bring it back.
    state.clear(&registry, "format");
    assert!(!state.load_initial("node-1", FieldValues::new()));
    assert!(state.apply_defaults(&registry).is_empty());
    assert!(!state.has_value("format"));

    // Switching to another node instance re-arms defaulting.
    let mut initial = FieldValues::new();
    initial.insert("base".to_string(), json!("b9"));
    assert!(state.load_initial("node-2", initial));
    assert_eq!(state.apply_defaults(&registry), vec!["format"]);
    assert_eq!(state.get("base"), Some(&json!("b9")));
    assert_eq!(state.instance_id(), Some("node-2"));
  }

  #[test]
  fn test_explicit_initial_value_beats_default() {
    let registry = registry();
    let mut state = FormState::new();
    let mut initial = FieldValues::new();
    initial.insert("format".to_string(), json!("html"));

    state.load_initial("node-1", initial);
    assert!(state.apply_defaults(&registry).is_empty());
    assert_eq!(state.get("format"), Some(&json!("html")));
  }
}

//! Raw item → [`DynamicOption`] mapping.
//!
//! Lookup order for a source key:
//! 1. a mapper registered for the exact key
//! 2. a mapper registered for a suffix of the key (`_channels`, `_users`, ...)
//! 3. the fallback, which guesses `value`/`label` from common field names
//!
//! Items a mapper cannot make sense of are skipped rather than failing the
//! whole list.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use fieldflow_config::DynamicOption;
use serde_json::{Value, json};

/// Maps one raw item. `None` drops the item.
pub type Mapper = Arc<dyn Fn(&Value) -> Option<DynamicOption> + Send + Sync>;

const VALUE_KEYS: &[&str] = &["value", "id", "key", "name", "email"];
const LABEL_KEYS: &[&str] = &[
  "label",
  "name",
  "title",
  "displayName",
  "display_name",
  "email",
  "username",
];

pub struct MapperRegistry {
  exact: HashMap<String, Mapper>,
  suffixes: Vec<(String, Mapper)>,
  fallback: Mapper,
}

impl fmt::Debug for MapperRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MapperRegistry")
      .field("exact", &self.exact.keys().collect::<Vec<_>>())
      .field(
        "suffixes",
        &self.suffixes.iter().map(|(s, _)| s).collect::<Vec<_>>(),
      )
      .finish()
  }
}

impl Default for MapperRegistry {
  fn default() -> Self {
    Self::with_builtins()
  }
}

impl MapperRegistry {
  /// A registry that only knows the fallback mapper.
  pub fn empty() -> Self {
    Self {
      exact: HashMap::new(),
      suffixes: Vec::new(),
      fallback: Arc::new(generic_option),
    }
  }

  /// Fallback plus the shapes shared by most chat and table providers.
  pub fn with_builtins() -> Self {
    let mut registry = Self::empty();
    registry.register_suffix("_channels", channel_option);
    registry.register_suffix("_users", user_option);
    registry.register_suffix("_members", user_option);
    registry.register_suffix("_fields", column_option);
    registry.register_suffix("_columns", column_option);
    registry
  }

  pub fn register<F>(&mut self, source_key: impl Into<String>, mapper: F)
  where
    F: Fn(&Value) -> Option<DynamicOption> + Send + Sync + 'static,
  {
    self.exact.insert(source_key.into(), Arc::new(mapper));
  }

  /// Register a mapper for every source key ending in `suffix`. Later
  /// registrations take precedence.
  pub fn register_suffix<F>(&mut self, suffix: impl Into<String>, mapper: F)
  where
    F: Fn(&Value) -> Option<DynamicOption> + Send + Sync + 'static,
  {
    self.suffixes.insert(0, (suffix.into(), Arc::new(mapper)));
  }

  pub fn mapper_for(&self, source_key: &str) -> &Mapper {
    if let Some(mapper) = self.exact.get(source_key) {
      return mapper;
    }
    self
      .suffixes
      .iter()
      .find(|(suffix, _)| source_key.ends_with(suffix.as_str()))
      .map(|(_, mapper)| mapper)
      .unwrap_or(&self.fallback)
  }

  /// Map a raw item list for `source_key`.
  pub fn map(&self, source_key: &str, items: &[Value]) -> Vec<DynamicOption> {
    let mapper = self.mapper_for(source_key);
    items.iter().filter_map(|item| mapper(item)).collect()
  }
}

/// First non-empty value among `keys`.
fn pick<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a Value> {
  keys
    .iter()
    .filter_map(|k| item.get(*k))
    .find(|v| match v {
      Value::Null => false,
      Value::String(s) => !s.is_empty(),
      _ => true,
    })
}

fn display(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn generic_option(item: &Value) -> Option<DynamicOption> {
  match item {
    Value::String(s) if !s.is_empty() => Some(DynamicOption::new(s.clone(), s.clone())),
    Value::Number(_) | Value::Bool(_) => Some(DynamicOption::new(item.clone(), display(item))),
    Value::Object(_) => {
      let value = pick(item, VALUE_KEYS)?;
      let label = pick(item, LABEL_KEYS).unwrap_or(value);
      Some(DynamicOption::new(value.clone(), display(label)))
    }
    _ => None,
  }
}

fn channel_option(item: &Value) -> Option<DynamicOption> {
  let mut option = generic_option(item)?;
  if let Some(name) = item.get("name").and_then(Value::as_str)
    && !name.starts_with('#')
  {
    option.label = format!("#{}", name);
  }
  if let Some(kind) = item.get("type") {
    option.metadata = Some(json!({ "type": kind }));
  }
  Some(option)
}

fn user_option(item: &Value) -> Option<DynamicOption> {
  let value = pick(item, &["id", "value", "email"])?;
  let profile = item.get("profile").unwrap_or(&Value::Null);
  let label = pick(item, &["real_name", "display_name", "displayName"])
    .or_else(|| pick(profile, &["real_name", "display_name"]))
    .or_else(|| pick(item, &["name", "username", "email"]))
    .unwrap_or(value);

  let email = item.get("email").or_else(|| profile.get("email"));
  let option = DynamicOption::new(value.clone(), display(label));
  Some(match email {
    Some(email) => option.with_metadata(json!({ "email": email })),
    None => option,
  })
}

fn column_option(item: &Value) -> Option<DynamicOption> {
  if !item.is_object() {
    return generic_option(item);
  }
  let name = pick(item, &["name", "id", "key"])?;
  let option = DynamicOption::new(name.clone(), display(name));
  Some(match item.get("type") {
    Some(kind) => option.with_metadata(json!({ "type": kind })),
    None => option,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fallback_heuristics() {
    let registry = MapperRegistry::with_builtins();
    let options = registry.map(
      "notion_databases",
      &[
        json!({ "id": "db1", "title": "Roadmap" }),
        json!({ "value": "db2", "label": "Tasks" }),
        json!({ "key": "db3" }),
        json!("plain"),
        json!(42),
        json!({ "unrelated": true }),
        json!(null),
      ],
    );

    assert_eq!(
      options,
      vec![
        DynamicOption::new("db1", "Roadmap"),
        DynamicOption::new("db2", "Tasks"),
        DynamicOption::new("db3", "db3"),
        DynamicOption::new("plain", "plain"),
        DynamicOption::new(42, "42"),
      ]
    );
  }

  #[test]
  fn test_channel_mapper() {
    let registry = MapperRegistry::with_builtins();
    let options = registry.map(
      "discord_channels",
      &[json!({ "id": "c1", "name": "general", "type": 0 })],
    );

    assert_eq!(options[0].value, json!("c1"));
    assert_eq!(options[0].label, "#general");
    assert_eq!(options[0].metadata, Some(json!({ "type": 0 })));
  }

  #[test]
  fn test_user_mapper_prefers_real_name() {
    let registry = MapperRegistry::with_builtins();
    let options = registry.map(
      "slack_users",
      &[
        json!({ "id": "U1", "name": "jdoe", "profile": { "real_name": "Jo Doe", "email": "jo@example.com" } }),
        json!({ "id": "U2", "name": "bot" }),
      ],
    );

    assert_eq!(options[0].label, "Jo Doe");
    assert_eq!(options[0].metadata, Some(json!({ "email": "jo@example.com" })));
    assert_eq!(options[1].label, "bot");
    assert_eq!(options[1].metadata, None);
  }

  #[test]
  fn test_column_mapper_uses_name_as_value() {
    let registry = MapperRegistry::with_builtins();
    let options = registry.map(
      "airtable_fields",
      &[json!({ "id": "fld1", "name": "Status", "type": "singleSelect" })],
    );

    assert_eq!(options[0].value, json!("Status"));
    assert_eq!(options[0].metadata, Some(json!({ "type": "singleSelect" })));
  }

  #[test]
  fn test_exact_mapper_beats_suffix() {
    let mut registry = MapperRegistry::with_builtins();
    registry.register("teams_channels", |item| {
      Some(DynamicOption::new(item["channelId"].clone(), "custom"))
    });

    let options = registry.map("teams_channels", &[json!({ "channelId": "x" })]);
    assert_eq!(options, vec![DynamicOption::new("x", "custom")]);
  }
}

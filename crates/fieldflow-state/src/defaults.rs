use fieldflow_config::{FieldValues, is_empty};
use fieldflow_schema::FieldRegistry;

/// Inject `defaultValue`s into fields that have no value yet.
///
/// Existing explicit values always win. Returns the next values and the
/// names of the fields that received a default, in schema order.
pub fn apply_defaults(registry: &FieldRegistry, current: &FieldValues) -> (FieldValues, Vec<String>) {
  let mut next = current.clone();
  let mut applied = Vec::new();

  for field in registry.fields() {
    let Some(default) = &field.default_value else {
      continue;
    };
    if next.get(&field.name).is_some_and(|v| !is_empty(v)) {
      continue;
    }
    next.insert(field.name.clone(), default.clone());
    applied.push(field.name.clone());
  }

  (next, applied)
}

#[cfg(test)]
mod tests {
  use super::*;
  use fieldflow_config::{FieldDef, FormDef};
  use serde_json::json;

  #[test]
  fn test_defaults_fill_missing_only() {
    let registry = FieldRegistry::new(FormDef::new(
      "node",
      vec![
        FieldDef::new("format").default_value(json!("markdown")),
        FieldDef::new("limit").default_value(json!(10)),
        FieldDef::new("message"),
      ],
    ))
    .unwrap();

    let mut current = FieldValues::new();
    current.insert("limit".to_string(), json!(25));

    let (next, applied) = apply_defaults(&registry, &current);

    assert_eq!(next["format"], json!("markdown"));
    assert_eq!(next["limit"], json!(25));
    assert!(!next.contains_key("message"));
    assert_eq!(applied, vec!["format"]);
  }

  #[test]
  fn test_empty_value_takes_default() {
    let registry = FieldRegistry::new(FormDef::new(
      "node",
      vec![FieldDef::new("format").default_value(json!("markdown"))],
    ))
    .unwrap();

    let mut current = FieldValues::new();
    current.insert("format".to_string(), json!(""));

    let (next, _) = apply_defaults(&registry, &current);
    assert_eq!(next["format"], json!("markdown"));
  }
}

//! Field value helpers.
//!
//! Values are plain JSON. A field "has a value" when it is present and not
//! empty: `null`, blank strings, `false`, and empty arrays or objects all
//! count as empty. Numbers are always a value, so a numeric id of `0` is a
//! real selection.

/// Current values of a form, keyed by field name.
pub type FieldValues = serde_json::Map<String, serde_json::Value>;

/// Whether a value counts as "no selection".
pub fn is_empty(value: &serde_json::Value) -> bool {
  match value {
    serde_json::Value::Null => true,
    serde_json::Value::Bool(b) => !b,
    serde_json::Value::Number(_) => false,
    serde_json::Value::String(s) => s.trim().is_empty(),
    serde_json::Value::Array(items) => items.is_empty(),
    serde_json::Value::Object(map) => map.is_empty(),
  }
}

/// Inverse of [`is_empty`].
pub fn is_truthy(value: &serde_json::Value) -> bool {
  !is_empty(value)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_empty_values() {
    assert!(is_empty(&json!(null)));
    assert!(is_empty(&json!("")));
    assert!(is_empty(&json!("   ")));
    assert!(is_empty(&json!(false)));
    assert!(is_empty(&json!([])));
    assert!(is_empty(&json!({})));
  }

  #[test]
  fn test_truthy_values() {
    assert!(is_truthy(&json!("S1")));
    assert!(is_truthy(&json!(0)));
    assert!(is_truthy(&json!(true)));
    assert!(is_truthy(&json!(["a"])));
    assert!(is_truthy(&json!({ "id": 1 })));
  }
}

//! Loader parameter resolution using minijinja templates.
//!
//! A dependent field fetches with its trigger value under the parent's name.
//! Fields that need more than one input declare `loaderParams`, templates
//! rendered against the current form values:
//!
//! ```json
//! { "loaderParams": { "baseId": "{{ base }}", "view": "{{ view | default('') }}" } }
//! ```
//!
//! Templates that render to an empty string are left out, so a loader never
//! sees a half-filled parameter. The trigger value always wins over a
//! template with the same name.

use fieldflow_config::{FieldDef, FieldValues};
use fieldflow_loader::LoadError;
use minijinja::{Environment, Value};

/// Build the parameter map for one fetch of `field`.
///
/// `trigger` is the parent field and its new value; root fields have none.
pub fn resolve_params(
  field: &FieldDef,
  trigger: Option<(&str, &serde_json::Value)>,
  values: &FieldValues,
) -> Result<serde_json::Map<String, serde_json::Value>, LoadError> {
  let mut params = serde_json::Map::new();

  if !field.loader_params.is_empty() {
    let env = Environment::new();
    let context = Value::from_serialize(values);

    for (name, template) in &field.loader_params {
      let rendered = resolve_template(&env, &field.name, name, template, &context)?;
      if !rendered.trim().is_empty() {
        params.insert(name.clone(), serde_json::Value::String(rendered));
      }
    }
  }

  if let Some((parent, value)) = trigger {
    params.insert(parent.to_string(), value.clone());
  }

  Ok(params)
}

fn resolve_template(
  env: &Environment,
  field: &str,
  param: &str,
  template: &str,
  context: &Value,
) -> Result<String, LoadError> {
  env.render_str(template, context.clone()).map_err(|e| {
    LoadError::Other(format!(
      "failed to resolve loader parameter '{}' for '{}': {}",
      param, field, e
    ))
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn values(v: serde_json::Value) -> FieldValues {
    v.as_object().cloned().unwrap_or_default()
  }

  #[test]
  fn test_trigger_only() {
    let field = FieldDef::new("channel").depends_on("server");
    let params = resolve_params(&field, Some(("server", &json!("S1"))), &FieldValues::new()).unwrap();
    assert_eq!(serde_json::Value::Object(params), json!({ "server": "S1" }));
  }

  #[test]
  fn test_composite_params() {
    let field = FieldDef::new("field")
      .depends_on("table")
      .loader_param("baseId", "{{ base }}")
      .loader_param("view", "{{ view }}");

    let params = resolve_params(
      &field,
      Some(("table", &json!("tbl1"))),
      &values(json!({ "base": "app1", "table": "tbl1" })),
    )
    .unwrap();

    // `view` rendered empty and is left out.
    assert_eq!(
      serde_json::Value::Object(params),
      json!({ "baseId": "app1", "table": "tbl1" })
    );
  }

  #[test]
  fn test_trigger_wins_over_template() {
    let field = FieldDef::new("channel")
      .depends_on("server")
      .loader_param("server", "{{ other }}");

    let params = resolve_params(
      &field,
      Some(("server", &json!("S2"))),
      &values(json!({ "other": "X" })),
    )
    .unwrap();
    assert_eq!(params["server"], json!("S2"));
  }

  #[test]
  fn test_template_error() {
    let field = FieldDef::new("channel").loader_param("x", "{{ unclosed");
    let err = resolve_params(&field, None, &FieldValues::new()).unwrap_err();
    assert!(err.to_string().contains("loader parameter 'x'"));
  }
}

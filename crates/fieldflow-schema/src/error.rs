use thiserror::Error;

/// Errors that can occur while validating a form schema.
#[derive(Debug, Error)]
pub enum SchemaError {
  /// Two fields share a name.
  #[error("duplicate field name: {field}")]
  DuplicateField { field: String },

  /// `dependsOn` names a field that does not exist.
  #[error("field '{field}' depends on unknown field '{depends_on}'")]
  UnknownDependency { field: String, depends_on: String },

  /// A field depends on itself.
  #[error("field '{field}' depends on itself")]
  SelfDependency { field: String },

  /// Following `dependsOn` links loops back to the start.
  #[error("dependency cycle detected: {}", path.join(" -> "))]
  DependencyCycle { path: Vec<String> },

  /// `visibleWhen` inspects a field that does not exist.
  #[error("field '{field}' has a visibility rule on unknown field '{references}'")]
  UnknownVisibilityField { field: String, references: String },
}

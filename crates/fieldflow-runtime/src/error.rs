//! Session errors.
//!
//! Fetch failures are not errors at this level: they become per-field
//! [`FieldError`](crate::FieldError)s and never reach the caller.

use fieldflow_schema::SchemaError;

/// Errors returned by [`FetchSession`](crate::FetchSession) operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
  /// The field is not part of the form.
  #[error("unknown field '{field}'")]
  UnknownField { field: String },

  /// The form schema failed validation.
  #[error("invalid form schema: {0}")]
  Schema(#[from] SchemaError),

  /// A rate-limited field cannot be retried yet.
  #[error("retry for '{field}' is cooling down, {remaining_ms}ms left")]
  RetryCoolingDown { field: String, remaining_ms: u64 },

  /// The field has no source, or its parent has no value to fetch with.
  #[error("field '{field}' has nothing to retry")]
  NothingToRetry { field: String },

  /// The session was closed.
  #[error("session closed")]
  Closed,
}

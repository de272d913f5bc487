//! Field-scoped fetch errors.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use fieldflow_loader::{ErrorKind, LoadError};
use serde::Serialize;
use tokio::time::Instant;

/// The latest fetch failure shown next to a field.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
  pub kind: ErrorKind,
  /// What the user sees.
  pub message: String,
  /// The underlying loader error.
  pub detail: String,
  /// Rate-limited errors cannot be retried before this instant.
  #[serde(skip)]
  pub retry_at: Option<Instant>,
}

impl FieldError {
  /// Classify `error`; rate-limited errors get a `cooldown`.
  pub fn from_load_error(error: &LoadError, cooldown: Duration) -> Self {
    let kind = error.kind();
    Self {
      kind,
      message: kind.user_message().to_string(),
      detail: error.to_string(),
      retry_at: (kind == ErrorKind::RateLimited).then(|| Instant::now() + cooldown),
    }
  }

  /// Time left before a retry is allowed, if any.
  pub fn cooldown_remaining(&self) -> Option<Duration> {
    let retry_at = self.retry_at?;
    let now = Instant::now();
    (retry_at > now).then(|| retry_at - now)
  }
}

/// Field errors by field name.
#[derive(Debug, Clone, Default)]
pub struct FieldErrors {
  inner: Arc<RwLock<HashMap<String, FieldError>>>,
}

impl FieldErrors {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, field: &str) -> Option<FieldError> {
    let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
    inner.get(field).cloned()
  }

  pub fn set(&self, field: &str, error: FieldError) {
    let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
    inner.insert(field.to_string(), error);
  }

  pub fn clear(&self, field: &str) -> bool {
    let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
    inner.remove(field).is_some()
  }

  pub fn clear_all(&self) {
    let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
    inner.clear();
  }

  pub fn snapshot(&self) -> BTreeMap<String, FieldError> {
    let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
    inner.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn test_rate_limit_cooldown() {
    let err = FieldError::from_load_error(
      &LoadError::Http {
        status: 429,
        message: "slow down".to_string(),
      },
      Duration::from_secs(30),
    );

    assert_eq!(err.kind, ErrorKind::RateLimited);
    assert_eq!(err.detail, "API Error: 429 - slow down");
    assert_eq!(err.cooldown_remaining(), Some(Duration::from_secs(30)));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(err.cooldown_remaining(), None);
  }

  #[tokio::test]
  async fn test_other_errors_have_no_cooldown() {
    let err = FieldError::from_load_error(
      &LoadError::Other("Slack integration not connected".to_string()),
      Duration::from_secs(30),
    );
    assert_eq!(err.kind, ErrorKind::NotConnected);
    assert!(err.retry_at.is_none());
  }

  #[tokio::test]
  async fn test_store() {
    let errors = FieldErrors::new();
    errors.set(
      "channel",
      FieldError::from_load_error(&LoadError::Other("boom".to_string()), Duration::ZERO),
    );

    assert_eq!(errors.get("channel").map(|e| e.kind), Some(ErrorKind::Generic));
    assert!(errors.clear("channel"));
    assert!(!errors.clear("channel"));
  }
}

//! Engine timing and retry configuration.
//!
//! All values are milliseconds in JSON and exposed as [`Duration`]s:
//!
//! ```json
//! {
//!   "minVisibleMs": 300,
//!   "emergencyCeilingMs": 30000,
//!   "retryAfterMs": 8000,
//!   "maxRetryAttempts": 2,
//!   "rateLimitCooldownMs": 30000
//! }
//! ```
//!
//! Missing keys fall back to the defaults above.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
  /// Once raised, the loading signal stays true at least this long.
  pub min_visible_ms: u64,
  /// Loading that outlives this is force-cleared.
  pub emergency_ceiling_ms: u64,
  /// Loading dwell after which stalled fetches are retried.
  pub retry_after_ms: u64,
  /// Automatic retries allowed per fetch.
  pub max_retry_attempts: u32,
  /// Manual retry is refused for this long after a rate-limited failure.
  pub rate_limit_cooldown_ms: u64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      min_visible_ms: 300,
      emergency_ceiling_ms: 30_000,
      retry_after_ms: 8_000,
      max_retry_attempts: 2,
      rate_limit_cooldown_ms: 30_000,
    }
  }
}

impl EngineConfig {
  /// Read a config file. Unknown keys are ignored, missing keys defaulted.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
  }

  pub fn min_visible(&self) -> Duration {
    Duration::from_millis(self.min_visible_ms)
  }

  pub fn emergency_ceiling(&self) -> Duration {
    Duration::from_millis(self.emergency_ceiling_ms)
  }

  pub fn retry_after(&self) -> Duration {
    Duration::from_millis(self.retry_after_ms)
  }

  pub fn rate_limit_cooldown(&self) -> Duration {
    Duration::from_millis(self.rate_limit_cooldown_ms)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_partial_file_uses_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "minVisibleMs": 150, "maxRetryAttempts": 1 }}"#).unwrap();

    let config = EngineConfig::from_file(file.path()).unwrap();

    assert_eq!(config.min_visible(), Duration::from_millis(150));
    assert_eq!(config.max_retry_attempts, 1);
    assert_eq!(config.emergency_ceiling_ms, 30_000);
  }

  #[test]
  fn test_missing_file() {
    let result = EngineConfig::from_file("/definitely/not/here.json");
    assert!(matches!(result, Err(ConfigError::Io(_))));
  }
}

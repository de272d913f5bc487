use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a [`DataLoader`](crate::DataLoader) can fail with.
///
/// `Clone` so a single deduplicated outcome can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
  /// The integrations API answered with a non-success status.
  #[error("API Error: {status} - {message}")]
  Http { status: u16, message: String },

  /// The request never got a response.
  #[error("request error: {message}")]
  Transport { message: String },

  /// The response body was not an item list.
  #[error("invalid response for '{source_key}': {message}")]
  InvalidResponse { source_key: String, message: String },

  /// No integration is linked for the request.
  #[error("integration '{integration_id}' is not connected")]
  NotConnected { integration_id: String },

  #[error("{0}")]
  Other(String),
}

impl LoadError {
  /// User-facing category of this failure.
  pub fn kind(&self) -> ErrorKind {
    match self {
      LoadError::Http { status, message } => {
        ErrorKind::from_status(*status).unwrap_or_else(|| ErrorKind::classify_message(message))
      }
      LoadError::NotConnected { .. } => ErrorKind::NotConnected,
      LoadError::Transport { message } | LoadError::Other(message) => {
        ErrorKind::classify_message(message)
      }
      LoadError::InvalidResponse { .. } => ErrorKind::Generic,
    }
  }
}

impl From<reqwest::Error> for LoadError {
  fn from(e: reqwest::Error) -> Self {
    match e.status() {
      Some(status) => LoadError::Http {
        status: status.as_u16(),
        message: e.to_string(),
      },
      None => LoadError::Transport {
        message: e.to_string(),
      },
    }
  }
}

/// Field-scoped error categories shown next to a dynamic field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// The integration's credential is stale.
  AuthExpired,
  /// The integration was never linked.
  NotConnected,
  /// The provider is throttling requests.
  RateLimited,
  Generic,
}

impl ErrorKind {
  fn from_status(status: u16) -> Option<Self> {
    match status {
      401 | 403 => Some(ErrorKind::AuthExpired),
      404 => Some(ErrorKind::NotConnected),
      429 => Some(ErrorKind::RateLimited),
      _ => None,
    }
  }

  /// Classify a free-form error message.
  pub fn classify_message(message: &str) -> Self {
    let message = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

    if has(&["401", "unauthorized", "expired", "invalid_grant", "authentication"]) {
      ErrorKind::AuthExpired
    } else if has(&["429", "rate limit", "rate-limit", "too many requests"]) {
      ErrorKind::RateLimited
    } else if has(&["not connected", "not found", "no integration", "404"]) {
      ErrorKind::NotConnected
    } else {
      ErrorKind::Generic
    }
  }

  /// Message shown to the user for this category.
  pub fn user_message(&self) -> &'static str {
    match self {
      ErrorKind::AuthExpired => {
        "Your connection has expired. Please reconnect your account to continue."
      }
      ErrorKind::NotConnected => {
        "This integration is not connected. Connect your account to load options."
      }
      ErrorKind::RateLimited => {
        "The provider is rate limiting requests. Please wait a moment before retrying."
      }
      ErrorKind::Generic => "Failed to load options. Please try again.",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_wins_over_message() {
    let err = LoadError::Http {
      status: 429,
      message: "token expired".to_string(),
    };
    assert_eq!(err.kind(), ErrorKind::RateLimited);
  }

  #[test]
  fn test_message_containing_401_is_auth() {
    let err = LoadError::Other("Request failed with status 401".to_string());
    assert_eq!(err.kind(), ErrorKind::AuthExpired);
  }

  #[test]
  fn test_classify_messages() {
    assert_eq!(
      ErrorKind::classify_message("Slack integration not connected"),
      ErrorKind::NotConnected
    );
    assert_eq!(
      ErrorKind::classify_message("Too Many Requests"),
      ErrorKind::RateLimited
    );
    assert_eq!(
      ErrorKind::classify_message("connection reset by peer"),
      ErrorKind::Generic
    );
  }

  #[test]
  fn test_unknown_status_falls_back_to_message() {
    let err = LoadError::Http {
      status: 500,
      message: "upstream said: invalid_grant".to_string(),
    };
    assert_eq!(err.kind(), ErrorKind::AuthExpired);

    let err = LoadError::Http {
      status: 502,
      message: "bad gateway".to_string(),
    };
    assert_eq!(err.kind(), ErrorKind::Generic);
  }

  #[test]
  fn test_display_matches_api_error_format() {
    let err = LoadError::Http {
      status: 401,
      message: "Unauthorized".to_string(),
    };
    assert_eq!(err.to_string(), "API Error: 401 - Unauthorized");
  }
}

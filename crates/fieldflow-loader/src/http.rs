//! Loader backed by the integrations HTTP API.
//!
//! Every fetch is a `POST {base_url}/api/integrations/fetch-data` with a
//! bearer API key and the body:
//!
//! ```json
//! { "integrationId": "...", "dataType": "discord_channels", "options": { "server": "S1" } }
//! ```
//!
//! Successful responses carry `{ "data": [...] }` or a bare array. Error
//! responses carry `{ "error": "..." }`, which becomes the message of
//! [`LoadError::Http`].

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::LoadError;
use crate::loader::{DataLoader, LoadRequest, LoadResult};

const FETCH_DATA_PATH: &str = "api/integrations/fetch-data";

#[derive(Debug, Clone)]
pub struct HttpDataLoader {
  client: Client,
  endpoint: Url,
  api_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchDataBody<'a> {
  integration_id: &'a str,
  data_type: &'a str,
  options: &'a serde_json::Map<String, serde_json::Value>,
}

impl HttpDataLoader {
  /// Create a loader for the API rooted at `base_url`.
  pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
    let mut base = Url::parse(base_url)?;
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }
    Ok(Self {
      client: Client::new(),
      endpoint: base.join(FETCH_DATA_PATH)?,
      api_key: None,
    })
  }

  pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
    self.api_key = Some(api_key.into());
    self
  }

  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }
}

#[async_trait]
impl DataLoader for HttpDataLoader {
  async fn load_data(&self, request: &LoadRequest) -> LoadResult {
    let body = FetchDataBody {
      integration_id: &request.integration_id,
      data_type: &request.source_key,
      options: &request.params,
    };

    let mut http = self.client.post(self.endpoint.clone()).json(&body);
    if let Some(key) = &self.api_key {
      http = http.bearer_auth(key);
    }

    debug!(
      source_key = %request.source_key,
      integration_id = %request.integration_id,
      "fetch_data request"
    );

    let response = http.send().await?;
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
      return Err(LoadError::Http {
        status: status.as_u16(),
        message: error_message(&text)
          .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string()),
      });
    }

    parse_items(&request.source_key, &text)
  }
}

/// Pull `error` (or `message`) out of an error body.
fn error_message(body: &str) -> Option<String> {
  let value: serde_json::Value = serde_json::from_str(body).ok()?;
  ["error", "message"]
    .iter()
    .find_map(|k| value.get(*k))
    .map(|v| match v {
      serde_json::Value::String(s) => s.clone(),
      other => other.to_string(),
    })
}

fn parse_items(source_key: &str, body: &str) -> LoadResult {
  let invalid = |message: String| LoadError::InvalidResponse {
    source_key: source_key.to_string(),
    message,
  };

  let value: serde_json::Value =
    serde_json::from_str(body).map_err(|e| invalid(format!("invalid JSON: {}", e)))?;

  match value {
    serde_json::Value::Array(items) => Ok(items),
    serde_json::Value::Object(mut map) => match map.remove("data") {
      Some(serde_json::Value::Array(items)) => Ok(items),
      Some(serde_json::Value::Null) | None => match map.get("error") {
        Some(error) => Err(LoadError::Other(
          error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string()),
        )),
        None => Ok(Vec::new()),
      },
      Some(other) => Err(invalid(format!("expected array under 'data', got {}", other))),
    },
    other => Err(invalid(format!("expected array, got {}", other))),
  }
}

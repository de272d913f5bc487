use async_trait::async_trait;
use serde::Serialize;

use crate::error::LoadError;

/// Raw items from a loader, or the reason there are none.
pub type LoadResult = Result<Vec<serde_json::Value>, LoadError>;

/// One option-list fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
  /// Loader key, e.g. "discord_channels".
  pub source_key: String,
  pub integration_id: String,
  /// Trigger value plus any composite parameters, e.g. `{ "server": "S1" }`.
  pub params: serde_json::Map<String, serde_json::Value>,
}

/// Produces raw option items for a dynamic source.
///
/// The engine treats implementations as opaque: it only relies on an item
/// list on success and an error otherwise. Response shapes are provider
/// specific and mapped by [`MapperRegistry`](crate::MapperRegistry).
#[async_trait]
pub trait DataLoader: Send + Sync {
  async fn load_data(&self, request: &LoadRequest) -> LoadResult;
}

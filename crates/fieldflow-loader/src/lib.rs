//! Fieldflow Loader
//!
//! The boundary between the engine and the integrations that produce option
//! lists:
//!
//! - [`DataLoader`]: the opaque async fetch the orchestrator calls
//! - [`HttpDataLoader`]: a loader backed by the integrations HTTP API
//! - [`MapperRegistry`]: per-source mapping of raw items to [`DynamicOption`]s
//! - [`LoadError`] / [`ErrorKind`]: failures and their user-facing category
//!
//! [`DynamicOption`]: fieldflow_config::DynamicOption

mod error;
mod http;
mod loader;
mod mapper;

pub use error::{ErrorKind, LoadError};
pub use http::HttpDataLoader;
pub use loader::{DataLoader, LoadRequest, LoadResult};
pub use mapper::{Mapper, MapperRegistry};

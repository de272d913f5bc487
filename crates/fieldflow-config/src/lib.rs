//! Fieldflow Config
//!
//! This crate contains the serializable form schema types for fieldflow, plus the
//! engine's timing configuration. These types describe a form before it is
//! validated into a registry by `fieldflow-schema`.
//!
//! Schemas are loaded from:
//! - JSON files (via CLI with `fieldflow check form.json`)
//! - The node catalog of the host application (as JSON blobs)
//!
//! The schema crate validates these definitions (unique names, known parents,
//! no cycles) and the runtime drives fetching and visibility from them.

mod engine;
mod error;
mod field;
mod form;
mod option;
mod value;

pub use engine::EngineConfig;
pub use error::ConfigError;
pub use field::{FieldDef, VisibleWhen};
pub use form::FormDef;
pub use option::DynamicOption;
pub use value::{FieldValues, is_empty, is_truthy};

//! Fieldflow Schema
//!
//! This crate turns a [`FormDef`](fieldflow_config::FormDef) into a validated,
//! immutable [`FieldRegistry`] and answers the static questions the rest of
//! the engine asks about it:
//!
//! - Which fields depend on a given field ([`DependencyGraph`])
//! - Which fields are currently displayable ([`Visibility`])
//!
//! Key differences from `fieldflow-config`:
//! - Field names are unique and every `dependsOn` points at a known field
//! - Dependency chains are acyclic
//! - Lookups are indexed by name

mod error;
mod graph;
mod registry;
mod visibility;

pub use error::SchemaError;
pub use graph::DependencyGraph;
pub use registry::FieldRegistry;
pub use visibility::{Visibility, VisibilityOverride};

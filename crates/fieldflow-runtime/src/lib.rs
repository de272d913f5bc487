//! Fieldflow Runtime
//!
//! This crate drives the dynamic parts of a configuration form: loading
//! option lists for fields whose choices depend on other fields, and
//! keeping one loading indicator for the whole form.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      FetchSession                           │
//! │  - owns form values, visibility and preferences hook        │
//! │  - set_value(field, value) → cascade clears + refetch       │
//! │  - stall watchdog: restarts fetches stuck past retryAfter   │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    FetchOrchestrator                        │
//! │  - generations per (field, source), cancel on supersede     │
//! │  - loader params via minijinja                              │
//! │  - only current generations write options or errors         │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!               ┌───────────────┼──────────────────┐
//!               ▼               ▼                  ▼
//! ┌──────────────────┐ ┌───────────────────┐ ┌──────────────────┐
//! │  Deduplicator    │ │ LoadingAggregator │ │ OptionsStore /   │
//! │  one call per    │ │ min-visible hold  │ │ FieldErrors      │
//! │  identical key   │ │ + ceiling         │ │                  │
//! └──────────────────┘ └───────────────────┘ └──────────────────┘
//! ```
//!
//! All fetching happens on tokio tasks, so sessions must be opened and
//! written to from within a tokio runtime.

mod dedup;
mod error;
mod events;
mod field_errors;
mod generation;
mod loading;
mod options;
mod orchestrator;
mod params;
mod preferences;
mod request;
mod session;

pub use dedup::{Deduplicator, SharedFetch};
pub use error::SessionError;
pub use events::{ChannelNotifier, NoopNotifier, SessionEvent, SessionNotifier};
pub use field_errors::{FieldError, FieldErrors};
pub use generation::{Begin, GenerationToken, Generations, PairKey};
pub use loading::{LoadingAggregator, LoadingPhase};
pub use options::OptionsStore;
pub use orchestrator::FetchOrchestrator;
pub use params::resolve_params;
pub use preferences::{NoopPreferences, PreferenceSink};
pub use request::RequestKey;
pub use session::{FetchSession, SessionBuilder, SessionSnapshot};

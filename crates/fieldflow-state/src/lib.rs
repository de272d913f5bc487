//! Fieldflow State
//!
//! The live `field -> value` map of one form session. Only two writers touch
//! it: user input ([`FormState::set`]) and the one-shot default step
//! ([`FormState::apply_defaults`]).
//!
//! Writing a new value to a field clears every field downstream of it, so a
//! stale selection never survives a parent change. Writing the same value is
//! a no-op and clears nothing.

mod defaults;
mod state;

pub use defaults::apply_defaults;
pub use state::{FormState, WriteOutcome};

//! Per-call participant state
//!
//! A [`ParticipantState`] is the state machine for one remote call leg on one
//! device. It only changes through [`ParticipantState::apply_update`], which
//! is fed by the status parsers, and reports every field it changed so the
//! owning aggregator can raise notifications.

pub mod name_cache;
pub mod state;

pub use name_cache::NameCache;
pub use state::{ParticipantChange, ParticipantState, ParticipantUpdate};
